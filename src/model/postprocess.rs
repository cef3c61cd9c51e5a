// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/model/postprocess.rs - YOLO 输出后处理
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  frame::Letterbox,
  model::{ClassLabel, Confidence, DetectItem, DetectResult, LabelSet},
};

const BOX_FIELDS: usize = 4;

#[derive(Error, Debug)]
pub enum PostprocessError {
  #[error("输出张量维度错误: 期望 3 维, 实际 {0:?}")]
  Rank(Vec<usize>),
  #[error("输出张量大小不匹配: 形状 {shape:?}, 数据长度 {len}")]
  Length { shape: Vec<usize>, len: usize },
  #[error("输出张量缺少类别分数: 形状 {0:?}")]
  NoClasses(Vec<usize>),
  #[error("类别数量与模型输出不一致: 配置 {classes} 个类别, 输出形状 {shape:?}")]
  ClassMismatch { classes: usize, shape: Vec<usize> },
}

/// 原图像素坐标下的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub class_id: u32,
  pub score: f32,
  pub x_min: f32,
  pub y_min: f32,
  pub x_max: f32,
  pub y_max: f32,
}

impl Candidate {
  fn area(&self) -> f32 {
    (self.x_max - self.x_min).max(0.0) * (self.y_max - self.y_min).max(0.0)
  }

  /// 计算两个边界框的 IoU
  pub fn iou(&self, other: &Candidate) -> f32 {
    let x1 = self.x_min.max(other.x_min);
    let y1 = self.y_min.max(other.y_min);
    let x2 = self.x_max.min(other.x_max);
    let y2 = self.y_max.min(other.y_max);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = self.area() + other.area() - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// 解析 YOLOv8/YOLO11 检测头输出。
///
/// 输出排布为 `[1, 4 + C, N]`（导出默认）或 `[1, N, 4 + C]`，
/// 每个候选为 `cx, cy, w, h` 加 C 个类别分数，坐标位于模型输入空间。
/// 以 `num_classes` 判断排布，两个维度都不等于 `4 + C` 时报错。
pub fn decode_predictions(
  data: &[f32],
  shape: &[usize],
  num_classes: usize,
  confidence: Confidence,
  letterbox: &Letterbox,
) -> Result<Vec<Candidate>, PostprocessError> {
  let [_, d1, d2] = *shape else {
    return Err(PostprocessError::Rank(shape.to_vec()));
  };
  if shape.iter().product::<usize>() != data.len() {
    return Err(PostprocessError::Length {
      shape: shape.to_vec(),
      len: data.len(),
    });
  }

  let expected = BOX_FIELDS + num_classes;
  let (features, proposals, transposed) = if d1 == expected {
    (d1, d2, false)
  } else if d2 == expected {
    (d2, d1, true)
  } else {
    warn!(
      "模型输出形状 {:?} 与 {} 个类别不匹配，请检查 model.labels",
      shape, num_classes
    );
    return Err(PostprocessError::ClassMismatch {
      classes: num_classes,
      shape: shape.to_vec(),
    });
  };
  if features <= BOX_FIELDS {
    return Err(PostprocessError::NoClasses(shape.to_vec()));
  }
  debug!(
    "输出张量: 特征维 {}, 候选数 {}, 转置 {}",
    features, proposals, transposed
  );

  let at = |feature: usize, proposal: usize| {
    if transposed {
      data[proposal * features + feature]
    } else {
      data[feature * proposals + proposal]
    }
  };

  let mut candidates = Vec::new();
  for i in 0..proposals {
    let mut score = f32::MIN;
    let mut class_id = 0usize;
    for c in 0..(features - BOX_FIELDS) {
      let s = at(BOX_FIELDS + c, i);
      if s > score {
        score = s;
        class_id = c;
      }
    }

    if !confidence.admits(score) {
      continue;
    }

    let cx = at(0, i);
    let cy = at(1, i);
    let w = at(2, i);
    let h = at(3, i);

    let (x_min, y_min) = letterbox.to_source(cx - w / 2.0, cy - h / 2.0);
    let (x_max, y_max) = letterbox.to_source(cx + w / 2.0, cy + h / 2.0);
    if x_max <= x_min || y_max <= y_min {
      continue;
    }

    candidates.push(Candidate {
      class_id: class_id as u32,
      score,
      x_min,
      y_min,
      x_max,
      y_max,
    });
  }

  debug!("阈值 {} 下保留 {} 个候选框", confidence, candidates.len());
  Ok(candidates)
}

/// 按类别的非极大值抑制，结果按置信度降序，最多保留 `max_detections` 个
pub fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32, max_detections: usize) -> Vec<Candidate> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<Candidate> = Vec::new();
  for candidate in candidates {
    if kept.len() >= max_detections {
      break;
    }
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
    if !suppressed {
      kept.push(candidate);
    }
  }
  kept
}

/// 候选框归一化到原图尺寸并附加类别名称
pub fn into_result(
  candidates: Vec<Candidate>,
  letterbox: &Letterbox,
  labels: &LabelSet,
) -> DetectResult<ClassLabel> {
  let w = letterbox.source_width.max(1) as f32;
  let h = letterbox.source_height.max(1) as f32;

  candidates
    .into_iter()
    .map(|c| DetectItem {
      kind: labels.label(c.class_id),
      score: c.score,
      bbox: [c.x_min / w, c.y_min / h, c.x_max / w, c.y_max / h],
    })
    .collect::<Vec<_>>()
    .into()
}
