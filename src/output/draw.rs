// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::model::{DetectItem, DetectResult, WithLabel};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: u32 = 2;
const PALETTE_SIZE: usize = 80;

static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
}

pub struct Draw {
  font: FontArc,
  font_size: f32,
  thickness: u32,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    // 每个类别一种颜色
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    let font = FontArc::try_from_slice(DEFAULT_FONT).expect("无法加载嵌入的字体文件");

    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      thickness: BOX_THICKNESS,
      colors,
    }
  }
}

impl Draw {
  /// 用 TTF/OTF 字体替换内置字体
  pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontArc::try_from_vec(data).map_err(|e| DrawError::InvalidFont(e.to_string()))?;
    debug!("加载标签字体: {}", path.as_ref().display());
    self.font = font;
    Ok(self)
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn with_thickness(mut self, thickness: u32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  pub fn color_of(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// 在原图副本上绘制全部检测框，返回与原图同尺寸的标注图
  pub fn annotate<T: WithLabel>(&self, image: &RgbImage, result: &DetectResult<T>) -> RgbImage {
    let mut annotated = image.clone();
    self.draw_detections_on_image(&mut annotated, result);
    annotated
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label<T: WithLabel>(&self, image: &mut RgbImage, item: &DetectItem<T>) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    if w < 1.0 || h < 1.0 {
      return;
    }
    let bbox = &item.bbox;

    let x_min = ((bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = self.color_of(item.kind.to_label_id());

    // 由外向内逐层绘制边框
    for t in 0..self.thickness as i32 {
      let width = x_max - x_min + 1 - 2 * t;
      let height = y_max - y_min + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let font = &self.font;
    let label = format!("{} {:.2}", item.kind.to_label_str(), item.score);
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, &label);
    let label_height = text_height as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 标签放在边框上方，放不下时贴着边框内侧
    let label_x = x_min;
    let label_y = if y_min >= label_height {
      y_min - label_height
    } else {
      y_min
    };
    let label_width = (text_width as i32).min(w as i32 - label_x).max(0) as u32;

    if label_width > 0 && label_height > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, label_height as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        scale,
        font,
        &label,
      );
    }
  }
}

pub trait DrawDetectionOnImage<T: WithLabel> {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult<T>);
}

impl<T: WithLabel> DrawDetectionOnImage<T> for Draw {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult<T>) {
    for item in result.iter() {
      self.draw_bbox_with_label(image, item);
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{ClassLabel, LabelSet};

  fn result(items: Vec<([f32; 4], u32)>) -> DetectResult<ClassLabel> {
    let labels = LabelSet::coco();
    items
      .into_iter()
      .map(|(bbox, id)| DetectItem {
        kind: labels.label(id),
        score: 0.9,
        bbox,
      })
      .collect::<Vec<_>>()
      .into()
  }

  #[test]
  fn annotation_keeps_dimensions_and_source() {
    let image = RgbImage::from_pixel(200, 200, Rgb([0, 0, 0]));
    let draw = Draw::default();
    let annotated = draw.annotate(&image, &result(vec![([0.25, 0.5, 0.75, 0.9], 0)]));

    assert_eq!(annotated.dimensions(), image.dimensions());
    assert_eq!(image.get_pixel(50, 100), &Rgb([0, 0, 0]));
    assert_eq!(annotated.get_pixel(50, 100), &draw.color_of(0));
    assert_eq!(annotated.get_pixel(51, 101), &draw.color_of(0));
    assert_eq!(annotated.get_pixel(100, 140), &Rgb([0, 0, 0]));
  }

  #[test]
  fn default_font_draws_label_above_box() {
    let image = RgbImage::from_pixel(200, 200, Rgb([0, 0, 0]));
    let draw = Draw::default();
    let annotated = draw.annotate(&image, &result(vec![([0.25, 0.5, 0.75, 0.9], 45)]));

    let (mut bar, mut text) = (0, 0);
    for y in 0..100 {
      for x in 0..200 {
        let pixel = *annotated.get_pixel(x, y);
        if pixel == draw.color_of(45) {
          bar += 1;
        } else if pixel != Rgb([0, 0, 0]) {
          text += 1;
        }
      }
    }
    assert!(bar > 0, "没有绘制标签底色");
    assert!(text > 0, "没有绘制标签文字");
    assert_eq!(annotated.get_pixel(10, 10), &Rgb([0, 0, 0]));
  }

  #[test]
  fn label_falls_inside_box_at_top_edge() {
    let image = RgbImage::from_pixel(120, 80, Rgb([0, 0, 0]));
    let draw = Draw::default();
    let annotated = draw.annotate(&image, &result(vec![([0.0, 0.0, 1.0, 1.0], 0)]));
    assert_eq!(annotated.dimensions(), (120, 80));
    assert!(annotated.enumerate_pixels().any(|(x, y, p)| x > 2 && y > 2 && *p != Rgb([0, 0, 0])));
  }

  #[test]
  fn degenerate_boxes_are_skipped() {
    let image = RgbImage::from_pixel(10, 10, Rgb([7, 7, 7]));
    let annotated = Draw::default().annotate(&image, &result(vec![([0.5, 0.5, 0.5, 0.9], 3)]));
    assert_eq!(annotated, image);
  }

  #[test]
  fn palette_wraps_by_class() {
    let draw = Draw::default();
    assert_eq!(draw.color_of(1), draw.color_of(81));
    assert_ne!(draw.color_of(0), draw.color_of(40));
  }

  #[test]
  fn invalid_font_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("font.ttf");
    std::fs::write(&path, b"not a font").unwrap();
    assert!(matches!(
      Draw::default().with_font_file(&path),
      Err(DrawError::InvalidFont(_))
    ));
  }
}
