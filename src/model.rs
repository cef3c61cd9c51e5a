// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/model.rs - 模型
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

use image::RgbImage;

/// 检测模型。
///
/// 实现者保证 `infer` 返回的每一项 `score >= confidence`，调用方不再重复过滤。
pub trait Model {
  type Label: WithLabel;
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(
    &self,
    image: &RgbImage,
    confidence: Confidence,
  ) -> Result<DetectResult<Self::Label>, Self::Error>;
}

impl<M: Model + ?Sized> Model for std::sync::Arc<M> {
  type Label = M::Label;
  type Error = M::Error;

  fn infer(
    &self,
    image: &RgbImage,
    confidence: Confidence,
  ) -> Result<DetectResult<Self::Label>, Self::Error> {
    (**self).infer(image, confidence)
  }
}

/// 置信度阈值，取值范围 [0.05, 1.0]，步长 0.01
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Confidence(f32);

impl Confidence {
  pub const MIN: f32 = 0.05;
  pub const MAX: f32 = 1.0;
  pub const DEFAULT: f32 = 0.25;

  const STEPS_PER_UNIT: f32 = 100.0;

  pub fn new(value: f32) -> Self {
    if value.is_nan() {
      return Self(Self::DEFAULT);
    }
    let snapped = (value * Self::STEPS_PER_UNIT).round() / Self::STEPS_PER_UNIT;
    Self(snapped.clamp(Self::MIN, Self::MAX))
  }

  pub fn value(self) -> f32 {
    self.0
  }

  pub fn admits(self, score: f32) -> bool {
    score >= self.0
  }
}

impl Default for Confidence {
  fn default() -> Self {
    Self(Self::DEFAULT)
  }
}

impl std::fmt::Display for Confidence {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{:.2}", self.0)
  }
}

#[derive(Debug, Clone)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，相对原图归一化
}

#[derive(Debug, Clone)]
pub struct DetectResult<T> {
  pub items: Box<[DetectItem<T>]>,
}

impl<T> DetectResult<T> {
  pub fn empty() -> Self {
    Self {
      items: Box::new([]),
    }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem<T>> {
    self.items.iter()
  }
}

impl<T> From<Vec<DetectItem<T>>> for DetectResult<T> {
  fn from(items: Vec<DetectItem<T>>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
}

mod cache;
mod labels;
pub mod postprocess;

pub use self::cache::{ModelCache, ModelHandle, ModelLoadError, ModelLoader, ModelSlot};
pub use self::labels::{COCO_CLASSES, ClassLabel, LabelSet};

#[cfg(feature = "model_yolo")]
mod yolo;
#[cfg(feature = "model_yolo")]
pub use self::yolo::{Yolo, YoloBuilder, YoloError};
