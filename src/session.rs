// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/session.rs - 检测会话
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

//! 一次“上传 → 设置阈值 → 推理 → 渲染”的交互周期。
//!
//! 会话独占当前上传的图像与最近一次结果；模型句柄由上层显式传入。

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  input::{DecodeError, ImageDecoder, UploadDecoder},
  model::{Confidence, DetectResult, Model, ModelHandle, ModelLoadError, ModelSlot},
  output::draw::Draw,
};

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("{0}，检测功能不可用")]
  ModelLoadFailed(#[from] ModelLoadError),
  #[error("图片加载失败，无法打开上传的图片文件: {0}")]
  InvalidImage(#[from] DecodeError),
  #[error("尚未上传图片，请先上传一张图片")]
  NoImageLoaded,
  #[error("检测过程中发生错误: {0}")]
  InferenceFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Idle,
  ImageLoaded,
  Detecting,
  Result,
  Error,
}

/// 非空检测结果：检测列表、标注图与所用阈值
#[derive(Debug, Clone)]
pub struct Detections<T> {
  pub result: DetectResult<T>,
  pub annotated: RgbImage,
  pub confidence: Confidence,
}

impl<T> Detections<T> {
  pub fn count(&self) -> usize {
    self.result.len()
  }
}

/// 一次成功推理的结果。没有检测到目标时为 `Empty`，与推理失败区分开。
#[derive(Debug, Clone)]
pub enum Outcome<T> {
  Detected(Detections<T>),
  Empty { confidence: Confidence },
}

impl<T> Outcome<T> {
  pub fn count(&self) -> usize {
    match self {
      Outcome::Detected(detections) => detections.count(),
      Outcome::Empty { .. } => 0,
    }
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, Outcome::Empty { .. })
  }

  pub fn confidence(&self) -> Confidence {
    match self {
      Outcome::Detected(detections) => detections.confidence,
      Outcome::Empty { confidence } => *confidence,
    }
  }

  pub fn annotated(&self) -> Option<&RgbImage> {
    match self {
      Outcome::Detected(detections) => Some(&detections.annotated),
      Outcome::Empty { .. } => None,
    }
  }
}

pub struct DetectionSession<M: Model, D = UploadDecoder> {
  model: ModelSlot<M>,
  decoder: D,
  draw: Draw,
  image: Option<RgbImage>,
  confidence: Confidence,
  last: Option<Outcome<M::Label>>,
  state: SessionState,
}

impl<M: Model> DetectionSession<M> {
  pub fn new(model: ModelSlot<M>) -> Self {
    Self::with_parts(model, UploadDecoder, Draw::default())
  }
}

impl<M: Model, D: ImageDecoder> DetectionSession<M, D> {
  pub fn with_parts(model: ModelSlot<M>, decoder: D, draw: Draw) -> Self {
    if let Err(e) = &model {
      warn!("会话以无模型状态创建: {}", e);
    }
    Self {
      model,
      decoder,
      draw,
      image: None,
      confidence: Confidence::default(),
      last: None,
      state: SessionState::Idle,
    }
  }

  pub fn with_confidence(mut self, confidence: Confidence) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn model(&self) -> Result<&ModelHandle<M>, &ModelLoadError> {
    self.model.as_ref()
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  pub fn threshold(&self) -> Confidence {
    self.confidence
  }

  pub fn uploaded_image(&self) -> Option<&RgbImage> {
    self.image.as_ref()
  }

  pub fn last_outcome(&self) -> Option<&Outcome<M::Label>> {
    self.last.as_ref()
  }

  /// 设置置信度阈值，超出 [0.05, 1.0] 的值被截断
  pub fn set_threshold(&mut self, value: f32) -> Confidence {
    self.confidence = Confidence::new(value);
    debug!("置信度阈值设置为 {}", self.confidence);
    self.confidence
  }

  /// 解码并替换当前图像。解码失败时会话状态保持不变。
  pub fn accept_upload(&mut self, bytes: &[u8]) -> Result<&RgbImage, SessionError> {
    let image = match self.decoder.decode(bytes) {
      Ok(image) => image,
      Err(e) => {
        warn!("上传图片解码失败: {}", e);
        return Err(SessionError::InvalidImage(e));
      }
    };

    info!("已上传图片: {}x{}", image.width(), image.height());
    self.last = None;
    self.state = SessionState::ImageLoaded;
    Ok(self.image.insert(image))
  }

  pub fn run_detection(&mut self) -> Result<&Outcome<M::Label>, SessionError> {
    let model = match &self.model {
      Ok(model) => model,
      Err(e) => return Err(SessionError::ModelLoadFailed(e.clone())),
    };
    let Some(image) = self.image.as_ref() else {
      return Err(SessionError::NoImageLoaded);
    };

    self.state = SessionState::Detecting;
    info!("开始检测, 置信度阈值 {}", self.confidence);
    let now = std::time::Instant::now();
    let inferred = model.infer(image, self.confidence);
    debug!("推理耗时: {:.2?}", now.elapsed());

    let result = match inferred {
      Ok(result) => result,
      Err(e) => {
        error!("检测过程中发生错误: {}", e);
        self.last = None;
        self.state = SessionState::Error;
        return Err(SessionError::InferenceFailed(Box::new(e)));
      }
    };

    let outcome = if result.is_empty() {
      info!("未检测到任何目标");
      Outcome::Empty {
        confidence: self.confidence,
      }
    } else {
      info!("成功检测到 {} 个目标", result.len());
      let annotated = self.draw.annotate(image, &result);
      Outcome::Detected(Detections {
        result,
        annotated,
        confidence: self.confidence,
      })
    };

    self.state = SessionState::Result;
    Ok(self.last.insert(outcome))
  }

  /// 结束会话，丢弃图像与结果
  pub fn end(&mut self) {
    self.image = None;
    self.last = None;
    self.state = SessionState::Idle;
    debug!("会话结束");
  }
}

#[cfg(test)]
mod tests {
  use std::{
    io::Cursor,
    sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
    },
  };

  use image::{ImageFormat, Rgb};

  use super::*;
  use crate::model::{ClassLabel, DetectItem, LabelSet};

  /// 把蓝色通道为 255、绿色通道为 0 的像素块当作餐盘，红色通道编码分数
  struct MarkerModel {
    calls: AtomicUsize,
  }

  #[derive(Error, Debug)]
  #[error("image too small: {0}x{1}")]
  struct TooSmall(u32, u32);

  impl Model for MarkerModel {
    type Label = ClassLabel;
    type Error = TooSmall;

    fn infer(&self, image: &RgbImage, confidence: Confidence) -> Result<DetectResult<ClassLabel>, TooSmall> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if image.width() < 4 || image.height() < 4 {
        return Err(TooSmall(image.width(), image.height()));
      }

      let mut boxes: Vec<(u8, [u32; 4])> = Vec::new();
      for (x, y, pixel) in image.enumerate_pixels() {
        let Rgb([r, g, b]) = *pixel;
        if g != 0 || b != 255 {
          continue;
        }
        match boxes.iter_mut().find(|(marker, _)| *marker == r) {
          Some((_, bbox)) => {
            bbox[0] = bbox[0].min(x);
            bbox[1] = bbox[1].min(y);
            bbox[2] = bbox[2].max(x + 1);
            bbox[3] = bbox[3].max(y + 1);
          }
          None => boxes.push((r, [x, y, x + 1, y + 1])),
        }
      }

      let labels = LabelSet::from_names(["plate"]);
      let (w, h) = (image.width() as f32, image.height() as f32);
      Ok(
        boxes
          .into_iter()
          .map(|(r, b)| DetectItem {
            kind: labels.label(0),
            score: r as f32 / 255.0,
            bbox: [b[0] as f32 / w, b[1] as f32 / h, b[2] as f32 / w, b[3] as f32 / h],
          })
          .filter(|item| confidence.admits(item.score))
          .collect::<Vec<_>>()
          .into(),
      )
    }
  }

  fn model() -> Arc<MarkerModel> {
    Arc::new(MarkerModel {
      calls: AtomicUsize::new(0),
    })
  }

  fn plates_image() -> RgbImage {
    let mut image = RgbImage::from_pixel(64, 48, Rgb([40, 40, 40]));
    // 分数约 0.9 与 0.4 的两个餐盘
    for (marker, x0, y0) in [(230u8, 4u32, 4u32), (102u8, 36, 20)] {
      for y in y0..y0 + 12 {
        for x in x0..x0 + 16 {
          image.put_pixel(x, y, Rgb([marker, 0, 255]));
        }
      }
    }
    image
  }

  fn png(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
  }

  #[test]
  fn starts_idle_with_default_threshold() {
    let session = DetectionSession::new(Ok(model()));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.threshold(), Confidence::default());
    assert!(session.uploaded_image().is_none());
  }

  #[test]
  fn detects_two_plates_at_default_threshold() {
    let mut session = DetectionSession::new(Ok(model()));
    let image = plates_image();
    session.accept_upload(&png(&image)).unwrap();
    assert_eq!(session.state(), SessionState::ImageLoaded);

    let outcome = session.run_detection().unwrap();
    assert_eq!(outcome.count(), 2);
    let annotated = outcome.annotated().unwrap();
    assert_eq!(annotated.dimensions(), image.dimensions());
    assert_ne!(annotated, &image);
    assert_eq!(session.state(), SessionState::Result);
  }

  #[test]
  fn count_never_increases_with_threshold() {
    let mut session = DetectionSession::new(Ok(model()));
    session.accept_upload(&png(&plates_image())).unwrap();

    let mut previous = usize::MAX;
    for step in 5..=100 {
      session.set_threshold(step as f32 / 100.0);
      let count = session.run_detection().unwrap().count();
      assert!(count <= previous, "count rose at threshold {}", step);
      previous = count;
    }
    assert_eq!(previous, 0);
  }

  #[test]
  fn maximum_threshold_yields_empty_outcome() {
    let mut session = DetectionSession::new(Ok(model()));
    session.accept_upload(&png(&plates_image())).unwrap();
    session.set_threshold(1.0);

    let outcome = session.run_detection().unwrap();
    assert!(outcome.is_empty());
    assert!(outcome.annotated().is_none());
    assert_eq!(outcome.confidence().value(), 1.0);
  }

  #[test]
  fn malformed_upload_keeps_previous_image() {
    let mut session = DetectionSession::new(Ok(model()));
    let image = plates_image();
    session.accept_upload(&png(&image)).unwrap();
    session.run_detection().unwrap();

    let err = session.accept_upload(b"\x89PNG broken").unwrap_err();
    assert!(matches!(err, SessionError::InvalidImage(_)));
    assert_eq!(session.uploaded_image(), Some(&image));
    assert_eq!(session.state(), SessionState::Result);
    assert!(session.last_outcome().is_some());
  }

  #[test]
  fn detection_without_upload_never_calls_model() {
    let model = model();
    let mut session = DetectionSession::new(Ok(model.clone()));
    assert!(matches!(
      session.run_detection(),
      Err(SessionError::NoImageLoaded)
    ));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.state(), SessionState::Idle);
  }

  #[test]
  fn missing_model_disables_detection() {
    let slot: ModelSlot<MarkerModel> = Err(ModelLoadError::new("模型文件 'yolo11n.onnx' 未找到"));
    let mut session = DetectionSession::new(slot);
    session.accept_upload(&png(&plates_image())).unwrap();

    for _ in 0..3 {
      let err = session.run_detection().unwrap_err();
      assert!(matches!(err, SessionError::ModelLoadFailed(_)));
      assert!(err.to_string().contains("yolo11n.onnx"));
    }
    assert_eq!(session.state(), SessionState::ImageLoaded);
  }

  #[test]
  fn provider_failure_is_distinct_from_empty() {
    let mut session = DetectionSession::new(Ok(model()));
    session.accept_upload(&png(&RgbImage::new(2, 2))).unwrap();

    let err = session.run_detection().unwrap_err();
    assert!(matches!(err, SessionError::InferenceFailed(_)));
    assert!(err.to_string().contains("too small"));
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.last_outcome().is_none());

    session.accept_upload(&png(&plates_image())).unwrap();
    assert_eq!(session.state(), SessionState::ImageLoaded);
  }

  #[test]
  fn new_upload_replaces_image_and_clears_result() {
    let mut session = DetectionSession::new(Ok(model()));
    session.accept_upload(&png(&plates_image())).unwrap();
    session.run_detection().unwrap();

    let blank = RgbImage::from_pixel(10, 10, Rgb([1, 1, 1]));
    session.accept_upload(&png(&blank)).unwrap();
    assert_eq!(session.uploaded_image(), Some(&blank));
    assert!(session.last_outcome().is_none());
    assert!(session.run_detection().unwrap().is_empty());
  }

  #[test]
  fn round_trip_preserves_count() {
    let mut session = DetectionSession::new(Ok(model()));
    session.accept_upload(&png(&plates_image())).unwrap();
    let first = session.run_detection().unwrap().count();

    let stored = session.uploaded_image().unwrap().clone();
    session.accept_upload(&png(&stored)).unwrap();
    assert_eq!(session.run_detection().unwrap().count(), first);
  }

  #[test]
  fn end_returns_to_idle() {
    let mut session = DetectionSession::new(Ok(model()));
    session.accept_upload(&png(&plates_image())).unwrap();
    session.end();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.uploaded_image().is_none());
  }
}
