// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/model/yolo.rs - ONNX YOLO 检测模型
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

use std::{
  path::{Path, PathBuf},
  sync::Mutex,
};

use image::RgbImage;
use ort::{session::Session, value::Tensor};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbNchwFrame,
  model::{
    ClassLabel, Confidence, DetectResult, LabelSet, Model, ModelLoader,
    postprocess::{self, PostprocessError},
  },
  url_file_path,
};

const YOLO_INPUT_SIZE: u32 = 640;
const YOLO_IOU_THRESHOLD: f32 = 0.7;
const YOLO_MAX_DETECTIONS: usize = 300;
const YOLO_INPUT_NAME: &str = "images";
const YOLO_OUTPUT_NAME: &str = "output0";

#[derive(Error, Debug)]
pub enum YoloError {
  #[error("模型文件 '{0}' 未找到")]
  ModelNotFound(PathBuf),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(String),
  #[error("模型输出缺失: {0}")]
  OutputMissing(String),
  #[error("后处理错误: {0}")]
  Postprocess(#[from] PostprocessError),
  #[error("推理会话锁已损坏")]
  Poisoned,
}

impl YoloError {
  fn runtime(e: impl std::fmt::Display) -> Self {
    YoloError::Runtime(e.to_string())
  }
}

pub struct Yolo {
  session: Mutex<Session>,
  labels: LabelSet,
  input_size: u32,
  iou_threshold: f32,
  max_detections: usize,
}

#[derive(Debug, Clone)]
pub struct YoloBuilder {
  model_path: PathBuf,
  labels: LabelSet,
  input_size: u32,
  iou_threshold: f32,
  max_detections: usize,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for YoloBuilder {
  const SCHEME: &'static str = "yolo";
}

impl FromUrl for YoloBuilder {
  type Error = YoloError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoloError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(YoloBuilder::new(url_file_path(url)))
  }
}

impl YoloBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    Self {
      model_path: model_path.into(),
      labels: LabelSet::coco(),
      input_size: YOLO_INPUT_SIZE,
      iou_threshold: YOLO_IOU_THRESHOLD,
      max_detections: YOLO_MAX_DETECTIONS,
      intra_threads: None,
    }
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  pub fn labels(mut self, labels: LabelSet) -> Self {
    self.labels = labels;
    self
  }

  pub fn input_size(mut self, input_size: u32) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn iou_threshold(mut self, iou_threshold: f32) -> Self {
    self.iou_threshold = iou_threshold;
    self
  }

  pub fn max_detections(mut self, max_detections: usize) -> Self {
    self.max_detections = max_detections;
    self
  }

  pub fn intra_threads(mut self, intra_threads: Option<usize>) -> Self {
    self.intra_threads = intra_threads;
    self
  }

  pub fn build(self) -> Result<Yolo, YoloError> {
    if !self.model_path.is_file() {
      return Err(YoloError::ModelNotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path.display());
    if let Ok(meta) = std::fs::metadata(&self.model_path) {
      debug!(
        "模型文件大小: {:.2} MB",
        meta.len() as f64 / (1024.0 * 1024.0)
      );
    }

    let mut builder = Session::builder().map_err(YoloError::runtime)?;
    if let Some(threads) = self.intra_threads {
      builder = builder
        .with_intra_threads(threads)
        .map_err(YoloError::runtime)?;
    }
    let session = builder
      .commit_from_file(&self.model_path)
      .map_err(YoloError::runtime)?;

    debug!(
      "模型输入数量: {}, 输出数量: {}",
      session.inputs.len(),
      session.outputs.len()
    );
    info!("模型加载完成, {} 个类别", self.labels.len());

    Ok(Yolo {
      session: Mutex::new(session),
      labels: self.labels,
      input_size: self.input_size,
      iou_threshold: self.iou_threshold,
      max_detections: self.max_detections,
    })
  }
}

impl ModelLoader for YoloBuilder {
  type Model = Yolo;
  type Error = YoloError;

  fn load(&self) -> Result<Yolo, YoloError> {
    self.clone().build()
  }

  fn describe(&self) -> String {
    self.model_path.display().to_string()
  }
}

impl Model for Yolo {
  type Label = ClassLabel;
  type Error = YoloError;

  fn infer(
    &self,
    image: &RgbImage,
    confidence: Confidence,
  ) -> Result<DetectResult<ClassLabel>, YoloError> {
    debug!("预处理输入图像 {}x{}", image.width(), image.height());
    let (frame, letterbox) = RgbNchwFrame::letterbox(image, self.input_size);
    let shape = frame.shape();
    let input = Tensor::from_array((shape, frame.into_data())).map_err(YoloError::runtime)?;

    // ort 会话需要独占访问，推理调用在此串行化
    let mut session = self.session.lock().map_err(|_| YoloError::Poisoned)?;

    debug!("执行模型推理");
    let outputs = session
      .run(ort::inputs![YOLO_INPUT_NAME => input])
      .map_err(YoloError::runtime)?;

    let output = outputs
      .get(YOLO_OUTPUT_NAME)
      .ok_or_else(|| YoloError::OutputMissing(YOLO_OUTPUT_NAME.to_string()))?;
    let (dims, data) = output
      .try_extract_tensor::<f32>()
      .map_err(YoloError::runtime)?;
    let dims: Vec<usize> = dims.iter().map(|&d| d.max(0) as usize).collect();
    debug!("模型输出形状: {:?}", dims);

    let candidates =
      postprocess::decode_predictions(data, &dims, self.labels.len(), confidence, &letterbox)?;
    let kept = postprocess::nms(candidates, self.iou_threshold, self.max_detections);
    debug!("检测到 {} 个物体", kept.len());

    Ok(postprocess::into_result(kept, &letterbox, &self.labels))
  }
}
