// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/config.rs - 应用配置
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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
  input::DEFAULT_UPLOAD_LIMIT_BYTES,
  model::{Confidence, LabelSet},
  output::draw::{Draw, DrawError},
};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件 '{0}' 失败: {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("配置文件格式错误: {0}")]
  ParseError(#[from] toml::de::Error),
  #[error("配置无效: {0}")]
  Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
  pub log_level: String,
  pub model: ModelConfig,
  pub detection: DetectionConfig,
  pub upload: UploadConfig,
  pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
  /// 模型文件路径，启动时解析一次
  pub path: PathBuf,
  pub input_size: u32,
  pub iou_threshold: f32,
  pub max_detections: usize,
  pub intra_threads: Option<usize>,
  /// 自定义类别名称，缺省为 COCO
  pub labels: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
  pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
  pub max_size_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
  pub font: Option<PathBuf>,
  pub font_size: f32,
  pub line_width: u32,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      model: ModelConfig::default(),
      detection: DetectionConfig::default(),
      upload: UploadConfig::default(),
      render: RenderConfig::default(),
    }
  }
}

impl Default for ModelConfig {
  fn default() -> Self {
    Self {
      path: PathBuf::from("yolo11n.onnx"),
      input_size: 640,
      iou_threshold: 0.7,
      max_detections: 300,
      intra_threads: None,
      labels: None,
    }
  }
}

impl Default for DetectionConfig {
  fn default() -> Self {
    Self {
      confidence: Confidence::DEFAULT,
    }
  }
}

impl Default for UploadConfig {
  fn default() -> Self {
    Self {
      max_size_mb: DEFAULT_UPLOAD_LIMIT_BYTES / (1024 * 1024),
    }
  }
}

impl Default for RenderConfig {
  fn default() -> Self {
    Self {
      font: None,
      font_size: 20.0,
      line_width: 2,
    }
  }
}

impl AppConfig {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let text =
      std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
    debug!("读取配置文件: {}", path.display());
    Self::from_toml_str(&text)
  }

  pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
    let config: AppConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.model.input_size == 0 {
      return Err(ConfigError::Invalid("model.input_size 必须大于 0".into()));
    }
    if !(self.model.iou_threshold > 0.0 && self.model.iou_threshold <= 1.0) {
      return Err(ConfigError::Invalid(format!(
        "model.iou_threshold 必须位于 (0, 1], 实际为 {}",
        self.model.iou_threshold
      )));
    }
    if self.model.max_detections == 0 {
      return Err(ConfigError::Invalid("model.max_detections 必须大于 0".into()));
    }
    if self.upload.max_size_mb == 0 {
      return Err(ConfigError::Invalid("upload.max_size_mb 必须大于 0".into()));
    }
    if self.model.labels.as_ref().is_some_and(|labels| labels.is_empty()) {
      return Err(ConfigError::Invalid("model.labels 不能为空列表".into()));
    }
    Ok(())
  }

  pub fn confidence(&self) -> Confidence {
    Confidence::new(self.detection.confidence)
  }

  pub fn upload_limit_bytes(&self) -> u64 {
    self.upload.max_size_mb.saturating_mul(1024 * 1024)
  }

  pub fn labels(&self) -> LabelSet {
    match &self.model.labels {
      Some(names) => LabelSet::from_names(names.iter().cloned()),
      None => LabelSet::coco(),
    }
  }

  pub fn draw(&self) -> Result<Draw, DrawError> {
    let draw = Draw::default()
      .with_font_size(self.render.font_size)
      .with_thickness(self.render.line_width);
    match &self.render.font {
      Some(font) => draw.with_font_file(font),
      None => Ok(draw),
    }
  }

  #[cfg(feature = "model_yolo")]
  pub fn model_builder(&self) -> crate::model::YoloBuilder {
    crate::model::YoloBuilder::new(&self.model.path)
      .labels(self.labels())
      .input_size(self.model.input_size)
      .iou_threshold(self.model.iou_threshold)
      .max_detections(self.model.max_detections)
      .intra_threads(self.model.intra_threads)
  }
}
