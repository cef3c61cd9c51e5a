// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像文件
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

use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::WithLabel,
  output::Render,
  session::Outcome,
  url_file_path,
};

pub struct SaveImageFileOutput {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput::new(url_file_path(uri)))
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存标注图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl<T: WithLabel> Render<RgbImage, Outcome<T>> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, _frame: &RgbImage, result: &Outcome<T>) -> Result<(), Self::Error> {
    match result {
      Outcome::Detected(detections) => self.save_image(&detections.annotated),
      Outcome::Empty { .. } => {
        warn!("未检测到任何餐盘，不保存标注图像: {}", self.path.display());
        Ok(())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;
  use crate::{
    model::{ClassLabel, Confidence, DetectItem, DetectResult, LabelSet},
    session::Detections,
  };

  fn detected(annotated: RgbImage) -> Outcome<ClassLabel> {
    let result: DetectResult<ClassLabel> = vec![DetectItem {
      kind: LabelSet::coco().label(45),
      score: 0.8,
      bbox: [0.1, 0.1, 0.5, 0.5],
    }]
    .into();
    Outcome::Detected(Detections {
      result,
      annotated,
      confidence: Confidence::default(),
    })
  }

  #[test]
  fn saves_annotated_image_into_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("out.png");
    let output = SaveImageFileOutput::new(&path);

    let frame = RgbImage::new(8, 6);
    let annotated = RgbImage::from_pixel(8, 6, Rgb([1, 2, 3]));
    output.render_result(&frame, &detected(annotated.clone())).unwrap();

    let saved = image::open(&path).unwrap().to_rgb8();
    assert_eq!(saved, annotated);
  }

  #[test]
  fn empty_outcome_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.png");
    let output = SaveImageFileOutput::new(&path);

    let empty: Outcome<ClassLabel> = Outcome::Empty {
      confidence: Confidence::new(1.0),
    };
    output.render_result(&RgbImage::new(4, 4), &empty).unwrap();
    assert!(!path.exists());
  }
}
