// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/input/read_image_file.rs - 图像文件上传
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

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::Upload, url_file_path};

/// 单文件上传大小上限（建议值，仅在输入端检查）
pub const DEFAULT_UPLOAD_LIMIT_BYTES: u64 = 200 * 1024 * 1024;

const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("不支持的文件类型 '{0}'（支持 JPG, JPEG, PNG）")]
  UnsupportedExtension(String),
  #[error("文件过大: {size} 字节, 上限 {limit} 字节")]
  TooLarge { size: u64, limit: u64 },
}

/// 从本地文件读取一次上传
pub struct ImageFileInput {
  upload: Option<Upload>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(url_file_path(url), DEFAULT_UPLOAD_LIMIT_BYTES)
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>, limit: u64) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();

    let extension = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(str::to_ascii_lowercase)
      .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
      return Err(ImageFileInputError::UnsupportedExtension(extension));
    }

    let size = std::fs::metadata(path)?.len();
    if size > limit {
      return Err(ImageFileInputError::TooLarge { size, limit });
    }

    let bytes = std::fs::read(path)?;
    debug!("读取上传文件 {} ({} 字节)", path.display(), bytes.len());

    let name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string());

    Ok(Self {
      upload: Some(Upload { name, bytes }),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = Upload;

  fn next(&mut self) -> Option<Self::Item> {
    self.upload.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn yields_single_upload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plate.PNG");
    std::fs::write(&path, b"bytes").unwrap();

    let mut input = ImageFileInput::open(&path, DEFAULT_UPLOAD_LIMIT_BYTES).unwrap();
    let upload = input.next().unwrap();
    assert_eq!(upload.name, "plate.PNG");
    assert_eq!(upload.bytes, b"bytes");
    assert!(input.next().is_none());
  }

  #[test]
  fn rejects_other_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plate.gif");
    std::fs::write(&path, b"GIF89a").unwrap();
    assert!(matches!(
      ImageFileInput::open(&path, DEFAULT_UPLOAD_LIMIT_BYTES),
      Err(ImageFileInputError::UnsupportedExtension(ext)) if ext == "gif"
    ));
  }

  #[test]
  fn enforces_size_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plate.jpg");
    std::fs::write(&path, vec![0u8; 64]).unwrap();
    assert!(matches!(
      ImageFileInput::open(&path, 32),
      Err(ImageFileInputError::TooLarge { size: 64, limit: 32 })
    ));
  }

  #[test]
  fn from_url_checks_scheme() {
    let url = Url::parse("video:///tmp/plate.jpg").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
