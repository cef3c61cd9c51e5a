// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/input/decode.rs - 上传图像解码
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

use std::io::Cursor;

use image::{ImageFormat, ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("上传内容为空")]
  Empty,
  #[error("无法识别的图像格式")]
  UnknownFormat,
  #[error("不支持的图像格式: {0:?}（仅支持 JPG, JPEG, PNG）")]
  UnsupportedFormat(ImageFormat),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 把上传的字节流解码为 RGB 像素缓冲
pub trait ImageDecoder {
  fn decode(&self, bytes: &[u8]) -> Result<RgbImage, DecodeError>;
}

/// 基于 `image` 的解码器，只接受 JPEG 与 PNG
#[derive(Debug, Default, Clone, Copy)]
pub struct UploadDecoder;

impl ImageDecoder for UploadDecoder {
  fn decode(&self, bytes: &[u8]) -> Result<RgbImage, DecodeError> {
    if bytes.is_empty() {
      return Err(DecodeError::Empty);
    }

    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    match reader.format() {
      Some(ImageFormat::Jpeg | ImageFormat::Png) => {}
      Some(other) => return Err(DecodeError::UnsupportedFormat(other)),
      None => return Err(DecodeError::UnknownFormat),
    }

    let image = reader.decode()?.to_rgb8();
    debug!("解码上传图像: {}x{}", image.width(), image.height());
    Ok(image)
  }
}
