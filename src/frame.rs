// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/frame.rs - NCHW 模型输入帧定义
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

use image::{Rgb, RgbImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;
const LETTERBOX_PAD: u8 = 114;

/// 原图到模型输入的缩放与填充参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub source_width: u32,
  pub source_height: u32,
}

impl Letterbox {
  pub fn fit(source_width: u32, source_height: u32, size: u32) -> Self {
    let scale = (size as f32 / source_width.max(1) as f32)
      .min(size as f32 / source_height.max(1) as f32);
    let scaled_w = (source_width as f32 * scale).round();
    let scaled_h = (source_height as f32 * scale).round();
    Self {
      scale,
      pad_x: ((size as f32 - scaled_w) / 2.0).floor(),
      pad_y: ((size as f32 - scaled_h) / 2.0).floor(),
      source_width,
      source_height,
    }
  }

  /// 模型输入坐标映射回原图像素坐标，并裁剪到原图范围内
  pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
    let sx = (x - self.pad_x) / self.scale;
    let sy = (y - self.pad_y) / self.scale;
    (
      sx.clamp(0.0, self.source_width as f32),
      sy.clamp(0.0, self.source_height as f32),
    )
  }
}

/// RGB、NCHW 排布、取值 [0, 1] 的浮点输入帧
#[derive(Debug, Clone)]
pub struct RgbNchwFrame {
  data: Box<[f32]>,
  width: u32,
  height: u32,
}

impl RgbNchwFrame {
  pub fn letterbox(image: &RgbImage, size: u32) -> (Self, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), size);
    let scaled_w = ((image.width() as f32 * letterbox.scale).round() as u32).clamp(1, size);
    let scaled_h = ((image.height() as f32 * letterbox.scale).round() as u32).clamp(1, size);

    let resized = image::imageops::resize(image, scaled_w, scaled_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_PAD; 3]));
    image::imageops::overlay(
      &mut canvas,
      &resized,
      letterbox.pad_x as i64,
      letterbox.pad_y as i64,
    );

    (Self::from(&canvas), letterbox)
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.height as usize, self.width as usize]
  }

  pub fn into_data(self) -> Box<[f32]> {
    self.data
  }
}

impl From<&RgbImage> for RgbNchwFrame {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0f32; plane * RGB_CHANNELS];

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = (y * width + x) as usize;
      data[idx] = pixel[0] as f32 / 255.0;
      data[plane + idx] = pixel[1] as f32 / 255.0;
      data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    Self {
      data: data.into_boxed_slice(),
      width,
      height,
    }
  }
}
