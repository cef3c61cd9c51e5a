// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;

use canpan::config::AppConfig;

/// Canpan 餐盘检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 配置文件路径（TOML）
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// ONNX 模型文件路径，覆盖配置文件
  #[arg(long, value_name = "MODEL")]
  pub model: Option<PathBuf>,

  /// 初始置信度阈值 (0.05 - 1.0)
  #[arg(long, value_name = "CONFIDENCE")]
  pub confidence: Option<f32>,

  /// 输入图片，给出时只检测一次；缺省进入交互模式
  #[arg(long, value_name = "SOURCE")]
  pub input: Option<String>,

  /// 输出地址，可重复：
  /// - report:text / report:json
  /// - image:///path/to/annotated.png 或裸路径
  #[arg(long, value_name = "OUTPUT", default_value = "report:text")]
  pub output: Vec<String>,

  /// 标签字体文件（TTF/OTF）
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,

  /// 日志级别，覆盖配置文件与 RUST_LOG
  #[arg(long, value_name = "LEVEL")]
  pub log_level: Option<String>,
}

impl Args {
  /// 命令行参数优先于配置文件
  pub fn apply(&self, config: &mut AppConfig) {
    if let Some(model) = &self.model {
      config.model.path = model.clone();
    }
    if let Some(confidence) = self.confidence {
      config.detection.confidence = confidence;
    }
    if let Some(font) = &self.font {
      config.render.font = Some(font.clone());
    }
    if let Some(level) = &self.log_level {
      config.log_level = level.clone();
    }
  }
}
