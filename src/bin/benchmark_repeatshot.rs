// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理耗时统计
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use canpan::{
  FromUrl,
  model::ModelCache,
  session::DetectionSession,
  task::{RepeatShotTask, Task},
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型地址
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图片
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出地址
  #[arg(long, value_name = "OUTPUT", default_value = "report:text")]
  pub output: Url,
  /// 重复次数
  #[arg(long, default_value_t = 100)]
  pub repeat: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = canpan::input::ImageFileInput::from_url(&args.input)?;
  let cache = ModelCache::new(canpan::model::YoloBuilder::from_url(&args.model)?);
  let output = canpan::output::OutputWrapper::from_url(&args.output)?;

  let mut session = DetectionSession::new(cache.get());
  RepeatShotTask::default()
    .with_repeat(args.repeat)
    .run_task(input, &mut session, output)?;

  Ok(())
}
