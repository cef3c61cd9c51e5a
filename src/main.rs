// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::io::BufRead;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use canpan::{
  FromUrl, FromUrlWithScheme,
  config::AppConfig,
  input::{ImageFileInput, UploadDecoder},
  model::ModelCache,
  output::OutputWrapper,
  parse_url_or_path,
  session::DetectionSession,
  task::{InteractiveTask, OneShotTask, Task},
  url_file_path,
};

fn main() -> Result<()> {
  let args = args::Args::parse();

  let mut config = match &args.config {
    Some(path) => AppConfig::load(path)?,
    None => AppConfig::default(),
  };
  args.apply(&mut config);
  config.validate()?;

  let filter = match &args.log_level {
    Some(level) => EnvFilter::new(level),
    None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
  };
  tracing_subscriber::fmt().with_env_filter(filter).init();

  info!("Canpan 餐盘检测");
  info!("模型文件路径: {}", config.model.path.display());
  info!("置信度阈值: {}", config.confidence());

  // 模型只加载一次，失败时会话仍可上传图片，但检测不可用
  let cache = ModelCache::new(config.model_builder());
  let slot = cache.get();
  if let Err(e) = &slot {
    error!("{}", e);
    error!("系统核心检测功能不可用。请检查模型文件路径。");
  }

  let draw = config.draw()?;
  let mut session =
    DetectionSession::with_parts(slot, UploadDecoder, draw).with_confidence(config.confidence());

  let outputs = args
    .output
    .iter()
    .map(|value| {
      let url = parse_url_or_path(value, "image")?;
      info!("输出路径: {}", url);
      Ok(OutputWrapper::from_url(&url)?)
    })
    .collect::<Result<Vec<_>>>()?;

  match &args.input {
    Some(input) => {
      let url = parse_url_or_path(input, ImageFileInput::SCHEME)?;
      info!("输入来源: {}", url);
      if url.scheme() != ImageFileInput::SCHEME {
        anyhow::bail!("输入地址必须使用 {} 方案", ImageFileInput::SCHEME);
      }
      let input = ImageFileInput::open(url_file_path(&url), config.upload_limit_bytes())?;
      OneShotTask.run_task(input, &mut session, outputs)?;
    }
    None => {
      let lines = std::io::stdin().lock().lines().map_while(|line| line.ok());
      InteractiveTask::new(std::io::stdout(), config.upload_limit_bytes())
        .run_task(lines, &mut session, outputs)?;
    }
  }

  Ok(())
}
