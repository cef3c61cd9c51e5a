// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/task.rs - 检测任务
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

use std::{io::Write, path::PathBuf, str::FromStr, time::Duration};

use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  input::{ImageDecoder, ImageFileInput, Upload},
  model::Model,
  output::Render,
  session::{DetectionSession, Outcome},
};

pub trait Task<I, M: Model, O>: Sized {
  type Error;
  fn run_task<D: ImageDecoder>(
    self,
    input: I,
    session: &mut DetectionSession<M, D>,
    output: O,
  ) -> Result<(), Self::Error>;
}

/// 推理并把最新结果交给输出，返回检测数量
fn detect_and_render<M, D, O, RE>(
  session: &mut DetectionSession<M, D>,
  output: &O,
) -> anyhow::Result<usize>
where
  M: Model,
  D: ImageDecoder,
  O: Render<RgbImage, Outcome<M::Label>, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  session.run_detection()?;
  let (Some(frame), Some(outcome)) = (session.uploaded_image(), session.last_outcome()) else {
    anyhow::bail!("会话中没有可渲染的结果");
  };
  output.render_result(frame, outcome)?;
  Ok(outcome.count())
}

/// 上传一张图片并检测一次
pub struct OneShotTask;

impl<M, O, RE, I> Task<I, M, O> for OneShotTask
where
  M: Model,
  I: Iterator<Item = Upload>,
  O: Render<RgbImage, Outcome<M::Label>, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task<D: ImageDecoder>(
    self,
    mut input: I,
    session: &mut DetectionSession<M, D>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let upload = input.next().ok_or_else(|| anyhow::anyhow!("没有上传图片"))?;
    info!("收到上传: {} ({} 字节)", upload.name, upload.bytes.len());
    session.accept_upload(&upload.bytes)?;

    let now = std::time::Instant::now();
    let count = detect_and_render(session, &output)?;
    info!("检测完成, {} 个目标, 耗时: {:.2?}", count, now.elapsed());

    Ok(())
  }
}

/// 对同一张图片重复检测，统计平均耗时
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 100 }
  }
}

impl RepeatShotTask {
  const WARMUP: usize = 2;

  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat.max(1);
    self
  }
}

impl<M, O, RE, I> Task<I, M, O> for RepeatShotTask
where
  M: Model,
  I: Iterator<Item = Upload>,
  O: Render<RgbImage, Outcome<M::Label>, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task<D: ImageDecoder>(
    self,
    mut input: I,
    session: &mut DetectionSession<M, D>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let upload = input.next().ok_or_else(|| anyhow::anyhow!("没有上传图片"))?;
    session.accept_upload(&upload.bytes)?;
    info!("输入图片获取成功，开始推理...");

    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = std::time::Instant::now();
      let count = session.run_detection()?.count();
      let elapsed = now.elapsed();
      info!("({})推理完成，{} 个目标，耗时: {:.2?}", i, count, elapsed);
      times.push(elapsed);
    }

    let (Some(frame), Some(outcome)) = (session.uploaded_image(), session.last_outcome()) else {
      anyhow::bail!("会话中没有可渲染的结果");
    };
    output.render_result(frame, outcome)?;

    let measured = if times.len() > Self::WARMUP {
      &times[Self::WARMUP..]
    } else {
      &times[..]
    };
    let mean = measured.iter().sum::<Duration>() / measured.len().max(1) as u32;
    warn!("平均推理时间: {:.2?}", mean);

    Ok(())
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
  #[error("未知命令: {0}（输入 help 查看帮助）")]
  Unknown(String),
  #[error("缺少参数: {0}")]
  MissingArgument(&'static str),
  #[error("阈值不是数字: {0}")]
  InvalidThreshold(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
  Upload(PathBuf),
  Threshold(f32),
  Detect,
  Status,
  Help,
  Quit,
}

impl FromStr for Command {
  type Err = CommandError;

  fn from_str(line: &str) -> Result<Self, Self::Err> {
    let line = line.trim();
    let (name, rest) = match line.split_once(char::is_whitespace) {
      Some((name, rest)) => (name, rest.trim()),
      None => (line, ""),
    };

    match name.to_ascii_lowercase().as_str() {
      "upload" | "u" => {
        if rest.is_empty() {
          return Err(CommandError::MissingArgument("upload <图片路径>"));
        }
        Ok(Command::Upload(PathBuf::from(rest)))
      }
      "threshold" | "t" => {
        if rest.is_empty() {
          return Err(CommandError::MissingArgument("threshold <0.05-1.0>"));
        }
        rest
          .parse::<f32>()
          .map(Command::Threshold)
          .map_err(|_| CommandError::InvalidThreshold(rest.to_string()))
      }
      "detect" | "d" => Ok(Command::Detect),
      "status" | "s" => Ok(Command::Status),
      "help" | "h" | "?" => Ok(Command::Help),
      "quit" | "q" | "exit" => Ok(Command::Quit),
      other => Err(CommandError::Unknown(other.to_string())),
    }
  }
}

const HELP: &str = "\
命令:
  upload <路径>      上传图片（JPG, JPEG, PNG）
  threshold <数值>   设置置信度阈值 (0.05 - 1.0, 步长 0.01)
  detect             开始检测
  status             查看当前状态
  help               显示帮助
  quit               退出";

/// 逐行读取命令的交互式会话。所有会话错误都只报告，不中断循环。
pub struct InteractiveTask<W: Write> {
  out: W,
  upload_limit: u64,
}

impl<W: Write> InteractiveTask<W> {
  pub fn new(out: W, upload_limit: u64) -> Self {
    Self { out, upload_limit }
  }
}

impl<M, O, RE, I, W> Task<I, M, O> for InteractiveTask<W>
where
  M: Model,
  I: Iterator<Item = String>,
  O: Render<RgbImage, Outcome<M::Label>, Error = RE>,
  RE: std::error::Error + Send + Sync + 'static,
  W: Write,
{
  type Error = std::io::Error;

  fn run_task<D: ImageDecoder>(
    mut self,
    input: I,
    session: &mut DetectionSession<M, D>,
    output: O,
  ) -> Result<(), Self::Error> {
    if let Err(e) = session.model() {
      writeln!(self.out, "{}", e)?;
      writeln!(self.out, "系统核心检测功能不可用。请检查模型文件路径。")?;
    }
    writeln!(self.out, "请上传一张图片，然后输入 detect 开始检测。")?;

    for line in input {
      if line.trim().is_empty() {
        continue;
      }
      let command = match line.parse::<Command>() {
        Ok(command) => command,
        Err(e) => {
          writeln!(self.out, "{}", e)?;
          continue;
        }
      };

      match command {
        Command::Upload(path) => {
          let upload = match ImageFileInput::open(&path, self.upload_limit) {
            Ok(mut input) => input.next(),
            Err(e) => {
              writeln!(self.out, "图片加载失败！{}", e)?;
              continue;
            }
          };
          let Some(upload) = upload else {
            continue;
          };
          match session.accept_upload(&upload.bytes) {
            Ok(image) => writeln!(
              self.out,
              "已上传图片: {} ({}x{})",
              upload.name,
              image.width(),
              image.height()
            )?,
            Err(e) => writeln!(self.out, "{}", e)?,
          }
        }
        Command::Threshold(value) => {
          let confidence = session.set_threshold(value);
          writeln!(self.out, "置信度阈值: {}", confidence)?;
        }
        Command::Detect => {
          if let Err(e) = detect_and_render(session, &output) {
            writeln!(self.out, "{:#}", e)?;
          }
        }
        Command::Status => {
          let image = session
            .uploaded_image()
            .map(|image| format!("{}x{}", image.width(), image.height()))
            .unwrap_or_else(|| "无".to_string());
          writeln!(
            self.out,
            "状态: {:?}, 置信度阈值: {}, 图片: {}",
            session.state(),
            session.threshold(),
            image
          )?;
        }
        Command::Help => writeln!(self.out, "{}", HELP)?,
        Command::Quit => break,
      }
    }

    session.end();
    info!("交互会话结束");
    Ok(())
  }
}
