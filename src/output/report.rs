// 该文件是 Canpan （餐盘检测） 项目的一部分。
// src/output/report.rs - 检测结果文字报告
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

use std::io::Write;

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::WithLabel,
  output::Render,
  session::Outcome,
};

#[derive(Error, Debug)]
pub enum ReportError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("未知报告格式: {0}")]
  UnknownFormat(String),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
  Text,
  Json,
}

/// 把检测结果打印到标准输出
pub struct ReportOutput {
  format: ReportFormat,
}

#[derive(Serialize)]
struct DetectionRecord {
  label: String,
  class_id: u32,
  score: f32,
  bbox: [f32; 4],
}

#[derive(Serialize)]
struct OutcomeRecord {
  status: &'static str,
  count: usize,
  confidence: f32,
  width: u32,
  height: u32,
  detections: Vec<DetectionRecord>,
}

impl FromUrlWithScheme for ReportOutput {
  const SCHEME: &'static str = "report";
}

impl FromUrl for ReportOutput {
  type Error = ReportError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReportError::SchemeMismatch);
    }
    let format = match url.path().trim_matches('/') {
      "" | "text" => ReportFormat::Text,
      "json" => ReportFormat::Json,
      other => return Err(ReportError::UnknownFormat(other.to_string())),
    };
    Ok(Self { format })
  }
}

impl ReportOutput {
  pub fn new(format: ReportFormat) -> Self {
    Self { format }
  }

  pub fn format(&self) -> ReportFormat {
    self.format
  }

  pub fn write_report<T: WithLabel, W: Write>(
    &self,
    writer: &mut W,
    frame: &RgbImage,
    result: &Outcome<T>,
  ) -> Result<(), ReportError> {
    match self.format {
      ReportFormat::Text => write_text(writer, result)?,
      ReportFormat::Json => {
        serde_json::to_writer(&mut *writer, &record(frame, result))?;
        writeln!(writer)?;
      }
    }
    writer.flush()?;
    Ok(())
  }
}

impl<T: WithLabel> Render<RgbImage, Outcome<T>> for ReportOutput {
  type Error = ReportError;

  fn render_result(&self, frame: &RgbImage, result: &Outcome<T>) -> Result<(), Self::Error> {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    self.write_report(&mut lock, frame, result)
  }
}

fn write_text<T: WithLabel, W: Write>(writer: &mut W, result: &Outcome<T>) -> std::io::Result<()> {
  match result {
    Outcome::Detected(detections) => {
      writeln!(writer, "成功检测到 {} 个餐盘！", detections.count())?;
      for item in detections.result.iter() {
        writeln!(
          writer,
          "  - {}: {:.2}% at [{:.3}, {:.3}, {:.3}, {:.3}]",
          item.kind.to_label_str(),
          item.score * 100.0,
          item.bbox[0],
          item.bbox[1],
          item.bbox[2],
          item.bbox[3]
        )?;
      }
    }
    Outcome::Empty { confidence } => {
      writeln!(writer, "未检测到任何餐盘（置信度阈值 {}）。您可以尝试：", confidence)?;
      writeln!(writer, "  - 降低置信度阈值")?;
      writeln!(writer, "  - 上传背景更简洁的图片")?;
    }
  }
  Ok(())
}

fn record<T: WithLabel>(frame: &RgbImage, result: &Outcome<T>) -> OutcomeRecord {
  let detections = match result {
    Outcome::Detected(detections) => detections
      .result
      .iter()
      .map(|item| DetectionRecord {
        label: item.kind.to_label_str(),
        class_id: item.kind.to_label_id(),
        score: item.score,
        bbox: item.bbox,
      })
      .collect(),
    Outcome::Empty { .. } => Vec::new(),
  };

  OutcomeRecord {
    status: if result.is_empty() { "empty" } else { "detected" },
    count: result.count(),
    confidence: result.confidence().value(),
    width: frame.width(),
    height: frame.height(),
    detections,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    model::{ClassLabel, Confidence, DetectItem, LabelSet},
    session::Detections,
  };

  fn two_plates() -> Outcome<ClassLabel> {
    let labels = LabelSet::from_names(["plate"]);
    let items = vec![
      DetectItem {
        kind: labels.label(0),
        score: 0.5,
        bbox: [0.0, 0.0, 0.5, 0.5],
      },
      DetectItem {
        kind: labels.label(0),
        score: 0.75,
        bbox: [0.5, 0.5, 1.0, 1.0],
      },
    ];
    Outcome::Detected(Detections {
      result: items.into(),
      annotated: RgbImage::new(20, 10),
      confidence: Confidence::default(),
    })
  }

  #[test]
  fn text_report_lists_detections() {
    let mut buf = Vec::new();
    ReportOutput::new(ReportFormat::Text)
      .write_report(&mut buf, &RgbImage::new(20, 10), &two_plates())
      .unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("成功检测到 2 个餐盘！"));
    assert!(text.contains("plate: 75.00%"));
  }

  #[test]
  fn json_report_is_structured() {
    let mut buf = Vec::new();
    ReportOutput::new(ReportFormat::Json)
      .write_report(&mut buf, &RgbImage::new(20, 10), &two_plates())
      .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
    assert_eq!(value["status"], "detected");
    assert_eq!(value["count"], 2);
    assert_eq!(value["width"], 20);
    assert_eq!(value["detections"][1]["label"], "plate");
    assert_eq!(value["detections"][1]["score"], 0.75);
  }

  #[test]
  fn empty_report_is_not_an_error() {
    let empty: Outcome<ClassLabel> = Outcome::Empty {
      confidence: Confidence::new(1.0),
    };
    let mut buf = Vec::new();
    ReportOutput::new(ReportFormat::Json)
      .write_report(&mut buf, &RgbImage::new(1, 1), &empty)
      .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
    assert_eq!(value["status"], "empty");
    assert_eq!(value["count"], 0);
    assert_eq!(value["confidence"], 1.0);
  }

  #[test]
  fn format_from_url() {
    let json = ReportOutput::from_url(&Url::parse("report:json").unwrap()).unwrap();
    assert_eq!(json.format(), ReportFormat::Json);
    let text = ReportOutput::from_url(&Url::parse("report:").unwrap()).unwrap();
    assert_eq!(text.format(), ReportFormat::Text);
    assert!(matches!(
      ReportOutput::from_url(&Url::parse("report:xml").unwrap()),
      Err(ReportError::UnknownFormat(_))
    ));
  }
}
