// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/json_lines.rs - JSON Lines 输出
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

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::mapping::Recognition;
use crate::output::Publish;
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

const JSON_LINES_SCHEME: &str = "jsonl";

/// 每帧输出一行 JSON
///
/// - `jsonl:` 写到标准输出
/// - `jsonl:///path/result.jsonl` 追加写入文件
pub struct JsonLinesOutput {
  writer: Mutex<Box<dyn Write + Send>>,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = JSON_LINES_SCHEME;
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch);
    }

    let writer: Box<dyn Write + Send> = if url.path().is_empty() {
      Box::new(std::io::stdout())
    } else {
      info!("检测结果写入: {}", url.path());
      Box::new(
        OpenOptions::new()
          .create(true)
          .append(true)
          .open(url.path())?,
      )
    };

    Ok(Self::with_writer(writer))
  }
}

impl JsonLinesOutput {
  pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
    Self {
      writer: Mutex::new(writer),
    }
  }
}

/// 一帧检测结果的 JSON 表示
pub fn recognitions_to_json(frame_index: u64, recognitions: &[Recognition]) -> Value {
  let items: Vec<Value> = recognitions
    .iter()
    .map(|r| {
      json!({
        "class_id": r.class_id,
        "label": r.label,
        "score": r.score,
        "rect": {
          "left": r.rect.left,
          "top": r.rect.top,
          "right": r.rect.right,
          "bottom": r.rect.bottom,
        },
      })
    })
    .collect();

  json!({
    "frame": frame_index,
    "timestamp": Utc::now().to_rfc3339(),
    "recognitions": items,
  })
}

impl Publish for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn publish(&self, frame_index: u64, recognitions: &[Recognition]) -> Result<(), Self::Error> {
    let line = serde_json::to_string(&recognitions_to_json(frame_index, recognitions))?;
    let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    writeln!(writer, "{}", line)?;
    writer.flush()?;
    Ok(())
  }
}
