// 该文件是 Kanjian （看见） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::mapping::Recognition;
use crate::output::Publish;
use crate::{FromUrl, FromUrlWithScheme};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按日期分目录记录每帧的检测结果
///
/// URL 形式: `folder:///path/to/records[?record=id][&always]`
///
/// 每帧一个文本文件 `YYYY/MM/DD/HH-MM-SS-<帧号>.txt`，每行一个目标:
/// `标签, 分数, left, top, right, bottom`。`record=id` 时以 class id 代替标签，
/// 没有目标的帧只在设置了 `always` 时才写入。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  label_with_name: bool,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let label_with_name = !uri.query_pairs().any(|(k, v)| k == "record" && v == "id");
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      label_with_name,
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_path(&self, now: DateTime<Utc>, frame_index: u64) -> Result<PathBuf, std::io::Error> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:06}.txt",
      now.format("%H-%M-%S"),
      frame_index
    )))
  }

  fn record(&self, path: &Path, recognitions: &[Recognition]) -> Result<(), std::io::Error> {
    let records: Vec<String> = recognitions
      .iter()
      .map(|r| {
        let name = if self.label_with_name {
          r.label.clone()
        } else {
          r.class_id.to_string()
        };
        format!(
          "{}, {:.4}, {:.1}, {:.1}, {:.1}, {:.1}",
          name, r.score, r.rect.left, r.rect.top, r.rect.right, r.rect.bottom
        )
      })
      .collect();
    std::fs::write(path, records.join("\n"))
  }
}

impl Publish for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn publish(&self, frame_index: u64, recognitions: &[Recognition]) -> Result<(), Self::Error> {
    if !self.always && recognitions.is_empty() {
      return Ok(());
    }
    let path = self.frame_path(Utc::now(), frame_index)?;
    debug!("记录第 {} 帧结果: {}", frame_index, path.display());
    self.record(&path, recognitions)?;
    Ok(())
  }
}
