// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/yuv_file.rs - 原始 I420 流文件输入
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

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::I420Buffer};

#[derive(Error, Debug)]
pub enum YuvFileInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Missing or invalid parameter: {0}")]
  InvalidParameter(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

const YUV_FILE_SCHEME: &str = "yuv";

/// 连续存放的 I420 帧流，例如 `ffmpeg -pix_fmt yuv420p -f rawvideo` 的输出
///
/// URL 形式: `yuv:///path/video.yuv?width=640&height=480`
pub struct YuvFileInput {
  reader: BufReader<File>,
  width: u32,
  height: u32,
  frame_index: u64,
}

impl FromUrlWithScheme for YuvFileInput {
  const SCHEME: &'static str = YUV_FILE_SCHEME;
}

impl FromUrl for YuvFileInput {
  type Error = YuvFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(YuvFileInputError::SchemeMismatch);
    }

    let query_pairs: HashMap<_, _> = url.query_pairs().collect();
    let dimension = |key: &str| -> Result<u32, YuvFileInputError> {
      query_pairs
        .get(key)
        .and_then(|v| v.parse().ok())
        .filter(|&v: &u32| v > 0)
        .ok_or_else(|| YuvFileInputError::InvalidParameter(key.to_string()))
    };
    let width = dimension("width")?;
    let height = dimension("height")?;

    info!("打开 I420 文件: {} ({}x{})", url.path(), width, height);
    let file = File::open(url.path())?;

    Ok(YuvFileInput {
      reader: BufReader::new(file),
      width,
      height,
      frame_index: 0,
    })
  }
}

impl YuvFileInput {
  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }
}

impl Iterator for YuvFileInput {
  type Item = I420Buffer;

  fn next(&mut self) -> Option<Self::Item> {
    let frame_len = I420Buffer::frame_len(self.width, self.height);
    let mut data = Vec::with_capacity(frame_len);

    match (&mut self.reader)
      .take(frame_len as u64)
      .read_to_end(&mut data)
    {
      Ok(0) => return None,
      Ok(n) if n < frame_len => {
        warn!(
          "第 {} 帧数据不完整: {} / {} 字节，忽略",
          self.frame_index, n, frame_len
        );
        return None;
      }
      Ok(_) => {}
      Err(e) => {
        error!("读取第 {} 帧失败: {}", self.frame_index, e);
        return None;
      }
    }

    self.frame_index += 1;
    I420Buffer::from_vec(self.width, self.height, data)
  }
}
