// 该文件是 Kanjian （看见） 项目的一部分。
// src/config.rs - 管线配置
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

use thiserror::Error;
use url::Url;

use crate::FromUrl;

pub const DEFAULT_OBJECTNESS_THRESHOLD: f32 = 0.9;
pub const DEFAULT_CLASS_CONFIDENCE_THRESHOLD: f32 = 0.9;
/// 针对会输出大量近似重复框的模型调校，任何轻微重叠都会被抑制
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.05;
pub const DEFAULT_THREADS: usize = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("阈值 {name} 必须位于 [0, 1] 区间, 实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("缺少标签文件路径")]
  MissingLabels,
  #[error("参数无效: {0}")]
  InvalidParameter(String),
}

/// 检测阈值，均为排他阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
  pub objectness: f32,
  pub class_confidence: f32,
  pub iou: f32,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      objectness: DEFAULT_OBJECTNESS_THRESHOLD,
      class_confidence: DEFAULT_CLASS_CONFIDENCE_THRESHOLD,
      iou: DEFAULT_IOU_THRESHOLD,
    }
  }
}

impl Thresholds {
  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, value) in [
      ("objectness", self.objectness),
      ("class_confidence", self.class_confidence),
      ("iou", self.iou),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }
    Ok(())
  }
}

/// 模型加载配置
///
/// 可从模型 URL 构建，查询参数 `labels`、`threads`、`accel` 会被读取:
/// `replay:///data/out.f32?labels=/data/labels.txt&threads=2&accel=true`
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
  pub model: Url,
  pub labels: PathBuf,
  pub threads: usize,
  pub use_acceleration: bool,
}

impl ModelConfig {
  pub fn new(model: Url, labels: impl Into<PathBuf>) -> Self {
    Self {
      model,
      labels: labels.into(),
      threads: DEFAULT_THREADS,
      use_acceleration: false,
    }
  }

  pub fn with_labels(mut self, labels: impl Into<PathBuf>) -> Self {
    self.labels = labels.into();
    self
  }

  pub fn with_threads(mut self, threads: usize) -> Self {
    self.threads = threads;
    self
  }

  pub fn with_acceleration(mut self, use_acceleration: bool) -> Self {
    self.use_acceleration = use_acceleration;
    self
  }
}

impl ModelConfig {
  /// 与 [`FromUrl::from_url`] 相同，但给出 `labels` 时覆盖查询参数中的标签路径
  pub fn from_url_with_labels(url: &Url, labels: Option<PathBuf>) -> Result<Self, ConfigError> {
    let explicit = labels.is_some();
    let mut labels = labels;
    let mut threads = DEFAULT_THREADS;
    let mut use_acceleration = false;

    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "labels" if !explicit => labels = Some(PathBuf::from(v.as_ref())),
        "threads" => {
          threads = v
            .parse()
            .map_err(|_| ConfigError::InvalidParameter(format!("threads={}", v)))?
        }
        "accel" => {
          use_acceleration = v
            .parse()
            .map_err(|_| ConfigError::InvalidParameter(format!("accel={}", v)))?
        }
        _ => {}
      }
    }

    Ok(Self {
      model: url.clone(),
      labels: labels.ok_or(ConfigError::MissingLabels)?,
      threads,
      use_acceleration,
    })
  }
}

impl FromUrl for ModelConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::from_url_with_labels(url, None)
  }
}
