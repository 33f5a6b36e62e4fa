// 该文件是 Kanjian （看见） 项目的一部分。
// src/model.rs - 推理引擎与标签表
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

use thiserror::Error;
use tracing::{debug, info};

use crate::FromUrl;
use crate::config::ModelConfig;
use crate::preprocess::InputTensor;

mod replay;
pub use self::replay::ReplayEngine;

#[cfg(feature = "backend-tract")]
mod tract;
#[cfg(feature = "backend-tract")]
pub use self::tract::{TractEngine, TractEngineBuilder};

/// 每个预测中类别分数之前的固定特征数: 4 个框参数 + 1 个目标置信度
pub const BOX_FEATURES: usize = 5;

/// 模型声明的输入元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorElementType {
  Float32,
  Float16,
  UInt8,
  Int8,
}

impl std::str::FromStr for TensorElementType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "f32" | "float32" => Ok(TensorElementType::Float32),
      "f16" | "float16" => Ok(TensorElementType::Float16),
      "u8" | "uint8" => Ok(TensorElementType::UInt8),
      "i8" | "int8" => Ok(TensorElementType::Int8),
      other => Err(format!("未知的张量类型: {}", other)),
    }
  }
}

/// 模型输入规格（NHWC，3 通道）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSpec {
  pub width: u32,
  pub height: u32,
  pub element_type: TensorElementType,
}

/// 模型输出形状，按预测优先排布
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputShape {
  pub num_predictions: usize,
  pub num_features: usize,
}

impl OutputShape {
  /// 元素总数，溢出时为 None
  pub fn checked_len(&self) -> Option<usize> {
    self.num_predictions.checked_mul(self.num_features)
  }

  /// 元素总数；溢出的形状在加载时即被拒绝，这里饱和到 `usize::MAX`
  pub fn len(&self) -> usize {
    self.checked_len().unwrap_or(usize::MAX)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 类别数量，特征数不足时为 0
  pub fn num_classes(&self) -> usize {
    self.num_features.saturating_sub(BOX_FEATURES)
  }
}

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("输入张量不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  InputMismatch {
    expected: InputSpec,
    actual: InputSpec,
  },
  #[error("输出长度不匹配: 期望 {expected}, 实际 {actual}")]
  OutputLength { expected: usize, actual: usize },
  #[error("推理后端错误: {0}")]
  Backend(String),
}

/// 推理引擎
///
/// 接收一个预处理后的输入张量，返回一个扁平的输出张量。
pub trait InferenceEngine: Send + Sync {
  fn name(&self) -> &'static str;
  fn input_spec(&self) -> InputSpec;
  fn output_shape(&self) -> OutputShape;
  fn infer(&self, input: &InputTensor) -> Result<Vec<f32>, EngineError>;
}

/// 引擎加载选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
  pub threads: usize,
  pub use_acceleration: bool,
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("不支持的模型 URL 方案: {0}")]
  UnsupportedScheme(String),
  #[error("模型文件读取失败 {path}: {source}")]
  MissingAsset {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("标签文件读取失败 {path}: {source}")]
  UnreadableLabels {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("标签文件为空: {0}")]
  EmptyLabels(PathBuf),
  #[error("模型参数无效: {0}")]
  InvalidParameter(String),
  #[error("模型输出形状无效: {0}")]
  InvalidOutputShape(String),
  #[error("类别数量不匹配: 模型输出 {model} 个类别，标签表有 {labels} 个")]
  ClassCountMismatch { model: usize, labels: usize },
  #[error("推理引擎初始化失败: {0}")]
  EngineInit(String),
}

/// 按 class id 索引的类别名称表
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
  labels: Box<[String]>,
}

impl LabelTable {
  /// 每行一个标签，忽略空行和首尾空白
  pub fn parse(text: &str) -> Self {
    text
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect()
  }

  pub fn from_path(path: &Path) -> Result<Self, ModelLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| ModelLoadError::UnreadableLabels {
      path: path.to_path_buf(),
      source,
    })?;
    let labels = Self::parse(&text);
    if labels.is_empty() {
      return Err(ModelLoadError::EmptyLabels(path.to_path_buf()));
    }
    debug!("从 {} 读取 {} 个标签", path.display(), labels.len());
    Ok(labels)
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.labels.get(class_id).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

impl<S: Into<String>> FromIterator<S> for LabelTable {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}

/// 已加载的模型：推理引擎与标签表
///
/// 由调度器独占持有，加载后只读，关闭时整体释放。
pub struct LoadedModel {
  engine: Box<dyn InferenceEngine>,
  labels: LabelTable,
  input: InputSpec,
  output: OutputShape,
}

impl std::fmt::Debug for LoadedModel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("LoadedModel")
      .field("engine", &self.engine.name())
      .field("labels", &self.labels.len())
      .field("input", &self.input)
      .field("output", &self.output)
      .finish()
  }
}

impl LoadedModel {
  /// 组合引擎与标签表，并检查输出形状与标签数量是否一致
  pub fn new(engine: Box<dyn InferenceEngine>, labels: LabelTable) -> Result<Self, ModelLoadError> {
    let input = engine.input_spec();
    let output = engine.output_shape();

    if input.width == 0 || input.height == 0 {
      return Err(ModelLoadError::InvalidParameter(format!(
        "模型输入尺寸为 {}x{}",
        input.width, input.height
      )));
    }
    if output.num_predictions == 0
      || output.num_features <= BOX_FEATURES
      || output.checked_len().is_none()
    {
      return Err(ModelLoadError::InvalidOutputShape(format!(
        "{} 个预测 x {} 个特征",
        output.num_predictions, output.num_features
      )));
    }
    if output.num_classes() != labels.len() {
      return Err(ModelLoadError::ClassCountMismatch {
        model: output.num_classes(),
        labels: labels.len(),
      });
    }

    debug!("模型输入: {:?}", input);
    debug!("模型输出: {:?}", output);
    Ok(Self {
      engine,
      labels,
      input,
      output,
    })
  }

  /// 根据配置加载模型与标签表
  pub fn load(config: &ModelConfig) -> Result<Self, ModelLoadError> {
    info!("加载模型: {}", config.model);
    let labels = LabelTable::from_path(&config.labels)?;
    let engine = build_engine(config)?;
    let model = Self::new(engine, labels)?;
    info!(
      "模型加载完成: 后端 {}, 输入 {}x{}, {} 个类别",
      model.engine.name(),
      model.input.width,
      model.input.height,
      model.labels.len()
    );
    Ok(model)
  }

  pub fn input_spec(&self) -> &InputSpec {
    &self.input
  }

  pub fn output_shape(&self) -> &OutputShape {
    &self.output
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn engine_name(&self) -> &'static str {
    self.engine.name()
  }

  pub fn infer(&self, input: &InputTensor) -> Result<Vec<f32>, EngineError> {
    let output = self.engine.infer(input)?;
    if output.len() != self.output.len() {
      return Err(EngineError::OutputLength {
        expected: self.output.len(),
        actual: output.len(),
      });
    }
    Ok(output)
  }
}

/// 按模型 URL 的方案选择推理后端
pub fn build_engine(config: &ModelConfig) -> Result<Box<dyn InferenceEngine>, ModelLoadError> {
  use crate::FromUrlWithScheme;

  let options = EngineOptions {
    threads: config.threads,
    use_acceleration: config.use_acceleration,
  };

  let scheme = config.model.scheme();

  if scheme == ReplayEngine::SCHEME {
    debug!("回放后端忽略引擎选项: {:?}", options);
    return Ok(Box::new(ReplayEngine::from_url(&config.model)?));
  }

  #[cfg(feature = "backend-tract")]
  {
    if scheme == TractEngineBuilder::SCHEME {
      let engine = TractEngineBuilder::from_url(&config.model)?
        .options(options)
        .build()?;
      return Ok(Box::new(engine));
    }
  }

  Err(ModelLoadError::UnsupportedScheme(scheme.to_string()))
}

/// 从 URL 查询参数中读取并解析一个值
pub(crate) fn query_param<T: std::str::FromStr>(
  url: &url::Url,
  key: &str,
) -> Result<Option<T>, ModelLoadError> {
  match url.query_pairs().find(|(k, _)| k == key) {
    Some((_, value)) => value
      .parse()
      .map(Some)
      .map_err(|_| ModelLoadError::InvalidParameter(format!("{}={}", key, value))),
    None => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct FixedShape(OutputShape);

  impl InferenceEngine for FixedShape {
    fn name(&self) -> &'static str {
      "fixed"
    }

    fn input_spec(&self) -> InputSpec {
      InputSpec {
        width: 8,
        height: 8,
        element_type: TensorElementType::Float32,
      }
    }

    fn output_shape(&self) -> OutputShape {
      self.0
    }

    fn infer(&self, _input: &InputTensor) -> Result<Vec<f32>, EngineError> {
      Ok(vec![0.0; self.0.len()])
    }
  }

  fn engine(num_features: usize) -> Box<dyn InferenceEngine> {
    Box::new(FixedShape(OutputShape {
      num_predictions: 4,
      num_features,
    }))
  }

  #[test]
  fn parse_labels_skips_blank_lines() {
    let labels = LabelTable::parse("person\n\n  bicycle \r\ncar\n");
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.get(1), Some("bicycle"));
    assert_eq!(labels.get(3), None);
  }

  #[test]
  fn class_count_mismatch_fails_fast() {
    let labels: LabelTable = ["a", "b"].into_iter().collect();
    let err = LoadedModel::new(engine(8), labels).unwrap_err();
    assert!(matches!(
      err,
      ModelLoadError::ClassCountMismatch {
        model: 3,
        labels: 2
      }
    ));
  }

  #[test]
  fn output_without_class_scores_is_rejected() {
    let labels = LabelTable::default();
    assert!(matches!(
      LoadedModel::new(engine(5), labels),
      Err(ModelLoadError::InvalidOutputShape(_))
    ));
  }

  #[test]
  fn overflowing_output_shape_is_rejected() {
    let engine = Box::new(FixedShape(OutputShape {
      num_predictions: usize::MAX,
      num_features: 21,
    }));
    let labels: LabelTable = (0..16).map(|i| i.to_string()).collect();
    assert!(matches!(
      LoadedModel::new(engine, labels),
      Err(ModelLoadError::InvalidOutputShape(_))
    ));
  }

  #[test]
  fn matching_model_loads() {
    let labels: LabelTable = ["a", "b", "c"].into_iter().collect();
    let model = LoadedModel::new(engine(8), labels).unwrap();
    assert_eq!(model.output_shape().num_classes(), 3);
    assert_eq!(model.engine_name(), "fixed");
  }

  #[test]
  fn missing_label_file() {
    let err = LabelTable::from_path(Path::new("/nonexistent/labels.txt")).unwrap_err();
    assert!(matches!(err, ModelLoadError::UnreadableLabels { .. }));
  }

  #[test]
  fn element_type_from_str() {
    assert_eq!(
      "f32".parse::<TensorElementType>(),
      Ok(TensorElementType::Float32)
    );
    assert_eq!(
      "UINT8".parse::<TensorElementType>(),
      Ok(TensorElementType::UInt8)
    );
    assert!("bf16".parse::<TensorElementType>().is_err());
  }
}
