// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/replay.rs - 回放推理后端
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

use tracing::{debug, error, info};
use url::Url;

use super::{
  EngineError, InferenceEngine, InputSpec, ModelLoadError, OutputShape, TensorElementType,
  query_param,
};
use crate::preprocess::InputTensor;
use crate::{FromUrl, FromUrlWithScheme};

const REPLAY_SCHEME: &str = "replay";
const REPLAY_DEFAULT_INPUT_W: u32 = 640;
const REPLAY_DEFAULT_INPUT_H: u32 = 640;
const REPLAY_DEFAULT_PREDICTIONS: usize = 8400;
const REPLAY_DEFAULT_FEATURES: usize = 21;

/// 回放后端
///
/// 对每一帧都返回同一个预先录制的输出张量。用于演示、测试，
/// 以及在没有真实推理硬件的主机上联调整条管线。
///
/// URL 形式:
/// `replay:///path/output.f32?width=640&height=640&predictions=8400&features=21&dtype=f32`
///
/// 文件内容为小端序 f32，长度必须等于 `predictions * features`。
#[derive(Debug, Clone)]
pub struct ReplayEngine {
  input: InputSpec,
  shape: OutputShape,
  output: Box<[f32]>,
}

impl ReplayEngine {
  pub fn new(
    input: InputSpec,
    shape: OutputShape,
    output: Vec<f32>,
  ) -> Result<Self, ModelLoadError> {
    let expected = shape.checked_len().ok_or_else(|| {
      ModelLoadError::InvalidOutputShape(format!(
        "形状 {}x{} 的元素数溢出",
        shape.num_predictions, shape.num_features
      ))
    })?;
    if output.len() != expected {
      return Err(ModelLoadError::InvalidOutputShape(format!(
        "回放张量长度 {} 与形状 {}x{} 不符",
        output.len(),
        shape.num_predictions,
        shape.num_features
      )));
    }
    Ok(Self {
      input,
      shape,
      output: output.into_boxed_slice(),
    })
  }
}

impl FromUrlWithScheme for ReplayEngine {
  const SCHEME: &'static str = REPLAY_SCHEME;
}

impl FromUrl for ReplayEngine {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::UnsupportedScheme(url.scheme().to_string()));
    }

    let input = InputSpec {
      width: query_param(url, "width")?.unwrap_or(REPLAY_DEFAULT_INPUT_W),
      height: query_param(url, "height")?.unwrap_or(REPLAY_DEFAULT_INPUT_H),
      element_type: query_param(url, "dtype")?.unwrap_or(TensorElementType::Float32),
    };
    let shape = OutputShape {
      num_predictions: query_param(url, "predictions")?.unwrap_or(REPLAY_DEFAULT_PREDICTIONS),
      num_features: query_param(url, "features")?.unwrap_or(REPLAY_DEFAULT_FEATURES),
    };

    let path = PathBuf::from(url.path());
    info!("读取回放张量: {}", path.display());
    let bytes = std::fs::read(&path).map_err(|source| ModelLoadError::MissingAsset {
      path: path.clone(),
      source,
    })?;
    debug!("回放张量大小: {:.2} KB", bytes.len() as f64 / 1024.0);

    if bytes.len() % 4 != 0 {
      error!("回放张量字节数 {} 不是 4 的倍数", bytes.len());
      return Err(ModelLoadError::InvalidOutputShape(format!(
        "{} 字节不是 f32 对齐的",
        bytes.len()
      )));
    }

    let output = bytes
      .chunks_exact(4)
      .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
      .collect();

    Self::new(input, shape, output)
  }
}

impl InferenceEngine for ReplayEngine {
  fn name(&self) -> &'static str {
    REPLAY_SCHEME
  }

  fn input_spec(&self) -> InputSpec {
    self.input
  }

  fn output_shape(&self) -> OutputShape {
    self.shape
  }

  fn infer(&self, input: &InputTensor) -> Result<Vec<f32>, EngineError> {
    let actual = InputSpec {
      width: input.width,
      height: input.height,
      element_type: input.element_type(),
    };
    if actual != self.input {
      return Err(EngineError::InputMismatch {
        expected: self.input,
        actual,
      });
    }
    Ok(self.output.to_vec())
  }
}
