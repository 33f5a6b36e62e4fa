// 该文件是 Kanjian （看见） 项目的一部分。
// src/model/tract.rs - tract ONNX 推理后端
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

use tract_onnx::prelude::*;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{
  EngineError, EngineOptions, InferenceEngine, InputSpec, ModelLoadError, OutputShape,
  TensorElementType, query_param,
};
use crate::preprocess::{InputTensor, TensorData};
use crate::{FromUrl, FromUrlWithScheme};

const TRACT_SCHEME: &str = "tract";
const TRACT_DEFAULT_INPUT_W: u32 = 640;
const TRACT_DEFAULT_INPUT_H: u32 = 640;

/// 基于 tract 的 ONNX 推理后端（CPU）
pub struct TractEngine {
  plan: SimplePlan<TypedFact, Box<dyn TypedOp>>,
  input: InputSpec,
  shape: OutputShape,
}

pub struct TractEngineBuilder {
  model_path: String,
  input: InputSpec,
  options: EngineOptions,
}

impl FromUrlWithScheme for TractEngineBuilder {
  const SCHEME: &'static str = TRACT_SCHEME;
}

impl FromUrl for TractEngineBuilder {
  type Error = ModelLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ModelLoadError::UnsupportedScheme(url.scheme().to_string()));
    }

    Ok(TractEngineBuilder {
      model_path: url.path().to_string(),
      input: InputSpec {
        width: query_param(url, "width")?.unwrap_or(TRACT_DEFAULT_INPUT_W),
        height: query_param(url, "height")?.unwrap_or(TRACT_DEFAULT_INPUT_H),
        element_type: query_param(url, "dtype")?.unwrap_or(TensorElementType::Float32),
      },
      options: EngineOptions {
        threads: 1,
        use_acceleration: false,
      },
    })
  }
}

/// 输出形状取最后两维 `[.., predictions, features]`
fn output_shape_from_dims(dims: &[usize]) -> Result<OutputShape, ModelLoadError> {
  let &[.., num_predictions, num_features] = dims else {
    return Err(ModelLoadError::InvalidOutputShape(format!("{:?}", dims)));
  };
  let shape = OutputShape {
    num_predictions,
    num_features,
  };
  if shape.checked_len().is_none() {
    return Err(ModelLoadError::InvalidOutputShape(format!("{:?}", dims)));
  }
  Ok(shape)
}

fn engine_init(context: &str, e: impl std::fmt::Display) -> ModelLoadError {
  error!("{}: {}", context, e);
  ModelLoadError::EngineInit(format!("{}: {}", context, e))
}

impl TractEngineBuilder {
  /// tract 在当前线程上执行推理，`threads` 与 `use_acceleration` 都不生效
  pub fn options(mut self, options: EngineOptions) -> Self {
    self.options = options;
    self
  }

  pub fn build(self) -> Result<TractEngine, ModelLoadError> {
    info!("加载 ONNX 模型文件: {}", self.model_path);
    if self.options.use_acceleration {
      warn!("tract 后端只在 CPU 上运行，忽略硬件加速选项");
    }
    if self.options.threads > 1 {
      debug!("tract 后端单线程推理，忽略线程数 {}", self.options.threads);
    }

    let datum_type = match self.input.element_type {
      TensorElementType::Float32 => f32::datum_type(),
      TensorElementType::UInt8 => u8::datum_type(),
      other => {
        return Err(ModelLoadError::InvalidParameter(format!(
          "tract 后端不支持输入类型 {:?}",
          other
        )));
      }
    };

    let model = tract_onnx::onnx()
      .model_for_path(&self.model_path)
      .map_err(|e| engine_init("无法加载 ONNX 模型", e))?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(
          datum_type,
          tvec!(
            1,
            self.input.height as usize,
            self.input.width as usize,
            3
          ),
        ),
      )
      .map_err(|e| engine_init("无法设置输入形状", e))?
      .into_optimized()
      .map_err(|e| engine_init("无法优化模型", e))?;

    let dims: Vec<usize> = model
      .output_fact(0)
      .map_err(|e| engine_init("无法获取输出形状", e))?
      .shape
      .as_concrete()
      .map(|dims| dims.to_vec())
      .ok_or_else(|| ModelLoadError::InvalidOutputShape("输出形状不是静态的".to_string()))?;
    debug!("模型输出形状: {:?}", dims);

    let shape = output_shape_from_dims(&dims)?;

    let plan = model
      .into_runnable()
      .map_err(|e| engine_init("无法构建可运行模型", e))?;
    info!("模型加载完成");

    Ok(TractEngine {
      plan,
      input: self.input,
      shape,
    })
  }
}

impl InferenceEngine for TractEngine {
  fn name(&self) -> &'static str {
    TRACT_SCHEME
  }

  fn input_spec(&self) -> InputSpec {
    self.input
  }

  fn output_shape(&self) -> OutputShape {
    self.shape
  }

  fn infer(&self, input: &InputTensor) -> Result<Vec<f32>, EngineError> {
    let shape = input.shape();
    let tensor: Tensor = match &input.data {
      TensorData::Float32(data) => tract_ndarray::Array4::from_shape_vec(
        (shape[0], shape[1], shape[2], shape[3]),
        data.to_vec(),
      )
      .map_err(|e| EngineError::Backend(e.to_string()))?
      .into_tensor(),
      TensorData::UInt8(data) => tract_ndarray::Array4::from_shape_vec(
        (shape[0], shape[1], shape[2], shape[3]),
        data.to_vec(),
      )
      .map_err(|e| EngineError::Backend(e.to_string()))?
      .into_tensor(),
    };

    debug!("执行 ONNX 推理");
    let outputs = self
      .plan
      .run(tvec!(tensor.into()))
      .map_err(|e| EngineError::Backend(e.to_string()))?;
    let output = outputs
      .first()
      .ok_or_else(|| EngineError::Backend("模型没有输出".to_string()))?;
    let view = output
      .to_array_view::<f32>()
      .map_err(|e| EngineError::Backend(e.to_string()))?;

    Ok(view.iter().copied().collect())
  }
}
