// 该文件是 Kanjian （看见） 项目的一部分。
// src/preprocess.rs - 张量预处理
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

use image::imageops::{self, FilterType};
use thiserror::Error;
use tracing::debug;

use crate::frame::RgbRaster;
use crate::model::{InputSpec, TensorElementType};

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("不支持的模型输入类型: {0:?}")]
  UnsupportedElementType(TensorElementType),
  #[error("无效的尺寸: 图像 {image_width}x{image_height}, 模型输入 {input_width}x{input_height}")]
  InvalidSize {
    image_width: u32,
    image_height: u32,
    input_width: u32,
    input_height: u32,
  },
}

/// 张量数据，NHWC 排布（R,G,B,R,G,B,...），行优先
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
  Float32(Box<[f32]>),
  UInt8(Box<[u8]>),
}

/// 模型输入张量，形状为 `1 x H x W x 3`
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
  pub width: u32,
  pub height: u32,
  pub data: TensorData,
}

impl InputTensor {
  pub fn len(&self) -> usize {
    match &self.data {
      TensorData::Float32(data) => data.len(),
      TensorData::UInt8(data) => data.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn element_type(&self) -> TensorElementType {
    match self.data {
      TensorData::Float32(_) => TensorElementType::Float32,
      TensorData::UInt8(_) => TensorElementType::UInt8,
    }
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, self.height as usize, self.width as usize, RGB_CHANNELS]
  }
}

/// 双线性缩放到模型输入尺寸，并按模型声明的元素类型编码
///
/// - `Float32`: 每个通道除以 255，取值 `[0.0, 1.0]`
/// - `UInt8`: 原样写入字节
///
/// 其余类型立即返回错误，避免产生错误数据。
pub fn preprocess(raster: &RgbRaster, spec: &InputSpec) -> Result<InputTensor, PreprocessError> {
  let (image_width, image_height) = raster.dimensions();
  if image_width == 0 || image_height == 0 || spec.width == 0 || spec.height == 0 {
    return Err(PreprocessError::InvalidSize {
      image_width,
      image_height,
      input_width: spec.width,
      input_height: spec.height,
    });
  }

  if !matches!(
    spec.element_type,
    TensorElementType::Float32 | TensorElementType::UInt8
  ) {
    return Err(PreprocessError::UnsupportedElementType(spec.element_type));
  }

  let resized;
  let source = if raster.dimensions() == (spec.width, spec.height) {
    raster
  } else {
    debug!(
      "缩放图像 {}x{} -> {}x{}",
      image_width, image_height, spec.width, spec.height
    );
    resized = imageops::resize(raster, spec.width, spec.height, FilterType::Triangle);
    &resized
  };

  let bytes = source.as_raw();
  let data = match spec.element_type {
    TensorElementType::Float32 => {
      TensorData::Float32(bytes.iter().map(|&b| b as f32 / 255.0).collect())
    }
    TensorElementType::UInt8 => TensorData::UInt8(bytes.clone().into_boxed_slice()),
    other => return Err(PreprocessError::UnsupportedElementType(other)),
  };

  Ok(InputTensor {
    width: spec.width,
    height: spec.height,
    data,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn spec(width: u32, height: u32, element_type: TensorElementType) -> InputSpec {
    InputSpec {
      width,
      height,
      element_type,
    }
  }

  #[test]
  fn float_tensor_is_normalized_and_interleaved() {
    let mut raster = RgbRaster::new(2, 1);
    raster.put_pixel(0, 0, Rgb([255, 0, 51]));
    raster.put_pixel(1, 0, Rgb([0, 255, 102]));

    let tensor = preprocess(&raster, &spec(2, 1, TensorElementType::Float32)).unwrap();
    assert_eq!(tensor.shape(), [1, 1, 2, 3]);
    let TensorData::Float32(data) = tensor.data else {
      panic!("expected float tensor");
    };
    assert_eq!(&data[..], &[1.0, 0.0, 0.2, 0.0, 1.0, 0.4]);
  }

  #[test]
  fn resizes_to_model_input() {
    let raster = RgbRaster::from_pixel(64, 48, Rgb([10, 20, 30]));
    let tensor = preprocess(&raster, &spec(32, 32, TensorElementType::Float32)).unwrap();
    assert_eq!(tensor.len(), 32 * 32 * 3);
    let TensorData::Float32(data) = tensor.data else {
      panic!("expected float tensor");
    };
    assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
    assert!((data[0] - 10.0 / 255.0).abs() < 1e-6);
    assert!((data[2] - 30.0 / 255.0).abs() < 1e-6);
  }

  #[test]
  fn uint8_tensor_keeps_bytes() {
    let raster = RgbRaster::from_pixel(4, 4, Rgb([1, 2, 3]));
    let tensor = preprocess(&raster, &spec(4, 4, TensorElementType::UInt8)).unwrap();
    assert_eq!(tensor.element_type(), TensorElementType::UInt8);
    let TensorData::UInt8(data) = tensor.data else {
      panic!("expected byte tensor");
    };
    assert_eq!(&data[..6], &[1, 2, 3, 1, 2, 3]);
  }

  #[test]
  fn unsupported_type_fails_fast() {
    let raster = RgbRaster::new(4, 4);
    let err = preprocess(&raster, &spec(4, 4, TensorElementType::Float16)).unwrap_err();
    assert_eq!(
      err,
      PreprocessError::UnsupportedElementType(TensorElementType::Float16)
    );
  }

  #[test]
  fn empty_raster_is_rejected() {
    let raster = RgbRaster::new(0, 0);
    assert!(matches!(
      preprocess(&raster, &spec(4, 4, TensorElementType::Float32)),
      Err(PreprocessError::InvalidSize { .. })
    ));
  }
}
