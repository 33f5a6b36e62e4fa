// 该文件是 Kanjian （看见） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

#![allow(dead_code)]

use std::path::Path;

use kanjian::model::{
  InputSpec, LabelTable, LoadedModel, OutputShape, ReplayEngine, TensorElementType,
};

pub const MODEL_SIZE: u32 = 8;
pub const NUM_PREDICTIONS: usize = 4;
pub const NUM_FEATURES: usize = 8;

pub fn input_spec(element_type: TensorElementType) -> InputSpec {
  InputSpec {
    width: MODEL_SIZE,
    height: MODEL_SIZE,
    element_type,
  }
}

pub fn output_shape() -> OutputShape {
  OutputShape {
    num_predictions: NUM_PREDICTIONS,
    num_features: NUM_FEATURES,
  }
}

pub fn labels() -> LabelTable {
  ["cat", "dog", "bird"].into_iter().collect()
}

/// 一个预测: [cx, cy, w, h, objectness, class scores...]
pub fn prediction(bbox: [f32; 4], objectness: f32, classes: [f32; 3]) -> Vec<f32> {
  let mut row = bbox.to_vec();
  row.push(objectness);
  row.extend_from_slice(&classes);
  row
}

/// 第一个预测是居中的 dog，其余都是背景
pub fn single_dog_tensor() -> Vec<f32> {
  let mut output = prediction([0.5, 0.5, 0.5, 0.5], 0.95, [0.1, 0.97, 0.2]);
  for _ in 1..NUM_PREDICTIONS {
    output.extend(prediction([0.5, 0.5, 0.2, 0.2], 0.0, [0.0; 3]));
  }
  output
}

pub fn replay_model(output: Vec<f32>) -> LoadedModel {
  let engine = ReplayEngine::new(input_spec(TensorElementType::Float32), output_shape(), output)
    .unwrap();
  LoadedModel::new(Box::new(engine), labels()).unwrap()
}

/// 将回放张量与标签表写入目录，返回模型 URL
pub fn write_replay_assets(dir: &Path, output: &[f32], labels: &str) -> url::Url {
  let tensor = dir.join("output.f32");
  let bytes: Vec<u8> = output.iter().flat_map(|v| v.to_le_bytes()).collect();
  std::fs::write(&tensor, bytes).unwrap();

  let label_path = dir.join("labels.txt");
  std::fs::write(&label_path, labels).unwrap();

  url::Url::parse(&format!(
    "replay://{}?width={}&height={}&predictions={}&features={}&labels={}",
    tensor.display(),
    MODEL_SIZE,
    MODEL_SIZE,
    NUM_PREDICTIONS,
    NUM_FEATURES,
    label_path.display()
  ))
  .unwrap()
}
