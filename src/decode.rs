// 该文件是 Kanjian （看见） 项目的一部分。
// src/decode.rs - 检测输出解码
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

use thiserror::Error;
use tracing::debug;

use crate::model::{BOX_FEATURES, OutputShape};

const OBJECTNESS_OFFSET: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("输出张量长度 {actual} 小于形状要求的 {expected}")]
  TensorTooShort { expected: usize, actual: usize },
  #[error("每个预测的特征数 {0} 不足以包含类别分数")]
  TooFewFeatures(usize),
}

/// 解码后的候选检测，坐标为模型输入尺寸的比例
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateDetection {
  /// [x_center, y_center, width, height]
  pub bbox: [f32; 4],
  pub class_id: usize,
  /// 目标置信度与类别置信度之积
  pub score: f32,
}

impl CandidateDetection {
  /// 转换为模型输入像素空间中的 [x_min, y_min, x_max, y_max]
  pub fn corners(&self, model_width: f32, model_height: f32) -> [f32; 4] {
    let [cx, cy, w, h] = self.bbox;
    [
      (cx - w / 2.0) * model_width,
      (cy - h / 2.0) * model_height,
      (cx + w / 2.0) * model_width,
      (cy + h / 2.0) * model_height,
    ]
  }
}

/// 两阶段阈值解码器
///
/// 先用目标置信度过滤背景预测，只有通过的预测才扫描类别分数。
/// 两个阈值都是排他的：分数等于阈值时会被丢弃。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionDecoder {
  pub objectness_threshold: f32,
  pub class_confidence_threshold: f32,
}

impl DetectionDecoder {
  pub fn new(objectness_threshold: f32, class_confidence_threshold: f32) -> Self {
    Self {
      objectness_threshold,
      class_confidence_threshold,
    }
  }

  pub fn decode(
    &self,
    output: &[f32],
    shape: &OutputShape,
  ) -> Result<Vec<CandidateDetection>, DecodeError> {
    if shape.num_features <= BOX_FEATURES {
      return Err(DecodeError::TooFewFeatures(shape.num_features));
    }
    if output.len() < shape.len() {
      return Err(DecodeError::TensorTooShort {
        expected: shape.len(),
        actual: output.len(),
      });
    }

    let mut candidates = Vec::new();

    for prediction in output[..shape.len()].chunks_exact(shape.num_features) {
      let objectness = prediction[OBJECTNESS_OFFSET];
      if objectness.is_nan() || objectness <= self.objectness_threshold {
        continue;
      }

      let classes = &prediction[BOX_FEATURES..];
      let (class_id, class_score) = classes
        .iter()
        .copied()
        .enumerate()
        .skip(1)
        .fold((0, classes[0]), |best, (idx, score)| {
          if score > best.1 { (idx, score) } else { best }
        });

      if class_score.is_nan() || class_score <= self.class_confidence_threshold {
        continue;
      }

      candidates.push(CandidateDetection {
        bbox: [prediction[0], prediction[1], prediction[2], prediction[3]],
        class_id,
        score: objectness * class_score,
      });
    }

    debug!(
      "解码 {} 个预测，得到 {} 个候选",
      shape.num_predictions,
      candidates.len()
    );
    Ok(candidates)
  }
}
