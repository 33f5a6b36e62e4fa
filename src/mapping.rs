// 该文件是 Kanjian （看见） 项目的一部分。
// src/mapping.rs - 模型坐标到原始帧坐标的映射
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

use tracing::debug;

use crate::decode::CandidateDetection;
use crate::model::LabelTable;

/// 原始帧像素坐标中的轴对齐矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl Rect {
  pub fn width(&self) -> f32 {
    self.right - self.left
  }

  pub fn height(&self) -> f32 {
    self.bottom - self.top
  }
}

/// 管线对外输出的识别结果
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
  pub class_id: usize,
  pub label: String,
  pub score: f32,
  pub rect: Rect,
}

/// 映射过程中丢弃的检测数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapReport {
  /// class id 超出标签表范围
  pub out_of_range_class: u64,
  /// 裁剪后宽或高不为正
  pub degenerate: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
  pub model_width: u32,
  pub model_height: u32,
  pub frame_width: u32,
  pub frame_height: u32,
}

impl CoordinateMapper {
  pub fn new(model_width: u32, model_height: u32, frame_width: u32, frame_height: u32) -> Self {
    Self {
      model_width,
      model_height,
      frame_width,
      frame_height,
    }
  }

  /// 将候选框缩放到原始帧，并裁剪到 `[0, dim - 1]`
  ///
  /// class id 越界或裁剪后退化的检测直接丢弃，不会以占位标签输出。
  pub fn map(
    &self,
    candidates: &[CandidateDetection],
    labels: &LabelTable,
  ) -> (Vec<Recognition>, MapReport) {
    let mut report = MapReport::default();
    let mut recognitions = Vec::with_capacity(candidates.len());

    let (model_w, model_h) = (self.model_width as f32, self.model_height as f32);
    let scale_x = self.frame_width as f32 / model_w;
    let scale_y = self.frame_height as f32 / model_h;
    let max_x = self.frame_width.saturating_sub(1) as f32;
    let max_y = self.frame_height.saturating_sub(1) as f32;

    for candidate in candidates {
      let Some(label) = labels.get(candidate.class_id) else {
        report.out_of_range_class += 1;
        continue;
      };

      let [x_min, y_min, x_max, y_max] = candidate.corners(model_w, model_h);
      let rect = Rect {
        left: (x_min * scale_x).clamp(0.0, max_x),
        top: (y_min * scale_y).clamp(0.0, max_y),
        right: (x_max * scale_x).clamp(0.0, max_x),
        bottom: (y_max * scale_y).clamp(0.0, max_y),
      };

      // NaN 坐标也视为退化
      if !(rect.right > rect.left && rect.bottom > rect.top) {
        report.degenerate += 1;
        continue;
      }

      recognitions.push(Recognition {
        class_id: candidate.class_id,
        label: label.to_string(),
        score: candidate.score,
        rect,
      });
    }

    if report != MapReport::default() {
      debug!(
        "坐标映射丢弃: {} 个越界类别, {} 个退化框",
        report.out_of_range_class, report.degenerate
      );
    }

    (recognitions, report)
  }
}
