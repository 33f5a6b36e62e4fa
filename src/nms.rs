// 该文件是 Kanjian （看见） 项目的一部分。
// src/nms.rs - 按类别的非极大值抑制
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

use std::collections::BTreeMap;

use tracing::debug;

use crate::decode::CandidateDetection;

/// 计算两个 [x_min, y_min, x_max, y_max] 框的 IoU
///
/// 面积为零或为负的框与任何框的 IoU 都为 0。
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  if a[2] <= a[0] || a[3] <= a[1] || b[2] <= b[0] || b[3] <= b[1] {
    return 0.0;
  }

  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别分组的非极大值抑制
///
/// 不同类别之间的重叠永远不会互相抑制。结果按 class id 升序、
/// 组内按分数降序排列，因此对输出再次执行抑制不会改变结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonMaxSuppressor {
  pub iou_threshold: f32,
}

impl NonMaxSuppressor {
  pub fn new(iou_threshold: f32) -> Self {
    Self { iou_threshold }
  }

  /// `model_width`/`model_height` 为模型输入的像素尺寸，IoU 在该空间中计算
  pub fn suppress(
    &self,
    candidates: Vec<CandidateDetection>,
    model_width: f32,
    model_height: f32,
  ) -> Vec<CandidateDetection> {
    let total = candidates.len();
    let mut by_class: BTreeMap<usize, Vec<CandidateDetection>> = BTreeMap::new();
    for candidate in candidates {
      by_class.entry(candidate.class_id).or_default().push(candidate);
    }

    let mut kept = Vec::with_capacity(total);
    for (_, mut group) in by_class {
      group.sort_by(|a, b| b.score.total_cmp(&a.score));
      let corners: Vec<[f32; 4]> = group
        .iter()
        .map(|c| c.corners(model_width, model_height))
        .collect();

      let mut suppressed = vec![false; group.len()];
      for i in 0..group.len() {
        if suppressed[i] {
          continue;
        }
        kept.push(group[i]);
        for j in (i + 1)..group.len() {
          if !suppressed[j] && iou(&corners[i], &corners[j]) > self.iou_threshold {
            suppressed[j] = true;
          }
        }
      }
    }

    debug!("NMS: {} 个候选保留 {} 个", total, kept.len());
    kept
  }
}
