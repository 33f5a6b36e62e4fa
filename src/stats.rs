// 该文件是 Kanjian （看见） 项目的一部分。
// src/stats.rs - 管线计数器
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

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;

/// 管线运行计数器，供宿主程序观察有损降级行为
#[derive(Debug, Default)]
pub struct PipelineStats {
  frames_accepted: AtomicU64,
  frames_dropped_busy: AtomicU64,
  frames_not_ready: AtomicU64,
  frames_failed: AtomicU64,
  frames_discarded: AtomicU64,
  chroma_fallback_pixels: AtomicU64,
  out_of_range_class_ids: AtomicU64,
  degenerate_boxes: AtomicU64,
  recognitions_published: AtomicU64,
}

/// [`PipelineStats`] 在某一时刻的快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
  pub frames_accepted: u64,
  pub frames_dropped_busy: u64,
  pub frames_not_ready: u64,
  pub frames_failed: u64,
  pub frames_discarded: u64,
  pub chroma_fallback_pixels: u64,
  pub out_of_range_class_ids: u64,
  pub degenerate_boxes: u64,
  pub recognitions_published: u64,
}

// 本地累加，同时上报到宿主安装的 `metrics` 记录器
macro_rules! stat_counter {
  ($($name:ident => $field:ident : $metric:literal),* $(,)?) => {
    $(
      pub fn $name(&self, n: u64) {
        if n > 0 {
          self.$field.fetch_add(n, Ordering::Relaxed);
          counter!($metric).increment(n);
        }
      }
    )*
  };
}

impl PipelineStats {
  stat_counter! {
    add_accepted => frames_accepted: "kanjian_frames_accepted_total",
    add_dropped_busy => frames_dropped_busy: "kanjian_frames_dropped_busy_total",
    add_not_ready => frames_not_ready: "kanjian_frames_not_ready_total",
    add_failed => frames_failed: "kanjian_frames_failed_total",
    add_discarded => frames_discarded: "kanjian_frames_discarded_total",
    add_chroma_fallback => chroma_fallback_pixels: "kanjian_chroma_fallback_pixels_total",
    add_out_of_range_class => out_of_range_class_ids: "kanjian_out_of_range_class_ids_total",
    add_degenerate => degenerate_boxes: "kanjian_degenerate_boxes_total",
    add_published => recognitions_published: "kanjian_recognitions_published_total",
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    StatsSnapshot {
      frames_accepted: self.frames_accepted.load(Ordering::Relaxed),
      frames_dropped_busy: self.frames_dropped_busy.load(Ordering::Relaxed),
      frames_not_ready: self.frames_not_ready.load(Ordering::Relaxed),
      frames_failed: self.frames_failed.load(Ordering::Relaxed),
      frames_discarded: self.frames_discarded.load(Ordering::Relaxed),
      chroma_fallback_pixels: self.chroma_fallback_pixels.load(Ordering::Relaxed),
      out_of_range_class_ids: self.out_of_range_class_ids.load(Ordering::Relaxed),
      degenerate_boxes: self.degenerate_boxes.load(Ordering::Relaxed),
      recognitions_published: self.recognitions_published.load(Ordering::Relaxed),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
  };
  use std::collections::HashMap;
  use std::sync::{Arc, Mutex};

  /// 只记录计数器的记录器
  #[derive(Default)]
  struct CountingRecorder {
    counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
  }

  impl CountingRecorder {
    fn value(&self, name: &str) -> u64 {
      self
        .counters
        .lock()
        .unwrap()
        .get(name)
        .map_or(0, |c| c.load(Ordering::Relaxed))
    }
  }

  impl Recorder for CountingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
      let counter = Arc::clone(
        self
          .counters
          .lock()
          .unwrap()
          .entry(key.name().to_string())
          .or_default(),
      );
      Counter::from_arc(counter)
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
      Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
      Histogram::noop()
    }
  }

  #[test]
  fn counters_reach_metrics_recorder() {
    let recorder = CountingRecorder::default();
    let stats = PipelineStats::default();
    metrics::with_local_recorder(&recorder, || {
      stats.add_dropped_busy(1);
      stats.add_dropped_busy(1);
      stats.add_chroma_fallback(7);
      stats.add_not_ready(0);
    });
    assert_eq!(recorder.value("kanjian_frames_dropped_busy_total"), 2);
    assert_eq!(recorder.value("kanjian_chroma_fallback_pixels_total"), 7);
    assert_eq!(recorder.value("kanjian_frames_not_ready_total"), 0);
    assert_eq!(stats.snapshot().frames_dropped_busy, 2);
  }

  #[test]
  fn counters_accumulate() {
    let stats = PipelineStats::default();
    stats.add_accepted(1);
    stats.add_accepted(2);
    stats.add_chroma_fallback(0);
    stats.add_degenerate(5);
    let snapshot = stats.snapshot();
    assert_eq!(snapshot.frames_accepted, 3);
    assert_eq!(snapshot.chroma_fallback_pixels, 0);
    assert_eq!(snapshot.degenerate_boxes, 5);
  }
}
