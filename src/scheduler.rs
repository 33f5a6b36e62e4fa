// 该文件是 Kanjian （看见） 项目的一部分。
// src/scheduler.rs - 帧调度与模型生命周期
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

//! # 帧调度器
//!
//! [`FrameScheduler`] 在相机回调中被同步调用，每次处理一帧：
//!
//! - 单帧在途：上一帧尚未处理完时到达的新帧直接丢弃，不排队；
//! - 模型（推理引擎与标签表）由调度器独占持有，显式地加载、使用、释放；
//! - 加载或释放期间不会有帧在处理，此时到达的帧得到 [`FrameError::NotReady`]；
//! - [`FrameScheduler::stop`] 之后不再接收新帧，在途帧允许完成但结果被丢弃。
//!
//! ```no_run
//! use kanjian::{FromUrl, config::{ModelConfig, Thresholds}, scheduler::FrameScheduler};
//! use url::Url;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = FrameScheduler::new(Thresholds::default())?;
//! let url = Url::parse("replay:///data/out.f32?labels=/data/labels.txt")?;
//! scheduler.load(&ModelConfig::from_url(&url)?)?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, TryLockError};
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::config::{ConfigError, ModelConfig, Thresholds};
use crate::frame::RawFrame;
use crate::mapping::Recognition;
use crate::model::{LoadedModel, ModelLoadError};
use crate::pipeline::{FrameError, detect_frame};
use crate::stats::{PipelineStats, StatsSnapshot};

/// 在作用域结束时清除忙标志
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

#[derive(Debug)]
pub struct FrameScheduler {
  thresholds: Thresholds,
  model: RwLock<Option<LoadedModel>>,
  busy: AtomicBool,
  active: AtomicBool,
  stats: PipelineStats,
}

impl FrameScheduler {
  pub fn new(thresholds: Thresholds) -> Result<Self, ConfigError> {
    thresholds.validate()?;
    Ok(Self {
      thresholds,
      model: RwLock::new(None),
      busy: AtomicBool::new(false),
      active: AtomicBool::new(true),
      stats: PipelineStats::default(),
    })
  }

  pub fn thresholds(&self) -> &Thresholds {
    &self.thresholds
  }

  /// 加载模型与标签表；已加载时直接返回成功
  pub fn load(&self, config: &ModelConfig) -> Result<(), ModelLoadError> {
    let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
      debug!("模型已加载，忽略重复加载");
      return Ok(());
    }
    *slot = Some(LoadedModel::load(config)?);
    Ok(())
  }

  /// 在后台线程中加载模型，期间到达的帧得到 `NotReady`
  pub fn spawn_load(
    self: &Arc<Self>,
    config: ModelConfig,
  ) -> JoinHandle<Result<(), ModelLoadError>> {
    let scheduler = Arc::clone(self);
    std::thread::spawn(move || {
      let result = scheduler.load(&config);
      if let Err(e) = &result {
        warn!("后台加载模型失败: {}", e);
      }
      result
    })
  }

  /// 安装一个已构建好的模型；已加载时保留现有模型并返回 false
  pub fn install(&self, model: LoadedModel) -> bool {
    let mut slot = self.model.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
      debug!("模型已加载，忽略安装");
      return false;
    }
    info!("安装模型: {:?}", model);
    *slot = Some(model);
    true
  }

  /// 释放推理引擎与标签表；未加载时什么也不做
  pub fn shutdown(&self) {
    let released = self
      .model
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    if released.is_some() {
      info!("模型已释放");
    }
  }

  pub fn is_ready(&self) -> bool {
    match self.model.try_read() {
      Ok(slot) => slot.is_some(),
      Err(TryLockError::Poisoned(e)) => e.into_inner().is_some(),
      Err(TryLockError::WouldBlock) => false,
    }
  }

  /// 重新开始接收帧
  pub fn start(&self) {
    self.active.store(true, Ordering::Release);
  }

  /// 停止接收帧；在途帧的结果会被丢弃
  pub fn stop(&self) {
    info!("停止接收帧");
    self.active.store(false, Ordering::Release);
  }

  pub fn is_active(&self) -> bool {
    self.active.load(Ordering::Acquire)
  }

  pub fn stats(&self) -> StatsSnapshot {
    self.stats.snapshot()
  }

  /// 处理一帧
  ///
  /// 返回 `Ok` 时列表可能为空（没有目标）。帧被丢弃或无法处理时返回
  /// [`FrameError`]，调度器保持可用，下一帧即是重试。
  pub fn submit_frame(&self, frame: &RawFrame<'_>) -> Result<Vec<Recognition>, FrameError> {
    if !self.is_active() {
      self.stats.add_discarded(1);
      return Err(FrameError::Stopped);
    }

    if self
      .busy
      .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
      .is_err()
    {
      debug!("上一帧仍在处理中，丢弃当前帧");
      self.stats.add_dropped_busy(1);
      return Err(FrameError::Busy);
    }
    let _busy = BusyGuard(&self.busy);

    let slot = match self.model.try_read() {
      Ok(slot) => slot,
      Err(TryLockError::Poisoned(e)) => e.into_inner(),
      Err(TryLockError::WouldBlock) => {
        self.stats.add_not_ready(1);
        return Err(FrameError::NotReady);
      }
    };
    let Some(model) = slot.as_ref() else {
      self.stats.add_not_ready(1);
      return Err(FrameError::NotReady);
    };

    self.stats.add_accepted(1);
    let result = detect_frame(model, &self.thresholds, frame, &self.stats);
    drop(slot);

    if !self.is_active() {
      debug!("检测已停止，丢弃在途帧结果");
      self.stats.add_discarded(1);
      return Err(FrameError::Stopped);
    }

    match result {
      Ok(recognitions) => {
        self.stats.add_published(recognitions.len() as u64);
        Ok(recognitions)
      }
      Err(e) if e.is_not_ready() => {
        debug!("帧尚不可处理: {}", e);
        self.stats.add_not_ready(1);
        Err(e)
      }
      Err(e) => {
        debug!("帧处理失败: {}", e);
        self.stats.add_failed(1);
        Err(e)
      }
    }
  }
}

impl Drop for FrameScheduler {
  fn drop(&mut self) {
    self.shutdown();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::I420Buffer;

  #[test]
  fn frames_before_load_are_not_ready() {
    let scheduler = FrameScheduler::new(Thresholds::default()).unwrap();
    let buffer = I420Buffer::uniform(4, 4, 100, 128, 128);
    let err = scheduler.submit_frame(&buffer.as_raw_frame()).unwrap_err();
    assert!(err.is_not_ready());
    assert!(!scheduler.is_ready());
    assert_eq!(scheduler.stats().frames_not_ready, 1);
  }

  #[test]
  fn shutdown_without_load_is_safe() {
    let scheduler = FrameScheduler::new(Thresholds::default()).unwrap();
    scheduler.shutdown();
    scheduler.shutdown();
    assert!(!scheduler.is_ready());
  }

  #[test]
  fn stopped_scheduler_rejects_frames() {
    let scheduler = FrameScheduler::new(Thresholds::default()).unwrap();
    scheduler.stop();
    let buffer = I420Buffer::uniform(4, 4, 100, 128, 128);
    assert!(matches!(
      scheduler.submit_frame(&buffer.as_raw_frame()),
      Err(FrameError::Stopped)
    ));
    scheduler.start();
    assert!(matches!(
      scheduler.submit_frame(&buffer.as_raw_frame()),
      Err(FrameError::NotReady)
    ));
  }

  #[test]
  fn invalid_thresholds_are_rejected() {
    let thresholds = Thresholds {
      objectness: -0.1,
      ..Default::default()
    };
    assert!(FrameScheduler::new(thresholds).is_err());
  }
}
