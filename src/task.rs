// 该文件是 Kanjian （看见） 项目的一部分。
// src/task.rs - 运行任务
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

use std::{thread, time::Duration, time::Instant};
use tracing::{debug, info, warn};

use crate::{
  frame::I420Buffer, output::Publish, pipeline::FrameError, scheduler::FrameScheduler,
};

pub trait Task<I, O>: Sized {
  type Error;
  fn run_task(self, input: I, scheduler: &FrameScheduler, output: O) -> Result<(), Self::Error>;
}

/// 处理第一帧后退出
pub struct OneShotTask;

impl<RE, I, O> Task<I, O> for OneShotTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = I420Buffer>,
  O: Publish<Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    scheduler: &FrameScheduler,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功 ({}x{})，开始检测...", frame.width(), frame.height());
    let now = Instant::now();
    let recognitions = scheduler.submit_frame(&frame.as_raw_frame())?;
    info!("检测完成，{} 个目标，耗时: {:.2?}", recognitions.len(), now.elapsed());
    output.publish(0, &recognitions)?;

    Ok(())
  }
}

/// 对同一帧重复检测，用于测量平均耗时
pub struct RepeatShotTask {
  times: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn with_times(mut self, times: usize) -> Self {
    self.times = times.max(1);
    self
  }
}

impl<RE, I, O> Task<I, O> for RepeatShotTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = I420Buffer>,
  O: Publish<Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    scheduler: &FrameScheduler,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始检测...");
    let raw = frame.as_raw_frame();
    let mut times = Vec::with_capacity(self.times);
    for i in 0..self.times {
      let now = Instant::now();
      let recognitions = scheduler.submit_frame(&raw)?;
      let elapsed = now.elapsed();
      info!("({})检测完成，{} 个目标，耗时: {:.2?}", i, recognitions.len(), elapsed);
      output.publish(i as u64, &recognitions)?;
      times.push(elapsed);
    }

    // 前两次视为预热
    let warm: Vec<Duration> = if times.len() > 2 {
      times[2..].to_vec()
    } else {
      times
    };
    warn!(
      "平均检测时间: {:.2?}",
      warm.iter().sum::<Duration>() / warm.len() as u32
    );

    Ok(())
  }
}

/// 连续处理输入帧，直到输入结束、达到指定帧数或收到中断信号
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<RE, I, O> Task<I, O> for ContinuousTask
where
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = I420Buffer>,
  O: Publish<Error = RE>,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, scheduler: &FrameScheduler, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let mut frame_index: u64 = 0;
    for frame in input {
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，停止检测");
        scheduler.stop();
        break;
      }

      let now = Instant::now();
      match scheduler.submit_frame(&frame.as_raw_frame()) {
        Ok(recognitions) => {
          info!(
            "第 {} 帧: {} 个目标，耗时: {:.2?}",
            frame_index,
            recognitions.len(),
            now.elapsed()
          );
          output.publish(frame_index, &recognitions)?;
        }
        Err(FrameError::Stopped) => {
          info!("检测已停止，退出任务循环");
          break;
        }
        Err(e) if e.is_not_ready() || matches!(e, FrameError::Busy) => {
          debug!("第 {} 帧被跳过: {}", frame_index, e);
        }
        Err(e) => {
          warn!("第 {} 帧处理失败: {}", frame_index, e);
        }
      }

      frame_index += 1;
      if self
        .frame_number
        .is_some_and(|n| frame_index >= n as u64)
      {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
    }

    info!("任务完成，统计: {:?}", scheduler.stats());
    Ok(())
  }
}
