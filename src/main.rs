// 该文件是 Kanjian （看见） 项目的一部分。
// src/main.rs - 命令行入口
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

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::info;
use url::Url;

use kanjian::{
  FromUrl,
  config::{
    DEFAULT_CLASS_CONFIDENCE_THRESHOLD, DEFAULT_IOU_THRESHOLD, DEFAULT_OBJECTNESS_THRESHOLD,
    ModelConfig, Thresholds,
  },
  input::InputWrapper,
  output::OutputWrapper,
  scheduler::FrameScheduler,
  task::{ContinuousTask, OneShotTask, RepeatShotTask, Task},
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  /// 只处理第一帧
  Oneshot,
  /// 对第一帧重复检测并统计耗时
  Repeat,
  /// 连续处理所有帧
  Continuous,
}

/// Kanjian 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 `replay:///data/out.f32?width=640&height=640` 或 `tract:///data/yolo.onnx`
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 标签文件路径，未给出时读取模型地址中的 `labels` 参数
  #[arg(long, value_name = "LABELS")]
  pub labels: Option<PathBuf>,
  /// 输入来源，`yuv:///path?width=W&height=H` 或 `image:///path`
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，`jsonl:`、`jsonl:///path` 或 `folder:///dir`
  #[arg(long, value_name = "OUTPUT", default_value = "jsonl:")]
  pub output: Url,

  #[arg(long, default_value_t = DEFAULT_OBJECTNESS_THRESHOLD, value_name = "THRESHOLD")]
  pub objectness: f32,
  #[arg(long, default_value_t = DEFAULT_CLASS_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub class_confidence: f32,
  #[arg(long, default_value_t = DEFAULT_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou: f32,

  /// 推理线程数
  #[arg(long, value_name = "THREADS")]
  pub threads: Option<usize>,
  /// 请求硬件加速
  #[arg(long)]
  pub accel: bool,

  #[arg(long, value_enum, default_value_t = Mode::Continuous)]
  pub mode: Mode,
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn model_config(args: &Args) -> Result<ModelConfig> {
  let mut config = ModelConfig::from_url_with_labels(&args.model, args.labels.clone())?;
  if let Some(threads) = args.threads {
    config = config.with_threads(threads);
  }
  if args.accel {
    config = config.with_acceleration(true);
  }
  Ok(config)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let thresholds = Thresholds {
    objectness: args.objectness,
    class_confidence: args.class_confidence,
    iou: args.iou,
  };
  let scheduler = FrameScheduler::new(thresholds)?;
  scheduler.load(&model_config(&args)?)?;

  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  match args.mode {
    Mode::Oneshot => OneShotTask.run_task(input, &scheduler, output)?,
    Mode::Repeat => {
      let mut task = RepeatShotTask::default();
      if let Some(times) = args.frame_number {
        task = task.with_times(times);
      }
      task.run_task(input, &scheduler, output)?
    }
    Mode::Continuous => ContinuousTask::default()
      .with_frame_number(args.frame_number)
      .run_task(input, &scheduler, output)?,
  }

  scheduler.shutdown();
  Ok(())
}
