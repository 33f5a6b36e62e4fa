// 该文件是 Kanjian （看见） 项目的一部分。
// src/pipeline.rs - 单帧检测流程
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

use crate::config::Thresholds;
use crate::convert::{ConvertError, yuv420_to_rgb};
use crate::decode::{DecodeError, DetectionDecoder};
use crate::frame::RawFrame;
use crate::mapping::{CoordinateMapper, Recognition};
use crate::model::{EngineError, LoadedModel};
use crate::nms::NonMaxSuppressor;
use crate::preprocess::{PreprocessError, preprocess};
use crate::stats::PipelineStats;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("上一帧仍在处理中，丢弃当前帧")]
  Busy,
  #[error("模型尚未加载")]
  NotReady,
  #[error("检测已停止")]
  Stopped,
  #[error("帧格式错误: {0}")]
  Format(#[from] ConvertError),
  #[error("预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("推理错误: {0}")]
  Inference(#[from] EngineError),
  #[error("解码错误: {0}")]
  Decode(#[from] DecodeError),
}

impl FrameError {
  /// 是否属于“尚未就绪”信号（模型未加载或帧格式不受支持），而非处理失败
  pub fn is_not_ready(&self) -> bool {
    matches!(self, FrameError::NotReady | FrameError::Format(_))
  }
}

/// 对一帧执行完整的检测流程
///
/// 格式转换 -> 预处理 -> 推理 -> 解码 -> NMS -> 坐标映射。
/// 空列表是合法结果，表示没有检测到目标。
pub fn detect_frame(
  model: &LoadedModel,
  thresholds: &Thresholds,
  frame: &RawFrame<'_>,
  stats: &PipelineStats,
) -> Result<Vec<Recognition>, FrameError> {
  let (raster, convert_report) = yuv420_to_rgb(frame)?;
  stats.add_chroma_fallback(convert_report.fallback_pixels);

  let input_spec = model.input_spec();
  let tensor = preprocess(&raster, input_spec)?;
  drop(raster);

  let output = model.infer(&tensor)?;

  let decoder = DetectionDecoder::new(thresholds.objectness, thresholds.class_confidence);
  let candidates = decoder.decode(&output, model.output_shape())?;

  let (model_w, model_h) = (input_spec.width, input_spec.height);
  let kept =
    NonMaxSuppressor::new(thresholds.iou).suppress(candidates, model_w as f32, model_h as f32);

  let mapper = CoordinateMapper::new(model_w, model_h, frame.width, frame.height);
  let (recognitions, map_report) = mapper.map(&kept, model.labels());
  stats.add_out_of_range_class(map_report.out_of_range_class);
  stats.add_degenerate(map_report.degenerate);

  debug!("帧 {}x{} 检测到 {} 个目标", frame.width, frame.height, recognitions.len());
  Ok(recognitions)
}
