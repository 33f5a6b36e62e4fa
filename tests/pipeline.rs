// 该文件是 Kanjian （看见） 项目的一部分。
// tests/pipeline.rs - 检测管线集成测试
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

mod common;

use common::*;
use kanjian::{
  FromUrl,
  config::{ModelConfig, Thresholds},
  frame::{I420Buffer, PixelFormat},
  model::{LoadedModel, ModelLoadError, ReplayEngine, TensorElementType},
  pipeline::{FrameError, detect_frame},
  scheduler::FrameScheduler,
  stats::PipelineStats,
};

#[test]
fn single_detection_is_mapped_to_frame() {
  let model = replay_model(single_dog_tensor());
  let stats = PipelineStats::default();
  let buffer = I420Buffer::uniform(16, 16, 120, 128, 128);

  let recognitions =
    detect_frame(&model, &Thresholds::default(), &buffer.as_raw_frame(), &stats).unwrap();

  assert_eq!(recognitions.len(), 1);
  let dog = &recognitions[0];
  assert_eq!(dog.class_id, 1);
  assert_eq!(dog.label, "dog");
  assert!((dog.score - 0.95 * 0.97).abs() < 1e-6);
  assert_eq!(
    (dog.rect.left, dog.rect.top, dog.rect.right, dog.rect.bottom),
    (4.0, 4.0, 12.0, 12.0)
  );
  assert_eq!(stats.snapshot().chroma_fallback_pixels, 0);
}

#[test]
fn same_frame_gives_same_result() {
  let model = replay_model(single_dog_tensor());
  let stats = PipelineStats::default();
  let buffer = I420Buffer::uniform(10, 6, 80, 90, 200);
  let frame = buffer.as_raw_frame();

  let first = detect_frame(&model, &Thresholds::default(), &frame, &stats).unwrap();
  let second = detect_frame(&model, &Thresholds::default(), &frame, &stats).unwrap();
  assert_eq!(first, second);
}

#[test]
fn overlapping_boxes_of_one_class_collapse() {
  let mut output = prediction([0.5, 0.5, 0.5, 0.5], 0.95, [0.0, 0.97, 0.0]);
  output.extend(prediction([0.52, 0.5, 0.5, 0.5], 0.95, [0.0, 0.96, 0.0]));
  output.extend(prediction([0.52, 0.5, 0.5, 0.5], 0.95, [0.0, 0.0, 0.96]));
  output.extend(prediction([0.5, 0.5, 0.2, 0.2], 0.0, [0.0; 3]));
  let model = replay_model(output);

  let buffer = I420Buffer::uniform(16, 16, 120, 128, 128);
  let recognitions = detect_frame(
    &model,
    &Thresholds::default(),
    &buffer.as_raw_frame(),
    &PipelineStats::default(),
  )
  .unwrap();

  assert_eq!(recognitions.len(), 2);
  let dogs: Vec<_> = recognitions.iter().filter(|r| r.label == "dog").collect();
  assert_eq!(dogs.len(), 1);
  assert!((dogs[0].score - 0.95 * 0.97).abs() < 1e-6);
  assert!(recognitions.iter().any(|r| r.label == "bird"));
}

#[test]
fn background_only_frame_is_empty() {
  let output = (0..NUM_PREDICTIONS)
    .flat_map(|_| prediction([0.5, 0.5, 0.5, 0.5], 0.1, [0.9, 0.9, 0.9]))
    .collect();
  let model = replay_model(output);
  let buffer = I420Buffer::uniform(16, 16, 120, 128, 128);
  let recognitions = detect_frame(
    &model,
    &Thresholds::default(),
    &buffer.as_raw_frame(),
    &PipelineStats::default(),
  )
  .unwrap();
  assert!(recognitions.is_empty());
}

#[test]
fn non_420_frame_is_a_format_error() {
  let model = replay_model(single_dog_tensor());
  let buffer = I420Buffer::uniform(16, 16, 120, 128, 128);
  let mut frame = buffer.as_raw_frame();
  frame.format = PixelFormat::Yuv422;

  let err = detect_frame(&model, &Thresholds::default(), &frame, &PipelineStats::default())
    .unwrap_err();
  assert!(matches!(err, FrameError::Format(_)));
  assert!(err.is_not_ready());
}

#[test]
fn non_420_frame_counts_as_not_ready() {
  let scheduler = FrameScheduler::new(Thresholds::default()).unwrap();
  assert!(scheduler.install(replay_model(single_dog_tensor())));

  let buffer = I420Buffer::uniform(16, 16, 120, 128, 128);
  let mut frame = buffer.as_raw_frame();
  frame.format = PixelFormat::Yuv444;

  let err = scheduler.submit_frame(&frame).unwrap_err();
  assert!(err.is_not_ready());
  let stats = scheduler.stats();
  assert_eq!(stats.frames_not_ready, 1);
  assert_eq!(stats.frames_failed, 0);

  // 之后的 4:2:0 帧照常处理
  assert_eq!(scheduler.submit_frame(&buffer.as_raw_frame()).unwrap().len(), 1);
}

#[test]
fn unsupported_input_type_fails_the_frame_only() {
  let engine = ReplayEngine::new(
    input_spec(TensorElementType::Float16),
    output_shape(),
    single_dog_tensor(),
  )
  .unwrap();
  let model = LoadedModel::new(Box::new(engine), labels()).unwrap();

  let scheduler = FrameScheduler::new(Thresholds::default()).unwrap();
  assert!(scheduler.install(model));

  let buffer = I420Buffer::uniform(16, 16, 120, 128, 128);
  for _ in 0..2 {
    let err = scheduler.submit_frame(&buffer.as_raw_frame()).unwrap_err();
    assert!(matches!(err, FrameError::Preprocess(_)));
  }
  assert!(scheduler.is_ready());
  assert_eq!(scheduler.stats().frames_failed, 2);
}

#[test]
fn loads_replay_model_from_url() {
  let dir = tempfile::tempdir().unwrap();
  let url = write_replay_assets(dir.path(), &single_dog_tensor(), "cat\ndog\nbird\n");

  let scheduler = FrameScheduler::new(Thresholds::default()).unwrap();
  scheduler.load(&ModelConfig::from_url(&url).unwrap()).unwrap();
  assert!(scheduler.is_ready());

  let buffer = I420Buffer::uniform(32, 24, 120, 128, 128);
  let recognitions = scheduler.submit_frame(&buffer.as_raw_frame()).unwrap();
  assert_eq!(recognitions.len(), 1);
  assert_eq!(recognitions[0].label, "dog");
  assert_eq!(scheduler.stats().recognitions_published, 1);
}

#[test]
fn label_count_mismatch_fails_load() {
  let dir = tempfile::tempdir().unwrap();
  let url = write_replay_assets(dir.path(), &single_dog_tensor(), "cat\ndog\n");

  let scheduler = FrameScheduler::new(Thresholds::default()).unwrap();
  let err = scheduler
    .load(&ModelConfig::from_url(&url).unwrap())
    .unwrap_err();
  assert!(matches!(
    err,
    ModelLoadError::ClassCountMismatch {
      model: 3,
      labels: 2
    }
  ));
  assert!(!scheduler.is_ready());
}

#[test]
fn missing_model_file_fails_load() {
  let dir = tempfile::tempdir().unwrap();
  let labels = dir.path().join("labels.txt");
  std::fs::write(&labels, "cat\ndog\nbird\n").unwrap();
  let url = url::Url::parse(&format!("replay://{}/missing.f32", dir.path().display())).unwrap();

  let err = LoadedModel::load(&ModelConfig::new(url, labels)).unwrap_err();
  assert!(matches!(err, ModelLoadError::MissingAsset { .. }));
}

#[test]
fn unknown_backend_scheme_fails_load() {
  let url = url::Url::parse("nnapi:///model.bin").unwrap();
  let dir = tempfile::tempdir().unwrap();
  let labels = dir.path().join("labels.txt");
  std::fs::write(&labels, "cat\n").unwrap();
  assert!(matches!(
    LoadedModel::load(&ModelConfig::new(url, labels)),
    Err(ModelLoadError::UnsupportedScheme(_))
  ));
}
