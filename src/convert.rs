// 该文件是 Kanjian （看见） 项目的一部分。
// src/convert.rs - YUV 4:2:0 到 RGB 的像素格式转换
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

use crate::frame::{PixelFormat, RawFrame, RgbRaster};

/// 样本越界时替代的中灰色
const FALLBACK_PIXEL: [u8; 3] = [128, 128, 128];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
  #[error("不支持的帧格式: {0:?}，仅支持 YUV 4:2:0 平面格式")]
  NotConvertible(PixelFormat),
}

/// 单帧转换的统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertReport {
  /// 因样本越界而以中灰色代替的像素数
  pub fallback_pixels: u64,
}

#[inline]
fn to_channel(value: f32) -> u8 {
  value.round().clamp(0.0, 255.0) as u8
}

/// 按 BT.601 全范围系数把一个 YUV 样本转换为 RGB
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
  let y = y as f32;
  let u = u as f32 - 128.0;
  let v = v as f32 - 128.0;

  let r = y + 1.402 * v;
  let g = y - 0.344136 * u - 0.714136 * v;
  let b = y + 1.772 * u;
  [to_channel(r), to_channel(g), to_channel(b)]
}

/// 将 4:2:0 平面帧转换为同尺寸的 RGB 图像
///
/// 色度在 `(x/2, y/2)` 处按各平面自身的行步长和样本步长采样，
/// 因此也能处理半平面（交织色度）布局。读取越界的像素以中灰色代替，
/// 而不是让整帧失败；替代次数记录在 [`ConvertReport`] 中。
pub fn yuv420_to_rgb(frame: &RawFrame<'_>) -> Result<(RgbRaster, ConvertReport), ConvertError> {
  if frame.format != PixelFormat::Yuv420 {
    return Err(ConvertError::NotConvertible(frame.format));
  }

  let mut report = ConvertReport::default();
  let mut raster = RgbRaster::new(frame.width, frame.height);

  for (x, y, pixel) in raster.enumerate_pixels_mut() {
    let (x, y) = (x as usize, y as usize);
    let samples = (
      frame.y.sample(x, y),
      frame.u.sample(x / 2, y / 2),
      frame.v.sample(x / 2, y / 2),
    );

    pixel.0 = match samples {
      (Some(luma), Some(u), Some(v)) => yuv_to_rgb(luma, u, v),
      _ => {
        report.fallback_pixels += 1;
        FALLBACK_PIXEL
      }
    };
  }

  if report.fallback_pixels > 0 {
    debug!(
      "帧 {}x{} 中有 {} 个像素读取越界，已替换为中灰色",
      frame.width, frame.height, report.fallback_pixels
    );
  }

  Ok((raster, report))
}
