// 该文件是 Kanjian （看见） 项目的一部分。
// src/input/image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::I420Buffer};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

const READ_IMAGE_FILE_SCHEME: &str = "image";

/// 单张图像输入，解码后编码为 I420 帧，模拟相机输出
pub struct ImageFileInput {
  frame: Option<I420Buffer>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = READ_IMAGE_FILE_SCHEME;
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != READ_IMAGE_FILE_SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        READ_IMAGE_FILE_SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?.to_rgb8();
    info!("读取图像 {} ({}x{})", path, image.width(), image.height());

    Ok(ImageFileInput {
      frame: Some(rgb_to_i420(&image)),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = I420Buffer;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take()
  }
}

#[inline]
fn to_byte(value: f32) -> u8 {
  value.round().clamp(0.0, 255.0) as u8
}

/// 将 RGB 图像编码为 I420（BT.601 全范围），色度取每个 2x2 块的平均值
pub fn rgb_to_i420(image: &RgbImage) -> I420Buffer {
  let (width, height) = image.dimensions();
  let (w, h) = (width as usize, height as usize);
  let cw = w.div_ceil(2);

  let mut buffer = I420Buffer::uniform(width, height, 0, 128, 128);
  let (y_plane, u_plane, v_plane) = buffer.planes_mut();

  for (luma, pixel) in y_plane.iter_mut().zip(image.pixels()) {
    let [r, g, b] = pixel.0.map(f32::from);
    *luma = to_byte(0.299 * r + 0.587 * g + 0.114 * b);
  }

  for (i, (u, v)) in u_plane.iter_mut().zip(v_plane.iter_mut()).enumerate() {
    let (cx, cy) = (i % cw, i / cw);
    let (mut r, mut g, mut b, mut n) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for y in (cy * 2)..(cy * 2 + 2).min(h) {
      for x in (cx * 2)..(cx * 2 + 2).min(w) {
        let [pr, pg, pb] = image.get_pixel(x as u32, y as u32).0.map(f32::from);
        r += pr;
        g += pg;
        b += pb;
        n += 1.0;
      }
    }
    let (r, g, b) = (r / n, g / n, b / n);
    *u = to_byte(-0.168736 * r - 0.331264 * g + 0.5 * b + 128.0);
    *v = to_byte(0.5 * r - 0.418688 * g - 0.081312 * b + 128.0);
  }

  buffer
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::convert::yuv420_to_rgb;
  use image::Rgb;

  #[test]
  fn gray_image_round_trips() {
    let image = RgbImage::from_pixel(5, 3, Rgb([90, 90, 90]));
    let buffer = rgb_to_i420(&image);
    assert_eq!(buffer.as_bytes().len(), I420Buffer::frame_len(5, 3));
    let (raster, _) = yuv420_to_rgb(&buffer.as_raw_frame()).unwrap();
    assert!(raster.pixels().all(|p| p.0 == [90, 90, 90]));
  }

  #[test]
  fn color_survives_within_tolerance() {
    let image = RgbImage::from_pixel(4, 4, Rgb([200, 40, 120]));
    let (raster, _) = yuv420_to_rgb(&rgb_to_i420(&image).as_raw_frame()).unwrap();
    for (a, b) in raster.get_pixel(1, 1).0.iter().zip([200u8, 40, 120]) {
      assert!((*a as i32 - b as i32).abs() <= 2);
    }
  }

  #[test]
  fn reads_png_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    RgbImage::from_pixel(6, 4, Rgb([10, 200, 30])).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let frames: Vec<_> = ImageFileInput::from_url(&url).unwrap().collect();
    assert_eq!(frames.len(), 1);
    assert_eq!((frames[0].width(), frames[0].height()), (6, 4));
  }
}
