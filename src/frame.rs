// 该文件是 Kanjian （看见） 项目的一部分。
// src/frame.rs - 相机帧定义
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

/// 稠密 RGB 图像，转换步骤产出，预处理步骤消费
pub type RgbRaster = image::RgbImage;

/// 帧像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
  /// 4:2:0 色度下采样平面格式（Y、U、V 三个平面，步长独立）
  Yuv420,
  /// 4:2:2 平面格式
  Yuv422,
  /// 4:4:4 平面格式
  Yuv444,
  /// 打包 RGBA
  Rgba8888,
}

/// 单个图像平面
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
  pub data: &'a [u8],
  /// 行步长（字节）
  pub row_stride: usize,
  /// 相邻样本之间的步长（字节）
  pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
  pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
    Self {
      data,
      row_stride,
      pixel_stride,
    }
  }

  /// 读取 (x, y) 处的样本，越界时返回 None
  #[inline]
  pub fn sample(&self, x: usize, y: usize) -> Option<u8> {
    let index = y
      .checked_mul(self.row_stride)?
      .checked_add(x.checked_mul(self.pixel_stride)?)?;
    self.data.get(index).copied()
  }
}

/// 相机回调期间借用的原始帧
///
/// 帧数据由帧源独占持有，管线只在一次回调内读取。
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
  pub format: PixelFormat,
  pub width: u32,
  pub height: u32,
  pub y: Plane<'a>,
  pub u: Plane<'a>,
  pub v: Plane<'a>,
}

/// 连续存储的 I420 帧
///
/// 文件输入源产出该类型，通过 [`I420Buffer::as_raw_frame`] 借出 [`RawFrame`]。
#[derive(Debug, Clone)]
pub struct I420Buffer {
  width: u32,
  height: u32,
  data: Box<[u8]>,
}

impl I420Buffer {
  /// 给定尺寸下一帧 I420 数据的字节数
  pub fn frame_len(width: u32, height: u32) -> usize {
    let luma = width as usize * height as usize;
    let chroma = Self::chroma_width(width) * Self::chroma_height(height);
    luma + 2 * chroma
  }

  fn chroma_width(width: u32) -> usize {
    (width as usize).div_ceil(2)
  }

  fn chroma_height(height: u32) -> usize {
    (height as usize).div_ceil(2)
  }

  /// 从连续的 Y、U、V 平面数据构建；长度不符时返回 None
  pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
    if data.len() != Self::frame_len(width, height) {
      return None;
    }
    Some(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 生成 Y/U/V 恒定取值的帧，常用于测试
  pub fn uniform(width: u32, height: u32, y: u8, u: u8, v: u8) -> Self {
    let luma = width as usize * height as usize;
    let chroma = Self::chroma_width(width) * Self::chroma_height(height);
    let mut data = Vec::with_capacity(Self::frame_len(width, height));
    data.resize(luma, y);
    data.resize(luma + chroma, u);
    data.resize(luma + 2 * chroma, v);
    Self {
      width,
      height,
      data: data.into_boxed_slice(),
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  /// 可变的 (Y, U, V) 三个平面
  pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
    let luma = self.width as usize * self.height as usize;
    let chroma = Self::chroma_width(self.width) * Self::chroma_height(self.height);
    let (y, rest) = self.data.split_at_mut(luma);
    let (u, v) = rest.split_at_mut(chroma);
    (y, u, v)
  }

  pub fn as_raw_frame(&self) -> RawFrame<'_> {
    let luma = self.width as usize * self.height as usize;
    let chroma_w = Self::chroma_width(self.width);
    let chroma = chroma_w * Self::chroma_height(self.height);
    let (y, rest) = self.data.split_at(luma);
    let (u, v) = rest.split_at(chroma);

    RawFrame {
      format: PixelFormat::Yuv420,
      width: self.width,
      height: self.height,
      y: Plane::new(y, self.width as usize, 1),
      u: Plane::new(u, chroma_w, 1),
      v: Plane::new(v, chroma_w, 1),
    }
  }
}
