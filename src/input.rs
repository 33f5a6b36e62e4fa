// 该文件是 Kanjian （看见） 项目的一部分。
// src/input.rs - 帧输入
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

use crate::{FromUrl, FromUrlWithScheme, frame::I420Buffer};

mod yuv_file;
pub use self::yuv_file::{YuvFileInput, YuvFileInputError};

#[cfg(feature = "read_image_file")]
mod image_file;
#[cfg(feature = "read_image_file")]
pub use self::image_file::{ImageFileInput, ImageFileInputError, rgb_to_i420};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("YUV file input error: {0}")]
  YuvFileInputError(#[from] YuvFileInputError),
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  YuvFile(YuvFileInput),
  #[cfg(feature = "read_image_file")]
  ImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() == YuvFileInput::SCHEME {
      let input = YuvFileInput::from_url(url)?;
      return Ok(InputWrapper::YuvFile(input));
    }
    #[cfg(feature = "read_image_file")]
    {
      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ImageFile(input));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl Iterator for InputWrapper {
  type Item = I420Buffer;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::YuvFile(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFile(input) => input.next(),
    }
  }
}
