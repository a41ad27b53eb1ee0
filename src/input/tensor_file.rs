// 该文件是 Shanan-IMX500 项目的一部分。
// src/input/tensor_file.rs - 从文件读取推理元数据帧
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

use std::{
  collections::VecDeque,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{DEFAULT_STRIDE, FrameSize, TensorFrame},
};

#[derive(Error, Debug)]
pub enum TensorFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("参数 {0} 无效: {1}")]
  InvalidParameter(String, String),
}

enum Source {
  /// 单个文件，按 `frame_size` 切分为多帧
  Chunks { data: Vec<u8>, offset: usize },
  /// 目录，每个文件一帧
  Files(VecDeque<PathBuf>),
}

/// `tensor:///path/to/frames.bin?stride=4064&width=640&height=480&frame_size=8128`
///
/// 路径为目录时按文件名顺序逐个读取。
pub struct TensorFileInput {
  source: Source,
  stride: usize,
  size: FrameSize,
  frame_size: Option<usize>,
}

impl FromUrlWithScheme for TensorFileInput {
  const SCHEME: &'static str = "tensor";
}

fn query_value<T: std::str::FromStr>(
  url: &Url,
  key: &str,
) -> Result<Option<T>, TensorFileInputError> {
  match url.query_pairs().find(|(k, _)| k == key) {
    Some((_, v)) => v
      .parse()
      .map(Some)
      .map_err(|_| TensorFileInputError::InvalidParameter(key.to_string(), v.to_string())),
    None => Ok(None),
  }
}

impl FromUrl for TensorFileInput {
  type Error = TensorFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorFileInputError::SchemeMismatch);
    }

    let stride = query_value(url, "stride")?.unwrap_or(DEFAULT_STRIDE);
    if stride == 0 {
      return Err(TensorFileInputError::InvalidParameter(
        "stride".to_string(),
        "0".to_string(),
      ));
    }
    let size = FrameSize::new(
      query_value(url, "width")?.unwrap_or(0),
      query_value(url, "height")?.unwrap_or(0),
    );
    let frame_size: Option<usize> = query_value(url, "frame_size")?;
    if frame_size == Some(0) {
      return Err(TensorFileInputError::InvalidParameter(
        "frame_size".to_string(),
        "0".to_string(),
      ));
    }

    Self::open(url.path(), stride, size, frame_size)
  }
}

impl TensorFileInput {
  pub fn open(
    path: impl AsRef<Path>,
    stride: usize,
    size: FrameSize,
    frame_size: Option<usize>,
  ) -> Result<Self, TensorFileInputError> {
    let path = path.as_ref();
    let source = if path.is_dir() {
      let mut files = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect::<Vec<_>>();
      files.sort();
      info!("从目录 {} 读取 {} 帧", path.display(), files.len());
      Source::Files(files.into())
    } else {
      let data = std::fs::read(path)?;
      info!("读取元数据文件 {}, {} 字节", path.display(), data.len());
      Source::Chunks { data, offset: 0 }
    };

    Ok(Self {
      source,
      stride,
      size,
      frame_size,
    })
  }

  fn frame(&self, data: Vec<u8>) -> TensorFrame {
    TensorFrame::new(data, self.stride, self.size)
  }
}

impl Iterator for TensorFileInput {
  type Item = TensorFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let data = match &mut self.source {
      Source::Chunks { data, offset } => {
        let remaining = data.len().saturating_sub(*offset);
        if remaining == 0 {
          return None;
        }
        let len = self.frame_size.unwrap_or(remaining);
        if remaining < len {
          warn!("文件末尾剩余 {} 字节不足一帧，已忽略", remaining);
          *offset = data.len();
          return None;
        }
        let chunk = data[*offset..*offset + len].to_vec();
        *offset += len;
        chunk
      }
      Source::Files(files) => loop {
        let path = files.pop_front()?;
        match std::fs::read(&path) {
          Ok(data) => {
            debug!("读取帧文件 {}", path.display());
            break data;
          }
          Err(e) => warn!("读取 {} 失败, 已跳过: {}", path.display(), e),
        }
      },
    };

    Some(self.frame(data))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_file_is_split_by_frame_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frames.bin");
    std::fs::write(&path, vec![1u8; 70]).unwrap();

    let url = Url::parse(&format!(
      "tensor://{}?stride=16&width=320&height=240&frame_size=32",
      path.display()
    ))
    .unwrap();
    let frames = TensorFileInput::from_url(&url).unwrap().collect::<Vec<_>>();
    // 末尾 6 字节不足一帧
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].data().len(), 32);
    assert_eq!(frames[0].stride(), 16);
    assert_eq!(frames[0].size(), FrameSize::new(320, 240));
  }

  #[test]
  fn whole_file_is_one_frame_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.bin");
    std::fs::write(&path, vec![0u8; 100]).unwrap();

    let mut input = TensorFileInput::open(&path, 50, FrameSize::default(), None).unwrap();
    assert_eq!(input.next().map(|f| f.data().len()), Some(100));
    assert!(input.next().is_none());
  }

  #[test]
  fn directory_yields_files_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.bin"), [2u8; 4]).unwrap();
    std::fs::write(dir.path().join("a.bin"), [1u8; 4]).unwrap();

    let frames = TensorFileInput::open(dir.path(), 4, FrameSize::default(), None)
      .unwrap()
      .map(|f| f.data()[0])
      .collect::<Vec<_>>();
    assert_eq!(frames, vec![1, 2]);
  }

  #[test]
  fn zero_stride_is_rejected() {
    let url = Url::parse("tensor:///tmp/frames.bin?stride=0").unwrap();
    assert!(matches!(
      TensorFileInput::from_url(&url),
      Err(TensorFileInputError::InvalidParameter(_, _))
    ));
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("image:///tmp/a.png").unwrap();
    assert!(matches!(
      TensorFileInput::from_url(&url),
      Err(TensorFileInputError::SchemeMismatch)
    ));
  }
}
