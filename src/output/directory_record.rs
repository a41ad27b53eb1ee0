// 该文件是 Shanan-IMX500 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameSize, TensorFrame},
  model::{DetectItem, DetectResult},
  output::Render,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

#[derive(Serialize)]
struct FrameRecord<'a> {
  timestamp: String,
  frame_id: u16,
  width: u32,
  height: u32,
  items: &'a [DetectItem],
}

/// `folder:///path/to/dir[?always][&raw]`
///
/// 每帧写入 `YYYY/MM/DD/HH-MM-SS-XXXX.json`；带 `raw` 时同时保存原始元数据。
/// 默认只记录有检测结果的帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: AtomicU16,
  always: bool,
  raw: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    Ok(DirectoryRecordOutput::new(
      uri.path(),
      uri.query_pairs().any(|(k, _)| k == "always"),
      uri.query_pairs().any(|(k, _)| k == "raw"),
    ))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl AsRef<Path>, always: bool, raw: bool) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      frame_counter: AtomicU16::new(0),
      always,
      raw,
    }
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: &DateTime<Utc>, frame_id: u16) -> Result<PathBuf, std::io::Error> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!("{}-{:04X}.json", now.format("%H-%M-%S"), frame_id)))
  }
}

impl Render<TensorFrame, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &TensorFrame, result: &DetectResult) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let now = Utc::now();
    let frame_id = self.frame_id();
    let path = self.frame_path(&now, frame_id)?;
    let FrameSize { width, height } = frame.size();
    let record = FrameRecord {
      timestamp: now.to_rfc3339(),
      frame_id,
      width,
      height,
      items: &result.items,
    };
    std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;
    if self.raw {
      std::fs::write(path.with_extension("bin"), frame.data())?;
    }
    debug!("记录已写入 {}", path.display());

    Ok(())
  }
}
