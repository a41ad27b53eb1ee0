// 该文件是 Shanan-IMX500 项目的一部分。
// src/config.rs - 后处理配置与类别标签
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

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::ssd::SsdParams;

const DEFAULT_THRESHOLD: f32 = 0.3;
const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("阈值必须在 [0, 1] 范围内: {0}")]
  InvalidThreshold(f32),
}

fn default_threshold() -> f32 {
  DEFAULT_THRESHOLD
}

/// MobileNet-SSD 后处理配置
///
/// ```json
/// { "max_detections": 5, "threshold": 0.6, "class_file": "coco_labels.txt" }
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MobileNetConfig {
  pub max_detections: u32,
  #[serde(default = "default_threshold")]
  pub threshold: f32,
  #[serde(default)]
  pub class_file: Option<PathBuf>,
}

impl MobileNetConfig {
  pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
    let config: MobileNetConfig = serde_json::from_str(text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载配置文件: {}", path.display());
    let mut config = Self::from_json_str(&std::fs::read_to_string(path)?)?;

    // 相对路径的标签文件以配置文件所在目录为基准
    if let (Some(class_file), Some(dir)) = (&config.class_file, path.parent()) {
      if class_file.is_relative() {
        config.class_file = Some(dir.join(class_file));
      }
    }
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.threshold) {
      return Err(ConfigError::InvalidThreshold(self.threshold));
    }
    Ok(())
  }

  pub fn params(&self) -> SsdParams {
    SsdParams {
      max_detections: self.max_detections as usize,
      threshold: self.threshold,
    }
  }

  pub fn labels(&self) -> Result<Labels, ConfigError> {
    match &self.class_file {
      Some(path) => Labels::from_file(path),
      None => {
        warn!("未配置 class_file, 所有类别标记为 \"{}\"", UNKNOWN_LABEL);
        Ok(Labels::default())
      }
    }
  }
}

/// 类别名称表，每行一个
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path.as_ref())?;
    let labels = Self::from_lines(&text);
    debug!("加载 {} 个类别标签", labels.len());
    Ok(labels)
  }

  pub fn from_lines(text: &str) -> Self {
    Self {
      names: text.lines().map(str::to_string).collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: u8) -> &str {
    self
      .names
      .get(class_id as usize)
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }
}
