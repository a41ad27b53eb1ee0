// 该文件是 Shanan-IMX500 项目的一部分。
// src/model/mobilenet.rs - IMX500 上的 MobileNet-SSD
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
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  cache::SchemaCache,
  config::{ConfigError, Labels, MobileNetConfig},
  error::FrameError,
  frame::TensorFrame,
  model::{DetectResult, Model, ssd::SsdParams},
  pipeline::process_frame,
};

#[derive(Error, Debug)]
pub enum MobileNetSsdError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("配置错误: {0}")]
  ConfigError(#[from] ConfigError),
  #[error("参数 {0} 无效: {1}")]
  InvalidParameter(String, String),
}

/// 传感器已完成推理，这里只负责解码其输出
pub struct MobileNetSsd {
  params: SsdParams,
  labels: Labels,
  cache: SchemaCache,
}

impl MobileNetSsd {
  pub fn new(params: SsdParams, labels: Labels) -> Self {
    Self {
      params,
      labels,
      cache: SchemaCache::new(),
    }
  }

  pub fn params(&self) -> &SsdParams {
    &self.params
  }

  pub fn cache(&self) -> &SchemaCache {
    &self.cache
  }
}

impl Model for MobileNetSsd {
  type Input = TensorFrame;
  type Output = DetectResult;
  type Error = FrameError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let set = process_frame(input, &self.params, &mut self.cache)?;
    Ok(DetectResult::from_detections(&set, &self.labels))
  }
}

/// `mobilenet:///path/to/config.json?threshold=0.5&max_detections=3`
pub struct MobileNetSsdBuilder {
  config: MobileNetConfig,
}

impl FromUrlWithScheme for MobileNetSsdBuilder {
  const SCHEME: &'static str = "mobilenet";
}

fn query_value<T: std::str::FromStr>(url: &Url, key: &str) -> Result<Option<T>, MobileNetSsdError> {
  match url.query_pairs().find(|(k, _)| k == key) {
    Some((_, v)) => v
      .parse()
      .map(Some)
      .map_err(|_| MobileNetSsdError::InvalidParameter(key.to_string(), v.to_string())),
    None => Ok(None),
  }
}

impl FromUrl for MobileNetSsdBuilder {
  type Error = MobileNetSsdError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(MobileNetSsdError::SchemeMismatch);
    }

    let mut config = MobileNetConfig::from_file(url.path())?;
    if let Some(threshold) = query_value(url, "threshold")? {
      config.threshold = threshold;
    }
    if let Some(max_detections) = query_value(url, "max_detections")? {
      config.max_detections = max_detections;
    }
    config.validate()?;

    Ok(MobileNetSsdBuilder { config })
  }
}

impl MobileNetSsdBuilder {
  pub fn with_config(config: MobileNetConfig) -> Self {
    Self { config }
  }

  pub fn threshold(mut self, threshold: f32) -> Self {
    self.config.threshold = threshold;
    self
  }

  pub fn max_detections(mut self, max_detections: u32) -> Self {
    self.config.max_detections = max_detections;
    self
  }

  pub fn build(self) -> Result<MobileNetSsd, MobileNetSsdError> {
    self.config.validate()?;
    let labels = self.config.labels()?;
    info!(
      "MobileNet-SSD: 最大检测数 {}, 阈值 {}, 类别数 {}",
      self.config.max_detections,
      self.config.threshold,
      labels.len()
    );
    debug!("配置: {:?}", self.config);
    Ok(MobileNetSsd::new(self.config.params(), labels))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_query_overrides_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mobilenet.json");
    std::fs::write(&path, r#"{ "max_detections": 5 }"#).unwrap();

    let url = Url::parse(&format!(
      "mobilenet://{}?threshold=0.65&max_detections=2",
      path.display()
    ))
    .unwrap();
    let model = MobileNetSsdBuilder::from_url(&url).unwrap().build().unwrap();
    assert_eq!(model.params().threshold, 0.65);
    assert_eq!(model.params().max_detections, 2);
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("tensor:///tmp/frames.bin").unwrap();
    assert!(matches!(
      MobileNetSsdBuilder::from_url(&url),
      Err(MobileNetSsdError::SchemeMismatch)
    ));
  }

  #[test]
  fn bad_query_value_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mobilenet.json");
    std::fs::write(&path, r#"{ "max_detections": 5 }"#).unwrap();
    let url = Url::parse(&format!("mobilenet://{}?threshold=high", path.display())).unwrap();
    assert!(matches!(
      MobileNetSsdBuilder::from_url(&url),
      Err(MobileNetSsdError::InvalidParameter(_, _))
    ));
  }
}
