// 该文件是 Shanan-IMX500 项目的一部分。
// src/output/log_output.rs - 将检测结果写入日志
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

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::TensorFrame,
  model::{DetectItem, DetectResult},
  output::Render,
};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// `log://`，空结果只在 debug 级别输出
#[derive(Debug, Default)]
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch);
    }
    Ok(LogOutput)
  }
}

pub(crate) fn format_item(item: &DetectItem) -> String {
  format!(
    "{}({}), {:.4}, {}, {}, {}, {}",
    item.label, item.class_id, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
  )
}

impl Render<TensorFrame, DetectResult> for LogOutput {
  type Error = LogOutputError;

  fn render_result(&self, _frame: &TensorFrame, result: &DetectResult) -> Result<(), Self::Error> {
    if result.is_empty() {
      debug!("未检测到目标");
      return Ok(());
    }

    info!("检测到 {} 个目标", result.len());
    for item in result.items.iter() {
      info!("  - {}", format_item(item));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_log_scheme_is_accepted() {
    assert!(LogOutput::from_url(&url::Url::parse("log://").unwrap()).is_ok());
    assert!(matches!(
      LogOutput::from_url(&url::Url::parse("folder:///tmp").unwrap()),
      Err(LogOutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn item_line_carries_label_and_box() {
    let item = DetectItem {
      class_id: 1,
      label: "person".to_string(),
      score: 0.5,
      bbox: [1, 2, 3, 4],
    };
    assert_eq!(format_item(&item), "person(1), 0.5000, 1, 2, 3, 4");
  }
}
