// 该文件是 Shanan-IMX500 项目的一部分。
// src/error.rs - 帧解码错误定义
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

/// 单帧处理过程中的错误。
///
/// 所有错误都只影响当前帧：调用方记录后跳过该帧，继续处理下一帧。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
  #[error("帧头无效: {0}")]
  InvalidHeader(String),
  #[error("AP 参数无效: {0}")]
  InvalidSchema(String),
  #[error("尺寸计算溢出: {0}")]
  Overflow(&'static str),
  #[error("输出张量为空")]
  EmptyOutput,
  #[error("不支持的元素位宽: {0}")]
  UnsupportedElementWidth(u8),
  #[error("输出张量偏移越界: {offset} > {total}")]
  LayoutOverflow { offset: u32, total: u32 },
  #[error("输出张量布局不符合预期: 期望 {expected} 个元素, 实际 {actual} 个")]
  UnexpectedLayout { expected: usize, actual: usize },
  #[error("不支持 {rank} 维张量的维度重排 (最多 {max} 维)")]
  UnsupportedReorder { rank: usize, max: usize },
}

impl FrameError {
  pub fn header(msg: impl Into<String>) -> Self {
    FrameError::InvalidHeader(msg.into())
  }

  pub fn schema(msg: impl Into<String>) -> Self {
    FrameError::InvalidSchema(msg.into())
  }
}
