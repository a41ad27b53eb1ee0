// 该文件是 Shanan-IMX500 项目的一部分。
// src/layout.rs - 输出张量布局规划
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

use tracing::{debug, error};

use crate::{error::FrameError, schema::OutputTensorDescriptor};

/// 所有输出张量在一块连续 f32 缓冲区中的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
  pub total_element_count: u32,
  pub per_tensor_element_count: Vec<u32>,
  pub per_tensor_offset: Vec<u32>,
}

impl OutputLayout {
  pub fn tensor_count(&self) -> usize {
    self.per_tensor_element_count.len()
  }

  /// 第 `index` 个张量在输出缓冲区中的范围
  pub fn range(&self, index: usize) -> std::ops::Range<usize> {
    let start = self.per_tensor_offset[index] as usize;
    start..start + self.per_tensor_element_count[index] as usize
  }
}

pub fn plan_layout(descriptors: &[OutputTensorDescriptor]) -> Result<OutputLayout, FrameError> {
  if descriptors.is_empty() {
    error!("输出张量数量为 0");
    return Err(FrameError::EmptyOutput);
  }

  let mut total = 0u32;
  let mut counts = Vec::with_capacity(descriptors.len());
  let mut offsets = Vec::with_capacity(descriptors.len());

  for desc in descriptors {
    let count = desc.element_count().ok_or_else(|| {
      error!("张量 {} 的维度乘积溢出", desc.name);
      FrameError::Overflow("维度乘积")
    })?;

    offsets.push(total);
    total = total.checked_add(count).ok_or_else(|| {
      error!("输出总大小溢出");
      FrameError::Overflow("输出总大小")
    })?;
    counts.push(count);
  }

  if total == 0 {
    error!("输出张量总大小为 0");
    return Err(FrameError::EmptyOutput);
  }

  if total.checked_mul(size_of::<f32>() as u32).is_none() {
    error!("输出缓冲区字节数溢出: {} 个元素", total);
    return Err(FrameError::Overflow("输出缓冲区字节数"));
  }

  debug!("输出总大小: {}", total);

  Ok(OutputLayout {
    total_element_count: total,
    per_tensor_element_count: counts,
    per_tensor_offset: offsets,
  })
}
