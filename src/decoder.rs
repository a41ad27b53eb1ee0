// 该文件是 Shanan-IMX500 项目的一部分。
// src/decoder.rs - 输出张量主体解码
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

//! 把按行排布的定点数张量主体还原为一块连续的 f32 缓冲区。
//!
//! 每个张量占用若干整行，张量之间首尾相接；每个张量作为一个任务交给 rayon
//! 线程池独立解码，写入输出缓冲区中互不重叠的切片。

use rayon::prelude::*;
use tracing::{debug, error};

use crate::{
  error::FrameError,
  layout::OutputLayout,
  schema::{ElementFormat, OutputTensorDescriptor},
};

/// 维度重排支持的最大维数
pub const MAX_REORDER_RANK: usize = 3;

/// 定点数反量化：`(raw - shift) * scale`
pub fn dequantize(raw: i32, shift: u16, scale: f32) -> f32 {
  (raw - shift as i32) as f32 * scale
}

/// 元素位宽对应的字节数
pub fn element_width(bits_per_element: u8) -> Result<usize, FrameError> {
  match bits_per_element {
    8 => Ok(1),
    16 => Ok(2),
    other => {
      error!("无效的 bitsPerElement: {}", other);
      Err(FrameError::UnsupportedElementWidth(other))
    }
  }
}

/// 单个张量在主体中的位置
#[derive(Debug, Clone)]
pub struct TensorPlan<'d> {
  pub index: usize,
  pub desc: &'d OutputTensorDescriptor,
  pub width: usize,
  pub element_count: usize,
  pub lines: usize,
  /// 张量首行相对主体起始的字节偏移
  pub source_offset: usize,
}

/// 计算每个张量占用的行数与起始位置，并用真实元素数复核布局
pub fn plan_tensors<'d>(
  descriptors: &'d [OutputTensorDescriptor],
  layout: &OutputLayout,
  stride: usize,
  max_line_len: u16,
) -> Result<Vec<TensorPlan<'d>>, FrameError> {
  if max_line_len == 0 {
    return Err(FrameError::header("maxLineLen 为 0"));
  }

  let total = layout.total_element_count;
  let mut plans = Vec::with_capacity(descriptors.len());
  let mut offset = 0u32;
  let mut line_offset = 0usize;

  for (index, desc) in descriptors.iter().enumerate() {
    let width = element_width(desc.bits_per_element)?;
    let count = desc
      .element_count()
      .ok_or(FrameError::Overflow("维度乘积"))?;
    let byte_size = count
      .checked_mul(width as u32)
      .ok_or(FrameError::Overflow("张量字节数"))?;
    let lines = (byte_size as usize).div_ceil(max_line_len as usize);

    let planned = (
      layout.per_tensor_offset.get(index),
      layout.per_tensor_element_count.get(index),
    );
    if planned != (Some(&offset), Some(&count)) {
      error!("张量 {} 的偏移与布局不一致", index);
      return Err(FrameError::LayoutOverflow { offset, total });
    }

    let source_offset = line_offset
      .checked_mul(stride)
      .ok_or(FrameError::Overflow("张量起始位置"))?;

    plans.push(TensorPlan {
      index,
      desc,
      width,
      element_count: count as usize,
      lines,
      source_offset,
    });

    line_offset += lines;
    offset = offset
      .checked_add(count)
      .ok_or(FrameError::Overflow("输出张量偏移"))?;
    if offset > total {
      error!("输出张量偏移 {} 超过输出大小 {}", offset, total);
      return Err(FrameError::LayoutOverflow { offset, total });
    }
  }

  if descriptors.len() != layout.tensor_count() {
    return Err(FrameError::LayoutOverflow { offset, total });
  }

  Ok(plans)
}

impl TensorPlan<'_> {
  /// 解码该张量时读取到的最后一个字节之后的位置（相对主体起始）
  pub fn source_end(&self, stride: usize, max_line_len: u16) -> Option<usize> {
    let per_line = (max_line_len as usize).div_ceil(self.width);
    if per_line == 0 || self.element_count == 0 {
      return Some(self.source_offset);
    }
    let used_lines = self.element_count.div_ceil(per_line);
    let last = self.element_count - (used_lines - 1) * per_line;
    (used_lines - 1)
      .checked_mul(stride)
      .and_then(|v| v.checked_add(self.source_offset))
      .and_then(|v| v.checked_add(last * self.width))
  }
}

/// 在分配输出缓冲区之前，确认每个张量都落在主体之内
pub fn check_body(
  plans: &[TensorPlan<'_>],
  body_len: usize,
  stride: usize,
  max_line_len: u16,
) -> Result<(), FrameError> {
  for plan in plans {
    let end = plan
      .source_end(stride, max_line_len)
      .ok_or(FrameError::Overflow("张量结束位置"))?;
    if end > body_len {
      error!(
        "张量 {} 需要 {} 字节主体, 实际只有 {} 字节",
        plan.desc.name, end, body_len
      );
      return Err(FrameError::header(format!(
        "张量 {} 超出帧数据: {} > {}",
        plan.desc.name, end, body_len
      )));
    }
  }
  Ok(())
}

fn read_sample(
  body: &[u8],
  pos: usize,
  width: usize,
  format: ElementFormat,
) -> Result<i32, FrameError> {
  let bytes = body
    .get(pos..pos + width)
    .ok_or_else(|| FrameError::header(format!("张量数据越界: {} >= {}", pos, body.len())))?;

  let raw = match (width, format) {
    (1, ElementFormat::Signed) => bytes[0] as i8 as i32,
    (1, ElementFormat::Unsigned) => bytes[0] as i32,
    // 高地址字节为高位
    (_, ElementFormat::Signed) => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
    (_, ElementFormat::Unsigned) => u16::from_le_bytes([bytes[0], bytes[1]]) as i32,
  };
  Ok(raw)
}

/// 计算重排映射：传输顺序第 `s` 个元素对应逻辑顺序中的下标 `map[s]`。
///
/// 两种顺序都以第 0 维变化最快。
pub fn reorder_map(desc: &OutputTensorDescriptor) -> Result<Vec<usize>, FrameError> {
  let rank = desc.dimensions.len();
  if rank > MAX_REORDER_RANK {
    error!("张量 {} 有 {} 维, 不支持重排", desc.name, rank);
    return Err(FrameError::UnsupportedReorder {
      rank,
      max: MAX_REORDER_RANK,
    });
  }

  let mut wire_to_logical = [None; MAX_REORDER_RANK];
  for (logical, dim) in desc.dimensions.iter().enumerate() {
    let wire = dim.serialization_index as usize;
    if wire >= rank || wire_to_logical[wire].is_some() {
      return Err(FrameError::schema(format!(
        "张量 {} 的 serializationIndex 不是有效排列",
        desc.name
      )));
    }
    wire_to_logical[wire] = Some(logical);
  }

  let mut logical_stride = [1usize; MAX_REORDER_RANK];
  for l in 1..rank {
    logical_stride[l] = logical_stride[l - 1] * desc.dimensions[l - 1].size as usize;
  }

  let mut loop_cnt = [1usize; MAX_REORDER_RANK];
  let mut coef = [1usize; MAX_REORDER_RANK];
  for wire in 0..rank {
    let Some(logical) = wire_to_logical[wire] else {
      return Err(FrameError::schema("serializationIndex 缺失"));
    };
    loop_cnt[wire] = desc.dimensions[logical].size as usize;
    coef[wire] = logical_stride[logical];
  }

  let mut map = Vec::with_capacity(loop_cnt.iter().product());
  for i in 0..loop_cnt[2] {
    for j in 0..loop_cnt[1] {
      for k in 0..loop_cnt[0] {
        map.push(coef[2] * i + coef[1] * j + coef[0] * k);
      }
    }
  }
  Ok(map)
}

/// 解码单个张量，结果按逻辑顺序写入 `dst`
pub fn decode_tensor(
  plan: &TensorPlan<'_>,
  body: &[u8],
  stride: usize,
  max_line_len: u16,
  dst: &mut [f32],
) -> Result<(), FrameError> {
  let desc = plan.desc;
  let count = plan.element_count;
  if count == 0 {
    error!("输出张量 {} 大小为 0", desc.name);
    return Err(FrameError::EmptyOutput);
  }

  let mut wire = Vec::with_capacity(count);
  let mut line_start = plan.source_offset;
  'lines: for _ in 0..plan.lines {
    let mut i = 0usize;
    while i < max_line_len as usize {
      let raw = read_sample(body, line_start + i, plan.width, desc.format)?;
      wire.push(dequantize(raw, desc.shift, desc.scale));
      if wire.len() == count {
        break 'lines;
      }
      i += plan.width;
    }
    line_start += stride;
  }

  if wire.len() != count || dst.len() != count {
    return Err(FrameError::LayoutOverflow {
      offset: wire.len() as u32,
      total: dst.len() as u32,
    });
  }

  if desc.needs_reorder() {
    let map = reorder_map(desc)?;
    for (value, target) in wire.iter().zip(map) {
      dst[target] = *value;
    }
  } else {
    dst.copy_from_slice(&wire);
  }

  Ok(())
}

fn split_output<'o, 'd>(
  plans: Vec<TensorPlan<'d>>,
  output: &'o mut [f32],
) -> Vec<(TensorPlan<'d>, &'o mut [f32])> {
  let mut rest = output;
  let mut jobs = Vec::with_capacity(plans.len());
  for plan in plans {
    let (head, tail) = std::mem::take(&mut rest).split_at_mut(plan.element_count);
    rest = tail;
    jobs.push((plan, head));
  }
  // 行数多的张量先派发
  jobs.sort_by(|a, b| b.0.lines.cmp(&a.0.lines));
  jobs
}

fn first_error(results: Vec<(usize, Result<(), FrameError>)>) -> Result<(), FrameError> {
  let mut first = None;
  for (index, result) in results {
    if let Err(e) = result {
      error!("输出张量 {} 解码失败: {}", index, e);
      first.get_or_insert(e);
    }
  }
  first.map_or(Ok(()), Err)
}

/// 在 rayon 线程池中解码全部任务，收集每个任务的结果（按派发顺序）
fn run_jobs(
  plans: Vec<TensorPlan<'_>>,
  body: &[u8],
  stride: usize,
  max_line_len: u16,
  output: &mut [f32],
) -> Vec<(usize, Result<(), FrameError>)> {
  let jobs = split_output(plans, output);
  debug!("派发 {} 个张量解码任务", jobs.len());

  jobs
    .into_par_iter()
    .map(|(plan, dst)| {
      (
        plan.index,
        decode_tensor(&plan, body, stride, max_line_len, dst),
      )
    })
    .collect()
}

/// 并发解码所有输出张量，全部任务结束后才返回
pub fn decode_all(
  descriptors: &[OutputTensorDescriptor],
  layout: &OutputLayout,
  body: &[u8],
  stride: usize,
  max_line_len: u16,
) -> Result<Vec<f32>, FrameError> {
  let plans = plan_tensors(descriptors, layout, stride, max_line_len)?;
  check_body(&plans, body.len(), stride, max_line_len)?;
  let mut output = vec![0.0f32; layout.total_element_count as usize];
  let results = run_jobs(plans, body, stride, max_line_len, &mut output);

  first_error(results)?;
  Ok(output)
}

/// 与 `decode_all` 结果相同的单线程版本
pub fn decode_all_sequential(
  descriptors: &[OutputTensorDescriptor],
  layout: &OutputLayout,
  body: &[u8],
  stride: usize,
  max_line_len: u16,
) -> Result<Vec<f32>, FrameError> {
  let plans = plan_tensors(descriptors, layout, stride, max_line_len)?;
  check_body(&plans, body.len(), stride, max_line_len)?;
  let mut output = vec![0.0f32; layout.total_element_count as usize];
  let results = split_output(plans, &mut output)
    .into_iter()
    .map(|(plan, dst)| {
      (
        plan.index,
        decode_tensor(&plan, body, stride, max_line_len, dst),
      )
    })
    .collect();

  first_error(results)?;
  Ok(output)
}
