// 该文件是 Shanan-IMX500 项目的一部分。
// src/schema.rs - AP 参数（输出张量描述）解析
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

use crate::error::FrameError;

mod reader;
pub mod writer;

use self::reader::Table;

// 各表的字段槽位，由传感器固件决定
const ROOT_NETWORKS: usize = 0;

const NETWORK_ID: usize = 0;
const NETWORK_TYPE: usize = 1;
// 槽位 2 为输入张量，解码输出时不需要
const NETWORK_OUTPUT_TENSORS: usize = 3;

const OUTPUT_ID: usize = 0;
const OUTPUT_NAME: usize = 1;
const OUTPUT_NUM_DIMENSIONS: usize = 2;
const OUTPUT_DIMENSIONS: usize = 3;
const OUTPUT_BITS_PER_ELEMENT: usize = 4;
const OUTPUT_SHIFT: usize = 5;
const OUTPUT_SCALE: usize = 6;
const OUTPUT_FORMAT: usize = 7;

const DIMENSION_ID: usize = 0;
const DIMENSION_SIZE: usize = 1;
const DIMENSION_SERIALIZATION_INDEX: usize = 2;
const DIMENSION_PADDING: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementFormat {
  Signed,
  Unsigned,
}

impl From<u8> for ElementFormat {
  fn from(tag: u8) -> Self {
    match tag {
      0 => ElementFormat::Signed,
      _ => ElementFormat::Unsigned,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
  /// 逻辑顺序中的位置
  pub ordinal: u8,
  pub size: u16,
  /// 传输顺序中的位置
  pub serialization_index: u8,
  pub padding: u8,
}

impl Dimension {
  pub fn new(ordinal: u8, size: u16, serialization_index: u8) -> Self {
    Self {
      ordinal,
      size,
      serialization_index,
      padding: 0,
    }
  }
}

/// 单个输出张量的形状与量化参数
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensorDescriptor {
  pub id: u8,
  pub name: String,
  pub dimensions: Vec<Dimension>,
  pub bits_per_element: u8,
  pub shift: u16,
  pub scale: f32,
  pub format: ElementFormat,
}

impl OutputTensorDescriptor {
  /// 传输顺序与逻辑顺序不一致时需要重排
  pub fn needs_reorder(&self) -> bool {
    self
      .dimensions
      .iter()
      .any(|dim| dim.serialization_index != dim.ordinal)
  }

  /// 各维尺寸的乘积，先检查再相乘，溢出时返回 `None`
  pub fn element_count(&self) -> Option<u32> {
    self
      .dimensions
      .iter()
      .try_fold(1u32, |acc, dim| acc.checked_mul(dim.size as u32))
  }
}

/// 解析 AP 参数，返回与 `network_id` 匹配的第一个网络的输出张量描述。
///
/// 没有匹配的网络时返回空列表，由布局规划阶段报告 `EmptyOutput`。
pub fn parse_schema(
  bytes: &[u8],
  network_id: u16,
) -> Result<Vec<OutputTensorDescriptor>, FrameError> {
  let root = Table::root(bytes)?;
  let networks = root.tables(ROOT_NETWORKS)?;
  debug!("网络数量: {}", networks.len());

  for network in networks.iter() {
    let network = network?;
    if network.u16(NETWORK_ID, 0)? != network_id {
      continue;
    }

    let kind = network.string(NETWORK_TYPE)?.unwrap_or_default();
    let outputs = network.tables(NETWORK_OUTPUT_TENSORS)?;
    debug!("网络: {}, 输出张量数量: {}", kind, outputs.len());

    return outputs.iter().map(|t| parse_output_tensor(t?)).collect();
  }

  debug!("AP 参数中没有编号为 {} 的网络", network_id);
  Ok(Vec::new())
}

fn parse_output_tensor(table: Table<'_>) -> Result<OutputTensorDescriptor, FrameError> {
  let num_dimensions = table.u8(OUTPUT_NUM_DIMENSIONS, 0)? as usize;
  let entries = table.tables(OUTPUT_DIMENSIONS)?;
  if num_dimensions > entries.len() {
    return Err(FrameError::schema(format!(
      "声明 {} 个维度, 实际只有 {} 个",
      num_dimensions,
      entries.len()
    )));
  }

  let mut dimensions = Vec::with_capacity(num_dimensions);
  for k in 0..num_dimensions {
    let entry = entries.get(k)?;
    let dim = Dimension {
      ordinal: entry.u8(DIMENSION_ID, 0)?,
      size: entry.u16(DIMENSION_SIZE, 0)?,
      serialization_index: entry.u8(DIMENSION_SERIALIZATION_INDEX, 0)?,
      padding: entry.u8(DIMENSION_PADDING, 0)?,
    };
    if dim.padding != 0 {
      error!("AP 参数错误: 第 {} 维的 padding 非零", k);
      return Err(FrameError::schema(format!("第 {} 维的 padding 非零", k)));
    }
    dimensions.push(dim);
  }

  Ok(OutputTensorDescriptor {
    id: table.u8(OUTPUT_ID, 0)?,
    name: table.string(OUTPUT_NAME)?.unwrap_or_default().to_string(),
    dimensions,
    bits_per_element: table.u8(OUTPUT_BITS_PER_ELEMENT, 0)?,
    shift: table.u16(OUTPUT_SHIFT, 0)?,
    scale: table.f32(OUTPUT_SCALE, 0.0)?,
    format: ElementFormat::from(table.u8(OUTPUT_FORMAT, 0)?),
  })
}
