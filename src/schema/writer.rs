// 该文件是 Shanan-IMX500 项目的一部分。
// src/schema/writer.rs - AP 参数表格式写入
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

//! 与 `reader` 对应的写入器，用于合成测试帧。
//! 采用前向写入：先写表，再把子对象追加到末尾并回填偏移，因此所有偏移都为正。

use super::{
  DIMENSION_ID, DIMENSION_PADDING, DIMENSION_SERIALIZATION_INDEX, DIMENSION_SIZE, Dimension,
  ElementFormat, NETWORK_ID, NETWORK_OUTPUT_TENSORS, NETWORK_TYPE, OUTPUT_BITS_PER_ELEMENT,
  OUTPUT_DIMENSIONS, OUTPUT_FORMAT, OUTPUT_ID, OUTPUT_NAME, OUTPUT_NUM_DIMENSIONS, OUTPUT_SCALE,
  OUTPUT_SHIFT, OutputTensorDescriptor, ROOT_NETWORKS,
};

#[derive(Debug, Clone)]
enum Value {
  U8(u8),
  U16(u16),
  F32(f32),
  Str(String),
  Tables(Vec<TableBuilder>),
}

impl Value {
  fn inline_size(&self) -> usize {
    match self {
      Value::U8(_) => 1,
      Value::U16(_) => 2,
      Value::F32(_) | Value::Str(_) | Value::Tables(_) => 4,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct TableBuilder {
  fields: Vec<(usize, Value)>,
}

fn align(value: usize, to: usize) -> usize {
  value.div_ceil(to) * to
}

fn pad_to(buf: &mut Vec<u8>, to: usize) {
  let len = align(buf.len(), to);
  buf.resize(len, 0);
}

fn patch_u32(buf: &mut [u8], pos: usize, value: u32) {
  buf[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
}

impl TableBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  fn with(mut self, slot: usize, value: Value) -> Self {
    self.fields.retain(|(s, _)| *s != slot);
    self.fields.push((slot, value));
    self
  }

  pub fn u8(self, slot: usize, value: u8) -> Self {
    self.with(slot, Value::U8(value))
  }

  pub fn u16(self, slot: usize, value: u16) -> Self {
    self.with(slot, Value::U16(value))
  }

  pub fn f32(self, slot: usize, value: f32) -> Self {
    self.with(slot, Value::F32(value))
  }

  pub fn string(self, slot: usize, value: &str) -> Self {
    self.with(slot, Value::Str(value.to_string()))
  }

  pub fn tables(self, slot: usize, value: Vec<TableBuilder>) -> Self {
    self.with(slot, Value::Tables(value))
  }

  /// 以当前表为根表输出完整缓冲区
  pub fn finish(&self) -> Vec<u8> {
    let mut buf = vec![0u8; 4];
    let root = self.write(&mut buf);
    patch_u32(&mut buf, 0, root as u32);
    buf
  }

  fn write(&self, buf: &mut Vec<u8>) -> usize {
    let slots = self.fields.iter().map(|(s, _)| s + 1).max().unwrap_or(0);

    let mut size = 4usize;
    let mut placed = Vec::with_capacity(self.fields.len());
    for (slot, value) in &self.fields {
      let width = value.inline_size();
      size = align(size, width);
      placed.push((*slot, size, value));
      size += width;
    }
    let table_size = align(size, 4);

    let vtable_len = 4 + 2 * slots;
    let mut offsets = vec![0u16; slots];
    for (slot, offset, _) in &placed {
      offsets[*slot] = *offset as u16;
    }

    pad_to(buf, 4);
    let vtable = buf.len();
    buf.extend_from_slice(&(vtable_len as u16).to_le_bytes());
    buf.extend_from_slice(&(table_size as u16).to_le_bytes());
    for offset in offsets {
      buf.extend_from_slice(&offset.to_le_bytes());
    }
    pad_to(buf, 4);

    let table = buf.len();
    buf.resize(table + table_size, 0);
    buf[table..table + 4].copy_from_slice(&((table - vtable) as i32).to_le_bytes());

    let mut pending = Vec::new();
    for (_, offset, value) in placed {
      let pos = table + offset;
      match value {
        Value::U8(v) => buf[pos] = *v,
        Value::U16(v) => buf[pos..pos + 2].copy_from_slice(&v.to_le_bytes()),
        Value::F32(v) => buf[pos..pos + 4].copy_from_slice(&v.to_le_bytes()),
        Value::Str(_) | Value::Tables(_) => pending.push((pos, value)),
      }
    }

    for (pos, value) in pending {
      let child = match value {
        Value::Str(s) => write_string(buf, s),
        Value::Tables(tables) => write_tables(buf, tables),
        _ => unreachable!("标量字段已内联写入"),
      };
      patch_u32(buf, pos, (child - pos) as u32);
    }

    table
  }
}

fn write_string(buf: &mut Vec<u8>, value: &str) -> usize {
  pad_to(buf, 4);
  let pos = buf.len();
  buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
  buf.extend_from_slice(value.as_bytes());
  buf.push(0);
  pos
}

fn write_tables(buf: &mut Vec<u8>, tables: &[TableBuilder]) -> usize {
  pad_to(buf, 4);
  let pos = buf.len();
  buf.extend_from_slice(&(tables.len() as u32).to_le_bytes());
  buf.resize(pos + 4 + 4 * tables.len(), 0);
  for (i, table) in tables.iter().enumerate() {
    let slot = pos + 4 + 4 * i;
    let child = table.write(buf);
    patch_u32(buf, slot, (child - slot) as u32);
  }
  pos
}

/// 一个网络的 AP 参数描述
#[derive(Debug, Clone)]
pub struct NetworkEntry {
  pub id: u16,
  pub kind: String,
  pub outputs: Vec<OutputTensorDescriptor>,
}

fn dimension_table(dim: &Dimension) -> TableBuilder {
  TableBuilder::new()
    .u8(DIMENSION_ID, dim.ordinal)
    .u16(DIMENSION_SIZE, dim.size)
    .u8(DIMENSION_SERIALIZATION_INDEX, dim.serialization_index)
    .u8(DIMENSION_PADDING, dim.padding)
}

fn output_table(desc: &OutputTensorDescriptor) -> TableBuilder {
  let format = match desc.format {
    ElementFormat::Signed => 0,
    ElementFormat::Unsigned => 1,
  };
  TableBuilder::new()
    .u8(OUTPUT_ID, desc.id)
    .string(OUTPUT_NAME, &desc.name)
    .u8(OUTPUT_NUM_DIMENSIONS, desc.dimensions.len() as u8)
    .tables(
      OUTPUT_DIMENSIONS,
      desc.dimensions.iter().map(dimension_table).collect(),
    )
    .u8(OUTPUT_BITS_PER_ELEMENT, desc.bits_per_element)
    .u16(OUTPUT_SHIFT, desc.shift)
    .f32(OUTPUT_SCALE, desc.scale)
    .u8(OUTPUT_FORMAT, format)
}

/// 把网络列表编码为 AP 参数
pub fn encode_schema(networks: &[NetworkEntry]) -> Vec<u8> {
  let networks = networks
    .iter()
    .map(|network| {
      TableBuilder::new()
        .u16(NETWORK_ID, network.id)
        .string(NETWORK_TYPE, &network.kind)
        .tables(
          NETWORK_OUTPUT_TENSORS,
          network.outputs.iter().map(output_table).collect(),
        )
    })
    .collect();

  TableBuilder::new().tables(ROOT_NETWORKS, networks).finish()
}
