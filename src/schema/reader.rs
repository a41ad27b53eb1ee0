// 该文件是 Shanan-IMX500 项目的一部分。
// src/schema/reader.rs - AP 参数表格式读取
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

//! flatbuffer 风格的自描述表读取器。
//!
//! 布局：
//! - 缓冲区开头是指向根表的 u32 偏移
//! - 表开头是 i32 偏移，`vtable = table - soffset`
//! - vtable 依次是 u16 vtable 长度、u16 表长度、每个字段的 u16 偏移（0 表示缺省）
//! - 字符串和向量以 u32 长度开头，引用字段存放相对自身位置的 u32 偏移
//!
//! 所有访问都做边界检查，越界即视为 AP 参数损坏。

use crate::error::FrameError;

fn read_bytes<const N: usize>(buf: &[u8], pos: usize) -> Result<[u8; N], FrameError> {
  let bytes = pos
    .checked_add(N)
    .and_then(|end| buf.get(pos..end))
    .ok_or_else(|| FrameError::schema(format!("读取越界: 位置 {}, 长度 {}", pos, buf.len())))?;
  let mut out = [0u8; N];
  out.copy_from_slice(bytes);
  Ok(out)
}

fn read_u16(buf: &[u8], pos: usize) -> Result<u16, FrameError> {
  read_bytes::<2>(buf, pos).map(u16::from_le_bytes)
}

fn read_u32(buf: &[u8], pos: usize) -> Result<u32, FrameError> {
  read_bytes::<4>(buf, pos).map(u32::from_le_bytes)
}

fn read_i32(buf: &[u8], pos: usize) -> Result<i32, FrameError> {
  read_bytes::<4>(buf, pos).map(i32::from_le_bytes)
}

// 跟随一个相对偏移
fn follow(buf: &[u8], pos: usize) -> Result<usize, FrameError> {
  let offset = read_u32(buf, pos)? as usize;
  pos
    .checked_add(offset)
    .filter(|target| *target < buf.len())
    .ok_or_else(|| FrameError::schema(format!("偏移越界: {} + {}", pos, offset)))
}

#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
  buf: &'a [u8],
  pos: usize,
  vtable: usize,
  vtable_len: usize,
}

impl<'a> Table<'a> {
  pub fn root(buf: &'a [u8]) -> Result<Self, FrameError> {
    let pos = follow(buf, 0)?;
    Table::at(buf, pos)
  }

  fn at(buf: &'a [u8], pos: usize) -> Result<Self, FrameError> {
    let soffset = read_i32(buf, pos)? as i64;
    let vtable = pos as i64 - soffset;
    if vtable < 0 || vtable as usize >= buf.len() {
      return Err(FrameError::schema(format!("vtable 位置无效: {}", vtable)));
    }
    let vtable = vtable as usize;
    let vtable_len = read_u16(buf, vtable)? as usize;
    if vtable_len < 4 || vtable + vtable_len > buf.len() {
      return Err(FrameError::schema(format!("vtable 长度无效: {}", vtable_len)));
    }

    Ok(Table {
      buf,
      pos,
      vtable,
      vtable_len,
    })
  }

  fn field(&self, slot: usize) -> Result<Option<usize>, FrameError> {
    let entry = 4 + 2 * slot;
    if entry + 2 > self.vtable_len {
      return Ok(None);
    }
    match read_u16(self.buf, self.vtable + entry)? {
      0 => Ok(None),
      offset => Ok(Some(self.pos + offset as usize)),
    }
  }

  pub fn u8(&self, slot: usize, default: u8) -> Result<u8, FrameError> {
    match self.field(slot)? {
      Some(pos) => read_bytes::<1>(self.buf, pos).map(|b| b[0]),
      None => Ok(default),
    }
  }

  pub fn u16(&self, slot: usize, default: u16) -> Result<u16, FrameError> {
    match self.field(slot)? {
      Some(pos) => read_u16(self.buf, pos),
      None => Ok(default),
    }
  }

  pub fn f32(&self, slot: usize, default: f32) -> Result<f32, FrameError> {
    match self.field(slot)? {
      Some(pos) => read_bytes::<4>(self.buf, pos).map(f32::from_le_bytes),
      None => Ok(default),
    }
  }

  pub fn string(&self, slot: usize) -> Result<Option<&'a str>, FrameError> {
    let Some(pos) = self.field(slot)? else {
      return Ok(None);
    };
    let start = follow(self.buf, pos)?;
    let len = read_u32(self.buf, start)? as usize;
    let bytes = (start + 4)
      .checked_add(len)
      .and_then(|end| self.buf.get(start + 4..end))
      .ok_or_else(|| FrameError::schema(format!("字符串越界: 长度 {}", len)))?;
    std::str::from_utf8(bytes)
      .map(Some)
      .map_err(|e| FrameError::schema(format!("字符串不是 UTF-8: {}", e)))
  }

  /// 读取表向量，字段缺省时返回空向量
  pub fn tables(&self, slot: usize) -> Result<TableVector<'a>, FrameError> {
    let Some(pos) = self.field(slot)? else {
      return Ok(TableVector {
        buf: self.buf,
        start: 0,
        len: 0,
      });
    };
    let start = follow(self.buf, pos)?;
    let len = read_u32(self.buf, start)? as usize;
    let fits = len
      .checked_mul(4)
      .and_then(|size| size.checked_add(start + 4))
      .is_some_and(|end| end <= self.buf.len());
    if !fits {
      return Err(FrameError::schema(format!("向量越界: 长度 {}", len)));
    }

    Ok(TableVector {
      buf: self.buf,
      start: start + 4,
      len,
    })
  }
}

#[derive(Debug, Clone, Copy)]
pub struct TableVector<'a> {
  buf: &'a [u8],
  start: usize,
  len: usize,
}

impl<'a> TableVector<'a> {
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  pub fn get(&self, index: usize) -> Result<Table<'a>, FrameError> {
    if index >= self.len {
      return Err(FrameError::schema(format!(
        "向量下标越界: {} >= {}",
        index, self.len
      )));
    }
    let slot = self.start + 4 * index;
    let pos = follow(self.buf, slot)?;
    Table::at(self.buf, pos)
  }

  pub fn iter(&self) -> impl Iterator<Item = Result<Table<'a>, FrameError>> + '_ {
    (0..self.len).map(move |i| self.get(i))
  }
}
