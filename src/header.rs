// 该文件是 Shanan-IMX500 项目的一部分。
// src/header.rs - DNN 帧头与 AP 参数提取
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

use tracing::debug;

use crate::error::FrameError;

/// 帧头在首行中占用的字节数，AP 参数紧随其后
pub const HEADER_SIZE: usize = 12;

/// 传感器输出的 DNN 帧头（小端序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
  pub valid: bool,
  pub frame_count: u8,
  pub max_line_len: u16,
  pub schema_byte_size: u16,
  pub network_id: u16,
  pub tensor_format_tag: u8,
}

struct Cursor<'a> {
  buf: &'a [u8],
  pos: usize,
}

impl<'a> Cursor<'a> {
  fn new(buf: &'a [u8]) -> Self {
    Self { buf, pos: 0 }
  }

  fn take<const N: usize>(&mut self) -> Result<[u8; N], FrameError> {
    let end = self.pos + N;
    let bytes = self
      .buf
      .get(self.pos..end)
      .ok_or_else(|| FrameError::header(format!("帧头字段越界: {}..{}", self.pos, end)))?;
    self.pos = end;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
  }

  fn u8(&mut self) -> Result<u8, FrameError> {
    Ok(self.take::<1>()?[0])
  }

  fn u16_le(&mut self) -> Result<u16, FrameError> {
    Ok(u16::from_le_bytes(self.take::<2>()?))
  }
}

impl FrameHeader {
  /// 按字段逐个读取帧头
  pub fn read(raw: &[u8]) -> Result<Self, FrameError> {
    if raw.len() < HEADER_SIZE {
      return Err(FrameError::header(format!(
        "数据长度 {} 小于帧头长度 {}",
        raw.len(),
        HEADER_SIZE
      )));
    }

    let mut cursor = Cursor::new(raw);
    let valid = cursor.u8()? != 0;
    let frame_count = cursor.u8()?;
    let max_line_len = cursor.u16_le()?;
    let schema_byte_size = cursor.u16_le()?;
    let network_id = cursor.u16_le()?;
    // 其余字节保留
    let tensor_format_tag = cursor.u8()?;

    Ok(FrameHeader {
      valid,
      frame_count,
      max_line_len,
      schema_byte_size,
      network_id,
      tensor_format_tag,
    })
  }

  /// 序列化为首行开头的 `HEADER_SIZE` 字节，末尾填充为 0
  pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    out[0] = self.valid as u8;
    out[1] = self.frame_count;
    out[2..4].copy_from_slice(&self.max_line_len.to_le_bytes());
    out[4..6].copy_from_slice(&self.schema_byte_size.to_le_bytes());
    out[6..8].copy_from_slice(&self.network_id.to_le_bytes());
    out[8] = self.tensor_format_tag;
    out
  }
}

/// 解析帧头，并取出跨行交织存放的 AP 参数
pub fn parse_header(raw: &[u8], stride: usize) -> Result<(FrameHeader, Vec<u8>), FrameError> {
  let header = FrameHeader::read(raw)?;

  debug!(
    "帧头: valid {} count {} max len {} ap param size {} network id {} tensor type {}",
    header.valid,
    header.frame_count,
    header.max_line_len,
    header.schema_byte_size,
    header.network_id,
    header.tensor_format_tag
  );

  if !header.valid {
    return Err(FrameError::header("帧标记为无效"));
  }

  let schema = read_interleaved(raw, stride, header.schema_byte_size as usize)?;
  Ok((header, schema))
}

// 从首行第 HEADER_SIZE 字节开始逐字节复制，行内游标到达 stride 时转到下一行行首
fn read_interleaved(raw: &[u8], stride: usize, len: usize) -> Result<Vec<u8>, FrameError> {
  let mut schema = Vec::with_capacity(len);
  let mut line_start = 0usize;
  let mut i = HEADER_SIZE;

  for _ in 0..len {
    if stride != 0 && i >= stride {
      i = 0;
      line_start += stride;
    }
    let byte = raw.get(line_start + i).ok_or_else(|| {
      FrameError::header(format!(
        "AP 参数越界: 需要 {} 字节, 缓冲区只有 {} 字节",
        len,
        raw.len()
      ))
    })?;
    schema.push(*byte);
    i += 1;
  }

  Ok(schema)
}

/// `parse_header` 的逆过程：写入帧头并按行交织写入 AP 参数
pub fn write_header(
  raw: &mut [u8],
  header: &FrameHeader,
  schema: &[u8],
  stride: usize,
) -> Result<(), FrameError> {
  if raw.len() < HEADER_SIZE {
    return Err(FrameError::header("缓冲区容纳不下帧头"));
  }
  raw[..HEADER_SIZE].copy_from_slice(&header.to_bytes());

  let mut line_start = 0usize;
  let mut i = HEADER_SIZE;
  for byte in schema {
    if stride != 0 && i >= stride {
      i = 0;
      line_start += stride;
    }
    let slot = raw
      .get_mut(line_start + i)
      .ok_or_else(|| FrameError::header("缓冲区容纳不下 AP 参数"))?;
    *slot = *byte;
    i += 1;
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_header() -> FrameHeader {
    FrameHeader {
      valid: true,
      frame_count: 3,
      max_line_len: 0x0140,
      schema_byte_size: 0,
      network_id: 0x0207,
      tensor_format_tag: 1,
    }
  }

  #[test]
  fn reads_little_endian_fields() {
    let raw = [1u8, 3, 0x40, 0x01, 0x00, 0x00, 0x07, 0x02, 1, 0, 0, 0];
    let header = FrameHeader::read(&raw).unwrap();
    assert_eq!(header, sample_header());
  }

  #[test]
  fn reserved_bytes_are_ignored() {
    let raw = [1u8, 3, 0x40, 0x01, 0x00, 0x00, 0x07, 0x02, 1, 0xff, 0xff, 0xff];
    assert_eq!(FrameHeader::read(&raw).unwrap(), sample_header());
  }

  #[test]
  fn rejects_invalid_frame() {
    let mut header = sample_header();
    header.valid = false;
    let raw = header.to_bytes();
    assert!(matches!(
      parse_header(&raw, 64),
      Err(FrameError::InvalidHeader(_))
    ));
  }

  #[test]
  fn rejects_short_buffer() {
    assert!(matches!(
      FrameHeader::read(&[1, 0, 0]),
      Err(FrameError::InvalidHeader(_))
    ));
  }

  #[test]
  fn schema_wraps_at_stride() {
    let stride = 16;
    let mut raw = vec![0u8; stride * 3];
    let mut header = sample_header();
    header.schema_byte_size = 10;
    raw[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    // 首行剩余 4 字节，之后从第二行行首继续
    raw[12..16].copy_from_slice(&[1, 2, 3, 4]);
    raw[16..22].copy_from_slice(&[5, 6, 7, 8, 9, 10]);

    let (_, schema) = parse_header(&raw, stride).unwrap();
    assert_eq!(schema, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
  }

  #[test]
  fn write_then_parse_preserves_schema() {
    let stride = 20;
    let schema: Vec<u8> = (0..45).collect();
    let mut header = sample_header();
    header.schema_byte_size = schema.len() as u16;
    let mut raw = vec![0u8; stride * 4];
    write_header(&mut raw, &header, &schema, stride).unwrap();

    let (parsed, extracted) = parse_header(&raw, stride).unwrap();
    assert_eq!(parsed, header);
    assert_eq!(extracted, schema);
  }

  #[test]
  fn truncated_schema_is_rejected() {
    let mut header = sample_header();
    header.schema_byte_size = 100;
    let mut raw = vec![0u8; 32];
    raw[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    assert!(matches!(
      parse_header(&raw, 16),
      Err(FrameError::InvalidHeader(_))
    ));
  }
}
