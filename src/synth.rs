// 该文件是 Shanan-IMX500 项目的一部分。
// src/synth.rs - 合成推理元数据帧
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

//! 解码的逆过程：量化、按行排布张量、写入帧头与 AP 参数。
//! 用于测试以及离线调试时构造帧数据。

use crate::{
  decoder::{element_width, plan_tensors, reorder_map},
  error::FrameError,
  header::{FrameHeader, HEADER_SIZE, write_header},
  layout::plan_layout,
  model::ssd::{SSD_OUTPUT_SIZE, SSD_SLOTS},
  schema::{
    Dimension, ElementFormat, OutputTensorDescriptor,
    writer::{NetworkEntry, encode_schema},
  },
};

/// 反量化的逆运算，结果截断到元素类型的取值范围
pub fn quantize(value: f32, desc: &OutputTensorDescriptor) -> i32 {
  let raw = (value / desc.scale).round() as i64 + desc.shift as i64;
  let (min, max) = match (desc.bits_per_element, desc.format) {
    (8, ElementFormat::Signed) => (i8::MIN as i64, i8::MAX as i64),
    (8, ElementFormat::Unsigned) => (0, u8::MAX as i64),
    (_, ElementFormat::Signed) => (i16::MIN as i64, i16::MAX as i64),
    (_, ElementFormat::Unsigned) => (0, u16::MAX as i64),
  };
  raw.clamp(min, max) as i32
}

/// 把逻辑顺序的张量值编码为按行排布的张量主体
pub fn encode_body(
  descriptors: &[OutputTensorDescriptor],
  tensors: &[Vec<f32>],
  stride: usize,
  max_line_len: u16,
) -> Result<Vec<u8>, FrameError> {
  let layout = plan_layout(descriptors)?;
  let plans = plan_tensors(descriptors, &layout, stride, max_line_len)?;
  let lines: usize = plans.iter().map(|p| p.lines).sum();
  let mut body = vec![0u8; lines * stride];

  for (plan, values) in plans.iter().zip(tensors) {
    let desc = plan.desc;
    if values.len() != plan.element_count {
      return Err(FrameError::UnexpectedLayout {
        expected: plan.element_count,
        actual: values.len(),
      });
    }

    let wire: Vec<f32> = if desc.needs_reorder() {
      reorder_map(desc)?.into_iter().map(|i| values[i]).collect()
    } else {
      values.clone()
    };

    let width = element_width(desc.bits_per_element)?;
    let mut samples = wire.iter();
    let mut line_start = plan.source_offset;
    'lines: for _ in 0..plan.lines {
      let mut i = 0usize;
      while i < max_line_len as usize {
        let Some(value) = samples.next() else {
          break 'lines;
        };
        let pos = line_start + i;
        if body.len() < pos + width {
          body.resize(pos + width, 0);
        }
        let raw = quantize(*value, desc);
        match width {
          1 => body[pos] = raw as u8,
          _ => body[pos..pos + 2].copy_from_slice(&(raw as u16).to_le_bytes()),
        }
        i += width;
      }
      line_start += stride;
    }
  }

  Ok(body)
}

/// 帧头中由调用方决定的部分
#[derive(Debug, Clone, Copy)]
pub struct FrameSpec {
  pub stride: usize,
  pub max_line_len: u16,
  pub network_id: u16,
  pub frame_count: u8,
}

/// 生成完整的一帧：首行为帧头和 AP 参数，其后为张量主体
pub fn encode_frame(
  spec: &FrameSpec,
  network: &NetworkEntry,
  tensors: &[Vec<f32>],
) -> Result<Vec<u8>, FrameError> {
  let schema = encode_schema(std::slice::from_ref(network));
  if HEADER_SIZE + schema.len() > spec.stride {
    return Err(FrameError::header(format!(
      "AP 参数 {} 字节超出首行 {} 字节",
      schema.len(),
      spec.stride
    )));
  }

  let header = FrameHeader {
    valid: true,
    frame_count: spec.frame_count,
    max_line_len: spec.max_line_len,
    schema_byte_size: schema.len() as u16,
    network_id: spec.network_id,
    tensor_format_tag: 0,
  };

  let body = encode_body(&network.outputs, tensors, spec.stride, spec.max_line_len)?;
  let mut frame = vec![0u8; spec.stride + body.len()];
  write_header(&mut frame[..spec.stride], &header, &schema, spec.stride)?;
  frame[spec.stride..].copy_from_slice(&body);
  Ok(frame)
}

/// 一个检测槽位，坐标为归一化的 `[y_min, x_min, y_max, x_max]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsdSlot {
  pub class_id: u8,
  pub score: f32,
  pub bbox: [f32; 4],
}

/// 按 MobileNet-SSD 的输出排布生成 61 个元素
pub fn ssd_flat(slots: &[SsdSlot], count: f32) -> Vec<f32> {
  let mut flat = vec![0.0f32; SSD_OUTPUT_SIZE];
  for (i, slot) in slots.iter().take(SSD_SLOTS).enumerate() {
    for (coord, value) in slot.bbox.iter().enumerate() {
      flat[coord * SSD_SLOTS + i] = *value;
    }
    flat[4 * SSD_SLOTS + i] = slot.class_id as f32;
    flat[5 * SSD_SLOTS + i] = slot.score;
  }
  flat[SSD_OUTPUT_SIZE - 1] = count;
  flat
}

fn quantized(
  id: u8,
  name: &str,
  dimensions: Vec<Dimension>,
  bits: u8,
  scale: f32,
) -> OutputTensorDescriptor {
  OutputTensorDescriptor {
    id,
    name: name.to_string(),
    dimensions,
    bits_per_element: bits,
    shift: 0,
    scale,
    format: ElementFormat::Unsigned,
  }
}

/// 与传感器上 MobileNet-SSD 相同的四个输出张量：
/// 检测框（传输时槽位在前）、类别、置信度、检测数量
pub fn mobilenet_ssd_outputs() -> Vec<OutputTensorDescriptor> {
  vec![
    quantized(
      0,
      "bboxes",
      vec![Dimension::new(0, SSD_SLOTS as u16, 1), Dimension::new(1, 4, 0)],
      16,
      1.0 / 4096.0,
    ),
    quantized(1, "classes", vec![Dimension::new(0, SSD_SLOTS as u16, 0)], 8, 1.0),
    quantized(2, "scores", vec![Dimension::new(0, SSD_SLOTS as u16, 0)], 8, 1.0 / 256.0),
    quantized(3, "num_detections", vec![Dimension::new(0, 1, 0)], 8, 1.0),
  ]
}

/// 按各张量元素数切分连续缓冲区
pub fn split_flat(flat: &[f32], descriptors: &[OutputTensorDescriptor]) -> Result<Vec<Vec<f32>>, FrameError> {
  let layout = plan_layout(descriptors)?;
  if layout.total_element_count as usize != flat.len() {
    return Err(FrameError::UnexpectedLayout {
      expected: layout.total_element_count as usize,
      actual: flat.len(),
    });
  }
  Ok((0..layout.tensor_count()).map(|i| flat[layout.range(i)].to_vec()).collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::decoder::dequantize;
  use proptest::prelude::*;

  fn desc(bits: u8, format: ElementFormat, shift: u16, scale: f32) -> OutputTensorDescriptor {
    OutputTensorDescriptor {
      id: 0,
      name: "q".to_string(),
      dimensions: vec![Dimension::new(0, 1, 0)],
      bits_per_element: bits,
      shift,
      scale,
      format,
    }
  }

  #[test]
  fn quantize_clamps_to_element_range() {
    let d = desc(8, ElementFormat::Unsigned, 0, 1.0);
    assert_eq!(quantize(300.0, &d), 255);
    assert_eq!(quantize(-3.0, &d), 0);
    let d = desc(8, ElementFormat::Signed, 0, 1.0);
    assert_eq!(quantize(-300.0, &d), -128);
  }

  #[test]
  fn ssd_flat_is_coordinate_major() {
    let slot = SsdSlot {
      class_id: 3,
      score: 0.75,
      bbox: [0.1, 0.2, 0.3, 0.4],
    };
    let flat = ssd_flat(&[slot, slot], 2.0);
    assert_eq!(flat.len(), SSD_OUTPUT_SIZE);
    assert_eq!(flat[1], 0.1);
    assert_eq!(flat[11], 0.2);
    assert_eq!(flat[21], 0.3);
    assert_eq!(flat[31], 0.4);
    assert_eq!(flat[41], 3.0);
    assert_eq!(flat[51], 0.75);
    assert_eq!(flat[60], 2.0);
  }

  #[test]
  fn schema_must_fit_in_first_line() {
    let network = NetworkEntry {
      id: 1,
      kind: "mobilenet_ssd".to_string(),
      outputs: mobilenet_ssd_outputs(),
    };
    let spec = FrameSpec {
      stride: 64,
      max_line_len: 64,
      network_id: 1,
      frame_count: 0,
    };
    let tensors = split_flat(&ssd_flat(&[], 0.0), &network.outputs).unwrap();
    assert!(matches!(
      encode_frame(&spec, &network, &tensors),
      Err(FrameError::InvalidHeader(_))
    ));
  }

  proptest! {
    #[test]
    fn quantization_round_trips(
      raw in -32768i32..=32767,
      shift in 0u16..64,
      wide in any::<bool>(),
      signed in any::<bool>(),
      exp in -8i32..=2,
    ) {
      let bits = if wide { 16 } else { 8 };
      let format = if signed { ElementFormat::Signed } else { ElementFormat::Unsigned };
      let (min, max) = match (bits, format) {
        (8, ElementFormat::Signed) => (-128, 127),
        (8, ElementFormat::Unsigned) => (0, 255),
        (_, ElementFormat::Signed) => (-32768, 32767),
        (_, ElementFormat::Unsigned) => (0, 65535),
      };
      let raw = raw.clamp(min, max);
      let scale = 2f32.powi(exp);
      let d = desc(bits, format, shift, scale);

      let value = dequantize(raw, shift, scale);
      prop_assert_eq!(quantize(value, &d), raw);
    }
  }
}
