// 该文件是 Shanan-IMX500 项目的一部分。
// src/model/ssd.rs - MobileNet-SSD 输出解析
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

use tracing::{debug, error, warn};

use crate::{error::FrameError, frame::FrameSize};

/// SSDMobilenetV1 固定的检测槽位数
pub const SSD_SLOTS: usize = 10;
/// bbox(10*4) + class(10) + scores(10) + numDetections(1)
pub const SSD_OUTPUT_SIZE: usize = 61;

const CLASS_OFFSET: usize = 4 * SSD_SLOTS;
const SCORE_OFFSET: usize = 5 * SSD_SLOTS;
const COUNT_OFFSET: usize = 6 * SSD_SLOTS;

/// 检测过滤参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsdParams {
  pub max_detections: usize,
  pub threshold: f32,
}

/// 像素坐标下的检测框
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetectionBox {
  pub x_min: u16,
  pub y_min: u16,
  pub x_max: u16,
  pub y_max: u16,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionSet {
  pub count: usize,
  pub boxes: Vec<DetectionBox>,
  pub scores: Vec<f32>,
  pub class_indices: Vec<u8>,
}

impl DetectionSet {
  pub fn is_empty(&self) -> bool {
    self.count == 0
  }
}

fn denormalize(value: f32, dimension: u32) -> u16 {
  (value * dimension.saturating_sub(1) as f32).round() as u16
}

/// 把 61 个元素的连续缓冲区解释为 SSD 检测结果
pub fn interpret(
  flat: &[f32],
  params: &SsdParams,
  size: FrameSize,
) -> Result<DetectionSet, FrameError> {
  if flat.len() != SSD_OUTPUT_SIZE {
    error!("输出大小无效: {}", flat.len());
    return Err(FrameError::UnexpectedLayout {
      expected: SSD_OUTPUT_SIZE,
      actual: flat.len(),
    });
  }

  let raw_count = flat[COUNT_OFFSET];
  let mut count = raw_count as u32 as usize;
  if count > SSD_SLOTS {
    warn!("检测数量异常: {}, 截断为 {}", raw_count, SSD_SLOTS);
    count = SSD_SLOTS;
  }

  let mut set = DetectionSet::default();
  for i in 0..count {
    let score = flat[SCORE_OFFSET + i];
    if score < params.threshold {
      continue;
    }

    let y_min = flat[i];
    let x_min = flat[SSD_SLOTS + i];
    let y_max = flat[2 * SSD_SLOTS + i];
    let x_max = flat[3 * SSD_SLOTS + i];

    set.scores.push(score);
    set.boxes.push(DetectionBox {
      x_min: denormalize(x_min, size.width),
      y_min: denormalize(y_min, size.height),
      x_max: denormalize(x_max, size.width),
      y_max: denormalize(y_max, size.height),
    });
    set.class_indices.push(flat[CLASS_OFFSET + i] as u8);
  }

  if set.scores.len() > params.max_detections {
    set.boxes.truncate(params.max_detections);
    set.scores.truncate(params.max_detections);
    set.class_indices.truncate(params.max_detections);
  }
  set.count = set.scores.len();

  debug!("检测数量: {}", set.count);
  for i in 0..set.count {
    let b = &set.boxes[i];
    debug!(
      "[{}] = [{}, {}, {}, {}], score {}, class {}",
      i, b.x_min, b.x_max, b.y_min, b.y_max, set.scores[i], set.class_indices[i]
    );
  }

  Ok(set)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::synth::{SsdSlot, ssd_flat};

  const SIZE: FrameSize = FrameSize {
    width: 641,
    height: 481,
  };

  fn params(max_detections: usize, threshold: f32) -> SsdParams {
    SsdParams {
      max_detections,
      threshold,
    }
  }

  fn slot(class_id: u8, score: f32) -> SsdSlot {
    SsdSlot {
      class_id,
      score,
      bbox: [0.25, 0.5, 0.75, 1.0],
    }
  }

  #[test]
  fn wrong_length_is_rejected() {
    let result = interpret(&[0.0; 60], &params(10, 0.3), SIZE);
    assert_eq!(
      result,
      Err(FrameError::UnexpectedLayout {
        expected: 61,
        actual: 60
      })
    );
  }

  #[test]
  fn boxes_are_denormalized_per_axis() {
    let flat = ssd_flat(&[slot(7, 0.9)], 1.0);
    let set = interpret(&flat, &params(10, 0.3), SIZE).unwrap();
    assert_eq!(set.count, 1);
    assert_eq!(
      set.boxes[0],
      DetectionBox {
        x_min: 320,
        y_min: 120,
        x_max: 640,
        y_max: 360,
      }
    );
    assert_eq!(set.class_indices, vec![7]);
  }

  #[test]
  fn score_equal_to_threshold_is_kept() {
    let flat = ssd_flat(&[slot(1, 0.5), slot(2, 0.49)], 2.0);
    let set = interpret(&flat, &params(10, 0.5), SIZE).unwrap();
    assert_eq!(set.count, 1);
    assert_eq!(set.scores, vec![0.5]);
    assert_eq!(set.class_indices, vec![1]);
  }

  #[test]
  fn raw_count_is_clamped_to_slot_capacity() {
    let slots: Vec<_> = (0..10).map(|i| slot(i, 0.8)).collect();
    let flat = ssd_flat(&slots, 255.0);
    let set = interpret(&flat, &params(100, 0.3), SIZE).unwrap();
    assert_eq!(set.count, 10);
  }

  #[test]
  fn only_reported_slots_are_considered() {
    let slots: Vec<_> = (0..10).map(|i| slot(i, 0.8)).collect();
    let flat = ssd_flat(&slots, 3.0);
    let set = interpret(&flat, &params(100, 0.3), SIZE).unwrap();
    assert_eq!(set.class_indices, vec![0, 1, 2]);
  }

  #[test]
  fn truncation_keeps_slot_order() {
    let slots = [slot(0, 0.4), slot(1, 0.1), slot(2, 0.95), slot(3, 0.99)];
    let flat = ssd_flat(&slots, 4.0);
    let set = interpret(&flat, &params(2, 0.3), SIZE).unwrap();
    assert_eq!(set.count, 2);
    assert_eq!(set.class_indices, vec![0, 2]);
    assert_eq!(set.scores, vec![0.4, 0.95]);
  }

  #[test]
  fn negative_count_yields_nothing() {
    let flat = ssd_flat(&[slot(0, 0.9)], -1.0);
    let set = interpret(&flat, &params(10, 0.3), SIZE).unwrap();
    assert!(set.is_empty());
  }
}
