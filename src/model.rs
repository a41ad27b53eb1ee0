// 该文件是 Shanan-IMX500 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;

use crate::config::Labels;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u8,
  pub label: String,
  pub score: f32,
  // 像素坐标 [x, y, width, height]
  pub bbox: [u16; 4],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn from_detections(set: &ssd::DetectionSet, labels: &Labels) -> Self {
    let items = (0..set.count)
      .map(|i| {
        let b = &set.boxes[i];
        let class_id = set.class_indices[i];
        DetectItem {
          class_id,
          label: labels.name(class_id).to_string(),
          score: set.scores[i],
          bbox: [
            b.x_min,
            b.y_min,
            b.x_max.saturating_sub(b.x_min),
            b.y_max.saturating_sub(b.y_min),
          ],
        }
      })
      .collect::<Vec<_>>();

    DetectResult {
      items: items.into_boxed_slice(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

pub mod ssd;

mod mobilenet;
pub use self::mobilenet::{MobileNetSsd, MobileNetSsdBuilder, MobileNetSsdError};
