// 该文件是 Shanan-IMX500 项目的一部分。
// src/frame.rs - 推理元数据帧定义
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

/// IMX500 默认的元数据行宽
pub const DEFAULT_STRIDE: usize = 4064;

/// 目标画面尺寸（像素），用于把归一化坐标还原为像素坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSize {
  pub width: u32,
  pub height: u32,
}

impl FrameSize {
  pub fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }
}

/// 一帧传感器输出的推理元数据
#[derive(Debug, Clone)]
pub struct TensorFrame {
  data: Box<[u8]>,
  stride: usize,
  size: FrameSize,
}

impl TensorFrame {
  pub fn new(data: Vec<u8>, stride: usize, size: FrameSize) -> Self {
    Self {
      data: data.into_boxed_slice(),
      stride,
      size,
    }
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn stride(&self) -> usize {
    self.stride
  }

  pub fn size(&self) -> FrameSize {
    self.size
  }

  /// 首行之后的张量主体
  pub fn body(&self) -> Option<&[u8]> {
    self.data.get(self.stride..)
  }
}
