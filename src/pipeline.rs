// 该文件是 Shanan-IMX500 项目的一部分。
// src/pipeline.rs - 单帧处理流程
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

use crate::{
  cache::SchemaCache,
  decoder::decode_all,
  error::FrameError,
  frame::TensorFrame,
  header::parse_header,
  model::ssd::{DetectionSet, SsdParams, interpret},
};

/// 帧头 → AP 参数 → 布局 → 主体解码 → SSD 解析
///
/// 除 `cache` 外，所有中间状态都只属于本次调用。
pub fn process_frame(
  frame: &TensorFrame,
  params: &SsdParams,
  cache: &mut SchemaCache,
) -> Result<DetectionSet, FrameError> {
  let stride = frame.stride();
  let (header, schema) = parse_header(frame.data(), stride).inspect_err(|e| {
    error!("帧头解析失败: {}", e);
  })?;

  if header.max_line_len == 0 {
    error!("帧头中的 maxLineLen 为 0");
    return Err(FrameError::header("maxLineLen 为 0"));
  }

  let network = cache
    .get_or_parse(header.network_id, &schema)
    .inspect_err(|e| error!("AP 参数解析失败: {}", e))?;

  let body = frame
    .body()
    .ok_or_else(|| FrameError::header("帧数据不足一行"))?;
  let flat = decode_all(
    &network.descriptors,
    &network.layout,
    body,
    stride,
    header.max_line_len,
  )
  .inspect_err(|e| error!("输出张量主体解析失败: {}", e))?;
  debug!("第 {} 帧解码完成, {} 个元素", header.frame_count, flat.len());

  interpret(&flat, params, frame.size())
}
