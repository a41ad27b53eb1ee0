// 该文件是 Shanan-IMX500 项目的一部分。
// src/cache.rs - AP 参数与输出布局缓存
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

use std::collections::HashMap;

use tracing::debug;

use crate::{
  error::FrameError,
  layout::{OutputLayout, plan_layout},
  schema::{OutputTensorDescriptor, parse_schema},
};

/// 某个网络解析后的输出描述与布局
#[derive(Debug, Clone)]
pub struct CachedNetwork {
  schema: Vec<u8>,
  pub descriptors: Vec<OutputTensorDescriptor>,
  pub layout: OutputLayout,
}

/// 以网络编号为键的缓存；AP 参数字节变化时重新解析
#[derive(Debug, Default)]
pub struct SchemaCache {
  entries: HashMap<u16, CachedNetwork>,
  hits: u64,
}

impl SchemaCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn hits(&self) -> u64 {
    self.hits
  }

  /// 取出缓存项，未命中时解析 AP 参数并规划布局；失败的结果不会被缓存
  pub fn get_or_parse(
    &mut self,
    network_id: u16,
    schema: &[u8],
  ) -> Result<&CachedNetwork, FrameError> {
    let fresh = self
      .entries
      .get(&network_id)
      .is_some_and(|entry| entry.schema == schema);

    if fresh {
      self.hits += 1;
    } else {
      debug!("解析网络 {} 的 AP 参数", network_id);
      let descriptors = parse_schema(schema, network_id)?;
      let layout = plan_layout(&descriptors)?;
      self.entries.insert(
        network_id,
        CachedNetwork {
          schema: schema.to_vec(),
          descriptors,
          layout,
        },
      );
    }

    self
      .entries
      .get(&network_id)
      .ok_or_else(|| FrameError::schema(format!("网络 {} 的缓存缺失", network_id)))
  }
}
