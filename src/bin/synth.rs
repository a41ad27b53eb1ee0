// 该文件是 Shanan-IMX500 项目的一部分。
// src/bin/synth.rs - 生成合成的 MobileNet-SSD 推理元数据帧
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

use std::{io::Write, path::PathBuf, str::FromStr};

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;

use shanan_imx500::{
  frame::DEFAULT_STRIDE,
  schema::writer::NetworkEntry,
  synth::{FrameSpec, SsdSlot, encode_frame, mobilenet_ssd_outputs, split_flat, ssd_flat},
};

/// `class,score,y_min,x_min,y_max,x_max`，坐标为归一化值
#[derive(Debug, Clone)]
struct Detection(SsdSlot);

impl FromStr for Detection {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> Result<Self> {
    let fields = s.split(',').map(str::trim).collect::<Vec<_>>();
    if fields.len() != 6 {
      return Err(anyhow!("需要 6 个字段: class,score,y_min,x_min,y_max,x_max"));
    }
    let class_id = fields[0].parse()?;
    let score = fields[1].parse()?;
    let mut bbox = [0.0f32; 4];
    for (v, f) in bbox.iter_mut().zip(&fields[2..]) {
      *v = f.parse()?;
    }
    Ok(Detection(SsdSlot {
      class_id,
      score,
      bbox,
    }))
  }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// 输出文件，多帧时依次追加
  #[arg(long, value_name = "FILE")]
  output: PathBuf,
  /// 检测结果，可重复
  #[arg(long = "detection", value_name = "DETECTION")]
  detections: Vec<Detection>,
  /// 写入的检测数量，缺省为检测结果个数
  #[arg(long)]
  count: Option<f32>,
  #[arg(long, default_value_t = DEFAULT_STRIDE)]
  stride: usize,
  #[arg(long, default_value_t = 2560)]
  max_line_len: u16,
  #[arg(long, default_value_t = 7)]
  network_id: u16,
  /// 生成的帧数
  #[arg(long, default_value_t = 1)]
  frames: u8,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let slots = args.detections.iter().map(|d| d.0).collect::<Vec<_>>();
  let count = args.count.unwrap_or(slots.len() as f32);

  let network = NetworkEntry {
    id: args.network_id,
    kind: "mobilenet_ssd".to_string(),
    outputs: mobilenet_ssd_outputs(),
  };
  let tensors = split_flat(&ssd_flat(&slots, count), &network.outputs)?;

  let mut file = std::fs::File::create(&args.output)?;
  let mut frame_size = 0;
  for frame_count in 0..args.frames {
    let spec = FrameSpec {
      stride: args.stride,
      max_line_len: args.max_line_len,
      network_id: args.network_id,
      frame_count,
    };
    let frame = encode_frame(&spec, &network, &tensors)?;
    frame_size = frame.len();
    file.write_all(&frame)?;
  }

  info!(
    "已写入 {} 帧到 {}, 每帧 {} 字节",
    args.frames,
    args.output.display(),
    frame_size
  );
  info!(
    "读取: tensor://{}?stride={}&frame_size={}",
    args.output.display(),
    args.stride,
    frame_size
  );

  Ok(())
}
