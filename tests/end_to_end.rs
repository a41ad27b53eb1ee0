// 该文件是 Shanan-IMX500 项目的一部分。
// tests/end_to_end.rs - 从原始元数据到检测结果的完整流程
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

use shanan_imx500::{
  FrameError,
  cache::SchemaCache,
  config::{Labels, MobileNetConfig},
  frame::{FrameSize, TensorFrame},
  header::{FrameHeader, write_header},
  input::TensorFileInput,
  model::{MobileNetSsd, MobileNetSsdBuilder, Model, ssd::SsdParams},
  output::DirectoryRecordOutput,
  process_frame,
  schema::{
    Dimension, ElementFormat, OutputTensorDescriptor,
    writer::{NetworkEntry, encode_schema},
  },
  synth::{FrameSpec, SsdSlot, encode_frame, mobilenet_ssd_outputs, split_flat, ssd_flat},
  task::{ContinuousTask, Task},
};

const STRIDE: usize = 1024;
const MAX_LINE_LEN: u16 = 64;

/// 单个 61×1 的 8 位输出张量，量化系数 0.1
fn flat_network(id: u16) -> NetworkEntry {
  NetworkEntry {
    id,
    kind: "mobilenet_ssd".to_string(),
    outputs: vec![OutputTensorDescriptor {
      id: 0,
      name: "detections".to_string(),
      dimensions: vec![Dimension::new(0, 61, 0), Dimension::new(1, 1, 1)],
      bits_per_element: 8,
      shift: 0,
      scale: 0.1,
      format: ElementFormat::Unsigned,
    }],
  }
}

/// 帧头声明 `header_network`，AP 参数描述 `schema_network`
fn raw_frame(header_network: u16, schema_network: u16, valid: bool, body: &[u8]) -> Vec<u8> {
  let schema = encode_schema(&[flat_network(schema_network)]);
  let header = FrameHeader {
    valid,
    frame_count: 1,
    max_line_len: MAX_LINE_LEN,
    schema_byte_size: schema.len() as u16,
    network_id: header_network,
    tensor_format_tag: 0,
  };
  let mut raw = vec![0u8; STRIDE * 2];
  write_header(&mut raw[..STRIDE], &header, &schema, STRIDE).unwrap();
  raw[STRIDE..STRIDE + body.len()].copy_from_slice(body);
  raw
}

/// 十个检测全部为 0.9 分，检测数量为 10
fn ten_detections() -> Vec<u8> {
  let mut body = vec![0u8; 61];
  body[..10].fill(1); // y_min 0.1
  body[10..20].fill(2); // x_min 0.2
  body[20..30].fill(4); // y_max 0.4
  body[30..40].fill(6); // x_max 0.6
  body[40..50].fill(10); // class 1
  body[50..60].fill(9); // score 0.9
  body[60] = 100;
  body
}

fn params(max_detections: usize) -> SsdParams {
  SsdParams {
    max_detections,
    threshold: 0.3,
  }
}

fn frame(raw: Vec<u8>) -> TensorFrame {
  TensorFrame::new(raw, STRIDE, FrameSize::new(300, 300))
}

#[test]
fn ten_detections_above_threshold_are_all_reported() {
  let frame = frame(raw_frame(7, 7, true, &ten_detections()));
  let mut cache = SchemaCache::new();

  let set = process_frame(&frame, &params(10), &mut cache).unwrap();
  assert_eq!(set.count, 10);
  assert!(set.scores.iter().all(|s| (s - 0.9).abs() < 1e-5));
  assert!(set.class_indices.iter().all(|&c| c == 1));
  let b = &set.boxes[0];
  assert_eq!((b.x_min, b.y_min, b.x_max, b.y_max), (60, 30, 179, 120));
}

#[test]
fn max_detections_caps_the_result() {
  let frame = frame(raw_frame(7, 7, true, &ten_detections()));
  let mut cache = SchemaCache::new();

  let set = process_frame(&frame, &params(3), &mut cache).unwrap();
  assert_eq!(set.count, 3);
  assert_eq!(set.scores.len(), 3);
  assert_eq!(set.boxes.len(), 3);
}

#[test]
fn schema_is_parsed_once_per_network() {
  let frame = frame(raw_frame(7, 7, true, &ten_detections()));
  let mut cache = SchemaCache::new();

  for _ in 0..3 {
    process_frame(&frame, &params(10), &mut cache).unwrap();
  }
  assert_eq!(cache.len(), 1);
  assert_eq!(cache.hits(), 2);
}

#[test]
fn invalid_frame_is_rejected() {
  let frame = frame(raw_frame(7, 7, false, &ten_detections()));
  let mut cache = SchemaCache::new();

  assert!(matches!(
    process_frame(&frame, &params(10), &mut cache),
    Err(FrameError::InvalidHeader(_))
  ));
  assert!(cache.is_empty());
}

#[test]
fn unknown_network_surfaces_as_empty_output() {
  let frame = frame(raw_frame(8, 7, true, &ten_detections()));
  let mut cache = SchemaCache::new();

  assert_eq!(
    process_frame(&frame, &params(10), &mut cache).err(),
    Some(FrameError::EmptyOutput)
  );
}

#[test]
fn oversized_schema_in_a_small_frame_is_a_frame_error() {
  let mut network = flat_network(7);
  network.outputs[0].dimensions = vec![
    Dimension::new(0, 65535, 0),
    Dimension::new(1, 16000, 1),
  ];
  let schema = encode_schema(&[network]);
  let header = FrameHeader {
    valid: true,
    frame_count: 1,
    max_line_len: MAX_LINE_LEN,
    schema_byte_size: schema.len() as u16,
    network_id: 7,
    tensor_format_tag: 0,
  };
  let mut raw = vec![0u8; 2048];
  write_header(&mut raw[..STRIDE], &header, &schema, STRIDE).unwrap();
  let mut cache = SchemaCache::new();

  assert!(matches!(
    process_frame(&frame(raw), &params(10), &mut cache),
    Err(FrameError::InvalidHeader(_))
  ));
}

#[test]
fn truncated_body_is_an_error() {
  let mut raw = raw_frame(7, 7, true, &ten_detections());
  raw.truncate(STRIDE + 20);
  let mut cache = SchemaCache::new();

  assert!(process_frame(&frame(raw), &params(10), &mut cache).is_err());
}

fn mobilenet_frame(frame_count: u8, slots: &[SsdSlot], count: f32) -> Vec<u8> {
  let network = NetworkEntry {
    id: 7,
    kind: "mobilenet_ssd".to_string(),
    outputs: mobilenet_ssd_outputs(),
  };
  let tensors = split_flat(&ssd_flat(slots, count), &network.outputs).unwrap();
  let spec = FrameSpec {
    stride: STRIDE,
    max_line_len: 256,
    network_id: 7,
    frame_count,
  };
  encode_frame(&spec, &network, &tensors).unwrap()
}

fn slots() -> Vec<SsdSlot> {
  vec![
    SsdSlot {
      class_id: 1,
      score: 0.75,
      bbox: [0.25, 0.5, 0.75, 1.0],
    },
    SsdSlot {
      class_id: 2,
      score: 0.125,
      bbox: [0.0, 0.0, 0.5, 0.5],
    },
    SsdSlot {
      class_id: 3,
      score: 0.5,
      bbox: [0.0, 0.0, 0.5, 0.25],
    },
  ]
}

#[test]
fn four_tensor_mobilenet_frame_is_decoded_with_labels() {
  let raw = mobilenet_frame(1, &slots(), 3.0);
  let frame = TensorFrame::new(raw, STRIDE, FrameSize::new(641, 481));
  let labels = Labels::from_lines("background\nperson\nbicycle\ncar");
  let mut model = MobileNetSsd::new(params(10), labels);

  let result = model.infer(&frame).unwrap();
  assert_eq!(result.len(), 2);
  model.infer(&frame).unwrap();
  assert_eq!(model.cache().len(), 1);
  assert_eq!(model.cache().hits(), 1);

  let person = &result.items[0];
  assert_eq!(person.label, "person");
  assert_eq!(person.score, 0.75);
  // x = 0.5 * 640, y = 0.25 * 480, 宽 = (1.0 - 0.5) * 640, 高 = (0.75 - 0.25) * 480
  assert_eq!(person.bbox, [320, 120, 320, 240]);

  let car = &result.items[1];
  assert_eq!(car.label, "car");
  assert_eq!(car.bbox, [0, 0, 160, 240]);
}

#[test]
fn builder_reads_config_from_disk() {
  let dir = tempfile::tempdir().unwrap();
  std::fs::write(dir.path().join("labels.txt"), "background\nperson\n").unwrap();
  let path = dir.path().join("mobilenet.json");
  std::fs::write(
    &path,
    r#"{ "max_detections": 1, "threshold": 0.4, "class_file": "labels.txt" }"#,
  )
  .unwrap();

  let config = MobileNetConfig::from_file(&path).unwrap();
  let mut model = MobileNetSsdBuilder::with_config(config).build().unwrap();
  let raw = mobilenet_frame(1, &slots(), 3.0);
  let frame = TensorFrame::new(raw, STRIDE, FrameSize::new(641, 481));

  let result = model.infer(&frame).unwrap();
  assert_eq!(result.len(), 1);
  assert_eq!(result.items[0].label, "person");
}

#[test]
fn continuous_task_records_frames_from_a_file() {
  let dir = tempfile::tempdir().unwrap();
  let good = mobilenet_frame(1, &slots(), 3.0);
  let frame_size = good.len();
  let mut broken = mobilenet_frame(2, &slots(), 3.0);
  broken[0] = 0;
  let empty = mobilenet_frame(3, &[], 0.0);

  let input_path = dir.path().join("frames.bin");
  std::fs::write(&input_path, [good, broken, empty].concat()).unwrap();
  let records = dir.path().join("records");

  let input = TensorFileInput::open(
    &input_path,
    STRIDE,
    FrameSize::new(641, 481),
    Some(frame_size),
  )
  .unwrap();
  let model = MobileNetSsd::new(params(10), Labels::default());
  let output = DirectoryRecordOutput::new(&records, false, false);
  ContinuousTask::default().run_task(input, model, output).unwrap();

  // 只有第一帧有检测结果
  let mut stack = vec![records];
  let mut files = Vec::new();
  while let Some(p) = stack.pop() {
    for entry in std::fs::read_dir(&p).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        stack.push(path);
      } else {
        files.push(path);
      }
    }
  }
  assert_eq!(files.len(), 1);
  let value: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(&files[0]).unwrap()).unwrap();
  assert_eq!(value["items"].as_array().map(Vec::len), Some(2));
  assert_eq!(value["items"][0]["label"], "unknown");
}
