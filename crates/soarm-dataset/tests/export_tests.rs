//! 数据集导出测试
//!
//! 从遥操作录制到 LeRobot 文件的完整流程。

use arrow::array::{Array, AsArray};
use arrow::datatypes::{Float32Type, Int64Type};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value;
use soarm_client::{DirectTeleoperator, RobotProfile, Teleoperator};
use soarm_dataset::{
    Credentials, DOF, DatasetExporter, DatasetFile, DatasetRecorder, DirectoryPublisher, Episode,
    Frame, JointFeature, Publisher, RecordedDataset, RecorderConfig, to_zip,
};
use soarm_driver::{BusTiming, MotorBus, shared};
use soarm_serial::mock::SimulatedBus;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn features(profile: &RobotProfile) -> Vec<JointFeature> {
    profile
        .joints
        .iter()
        .map(|j| JointFeature::new(j.name, j.norm_mode))
        .collect()
}

fn read_parquet(file: &DatasetFile) -> RecordBatch {
    let reader = ParquetRecordBatchReaderBuilder::try_new(file.bytes.clone())
        .unwrap()
        .build()
        .unwrap();
    let batches: Vec<RecordBatch> = reader.map(|b| b.unwrap()).collect();
    assert_eq!(batches.len(), 1, "{}", file.path);
    batches.into_iter().next().unwrap()
}

fn find<'a>(files: &'a [DatasetFile], path: &str) -> &'a DatasetFile {
    files
        .iter()
        .find(|f| f.path == path)
        .unwrap_or_else(|| panic!("missing {path}"))
}

fn frame(t: f64, value: f32, episode_index: usize) -> Frame {
    Frame {
        timestamp: t,
        action: [value; DOF],
        observation_state: [value; DOF],
        episode_index,
        task_index: 0,
    }
}

fn dataset(episodes: Vec<Episode>) -> RecordedDataset {
    RecordedDataset {
        robot_type: "so100_follower".to_string(),
        joint_names: RobotProfile::so100().names().iter().map(|n| n.to_string()).collect(),
        cameras: Vec::new(),
        tasks: vec!["teleoperation".to_string()],
        episodes,
        videos: Vec::new(),
    }
}

#[test]
fn test_resampled_midpoint_in_parquet() {
    let mut episode = Episode::new(0);
    episode.push(frame(0.0, 0.0, 0)).unwrap();
    episode.push(frame(1.0, 10.0, 0)).unwrap();

    let files = DatasetExporter::new(dataset(vec![episode])).files(2).unwrap();
    let batch = read_parquet(find(&files, "data/chunk-000/episode_000000.parquet"));
    assert_eq!(batch.num_rows(), 2);

    let timestamps = batch.column_by_name("timestamp").unwrap().as_primitive::<Float32Type>();
    assert_eq!(timestamps.value(1), 0.5);

    let state = batch.column_by_name("observation.state").unwrap().as_fixed_size_list();
    let second = state.value(1);
    let second = second.as_primitive::<Float32Type>();
    assert_eq!(second.len(), DOF);
    assert_eq!(second.value(0), 5.0);
}

#[test]
fn test_empty_episodes_skipped_and_indices_continuous() {
    let mut first = Episode::new(0);
    first.push(frame(0.0, 1.0, 0)).unwrap();
    first.set_start_time(0.0);
    first.set_end_time(1.0);

    let empty = Episode::new(1);

    let mut third = Episode::new(2);
    third.push(frame(0.0, 2.0, 2)).unwrap();
    third.set_start_time(0.0);
    third.set_end_time(0.5);

    let files = DatasetExporter::new(dataset(vec![first, empty, third])).files(10).unwrap();
    assert!(files.iter().all(|f| f.path != "data/chunk-000/episode_000002.parquet"));

    let second = read_parquet(find(&files, "data/chunk-000/episode_000001.parquet"));
    let episode_index = second.column_by_name("episode_index").unwrap().as_primitive::<Int64Type>();
    assert!(episode_index.values().iter().all(|v| *v == 1));
    let index = second.column_by_name("index").unwrap().as_primitive::<Int64Type>();
    assert_eq!(index.value(0), 10);
    assert_eq!(index.value(4), 14);

    let episodes = read_parquet(find(&files, "meta/episodes/chunk-000/file-000.parquet"));
    assert_eq!(episodes.num_rows(), 2);
    let to = episodes.column_by_name("dataset_to_index").unwrap().as_primitive::<Int64Type>();
    assert_eq!(to.values().to_vec(), vec![10, 15]);
    assert!(episodes.column_by_name("stats/action/mean").is_some());

    let info: Value = serde_json::from_slice(&find(&files, "meta/info.json").bytes).unwrap();
    assert_eq!(info["total_episodes"], 2);
    assert_eq!(info["total_frames"], 15);
    assert_eq!(info["splits"]["train"], "0:2");
}

#[test]
fn test_record_teleoperation_and_export() {
    let profile = RobotProfile::so100();
    let sim = SimulatedBus::new(&profile.ids());
    let bus = shared(MotorBus::new(sim.clone()).with_timing(BusTiming::immediate()));
    let teleop = DirectTeleoperator::new(bus, profile.motor_configs(4096));
    teleop.start().unwrap();

    let recorder = Arc::new(DatasetRecorder::new(
        features(&profile),
        &teleop.motor_configs(),
        RecorderConfig {
            robot_type: profile.robot_type.clone(),
            task: "wave".to_string(),
        },
    ));
    recorder.register_camera("front").unwrap();
    teleop.on_change(recorder.clone());

    recorder.start().unwrap();
    recorder.begin_capture("front").unwrap();
    for step in 1..=5 {
        teleop.move_motor("gripper", 2047 + step * 100).unwrap();
        thread::sleep(Duration::from_millis(20));
    }
    recorder.stop().unwrap();
    teleop.stop();
    recorder.finish_capture("front", vec![0u8; 64], "mp4").unwrap();

    // 停止后的移动不再录制
    teleop.start().unwrap();
    teleop.move_motor("gripper", 1000).unwrap();
    assert_eq!(recorder.frame_count(), 5);

    let files = DatasetExporter::new(recorder.snapshot().unwrap()).files(30).unwrap();
    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    for expected in [
        "data/chunk-000/episode_000000.parquet",
        "meta/info.json",
        "meta/stats.json",
        "meta/tasks.parquet",
        "meta/episodes/chunk-000/file-000.parquet",
        "videos/chunk-000/observation.images.front/episode_000000.mp4",
        "README.md",
    ] {
        assert!(paths.contains(&expected), "missing {expected}");
    }

    let data = read_parquet(find(&files, "data/chunk-000/episode_000000.parquet"));
    assert!(data.num_rows() >= 3);
    // 夹爪单调张开
    let state = data.column_by_name("observation.state").unwrap().as_fixed_size_list();
    let values = state.values().as_primitive::<Float32Type>();
    let gripper: Vec<f32> = (0..data.num_rows()).map(|r| values.value(r * DOF + 5)).collect();
    assert!(gripper.windows(2).all(|w| w[0] <= w[1]));

    let info: Value = serde_json::from_slice(&find(&files, "meta/info.json").bytes).unwrap();
    assert_eq!(info["robot_type"], "so100_follower");
    assert_eq!(info["fps"], 30);
    assert_eq!(info["features"]["action"]["shape"][0], 6);
    assert_eq!(info["features"]["action"]["names"][5], "gripper.pos");
    assert_eq!(info["features"]["observation.images.front"]["dtype"], "video");

    let stats: Value = serde_json::from_slice(&find(&files, "meta/stats.json").bytes).unwrap();
    assert_eq!(stats["observation.state"]["max"].as_array().unwrap().len(), DOF);

    let tasks = read_parquet(find(&files, "meta/tasks.parquet"));
    assert_eq!(tasks.column_by_name("description").unwrap().as_string::<i32>().value(0), "wave");

    let readme = String::from_utf8(find(&files, "README.md").bytes.to_vec()).unwrap();
    assert!(readme.contains("so100_follower"));

    // ZIP 与目录发布
    let archive = to_zip(&files).unwrap();
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut info_json = String::new();
    zip.by_name("meta/info.json").unwrap().read_to_string(&mut info_json).unwrap();
    assert_eq!(serde_json::from_str::<Value>(&info_json).unwrap(), info);

    let dir = tempfile::tempdir().unwrap();
    let handle = DirectoryPublisher::new(dir.path())
        .publish(files.clone(), &Credentials::default(), "local/so100_wave")
        .unwrap();
    let summary = handle.wait().unwrap();
    assert_eq!(summary.files, files.len());
    assert_eq!(
        Bytes::from(std::fs::read(dir.path().join("local/so100_wave/meta/info.json")).unwrap()),
        find(&files, "meta/info.json").bytes
    );
}
