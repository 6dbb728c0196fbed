//! `meta/info.json` 与 README

use super::{CHUNK_SIZE, CODEBASE_VERSION, ExportEpisode};
use crate::error::DatasetError;
use crate::frame::DOF;
use crate::recorder::RecordedDataset;
use crate::video::feature_key;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;

const MB: f64 = 1024.0 * 1024.0;

/// 特征描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub names: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

impl FeatureInfo {
    fn scalar(dtype: &str) -> Self {
        Self {
            dtype: dtype.to_string(),
            shape: vec![1],
            names: None,
            info: None,
        }
    }
}

/// `meta/info.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub codebase_version: String,
    pub robot_type: String,
    pub total_episodes: usize,
    pub total_frames: usize,
    pub total_tasks: usize,
    pub total_videos: usize,
    pub chunks_size: usize,
    /// 数据文件总大小（MB，近似）
    pub data_files_size_in_mb: f64,
    /// 视频文件总大小（MB，近似）
    pub video_files_size_in_mb: f64,
    pub fps: u32,
    pub splits: BTreeMap<String, String>,
    pub data_path: String,
    pub video_path: Option<String>,
    pub features: BTreeMap<String, FeatureInfo>,
}

impl DatasetInfo {
    pub(crate) fn build(
        dataset: &RecordedDataset,
        episodes: &[ExportEpisode],
        total_frames: usize,
        fps: u32,
        data_bytes: usize,
        video_bytes: usize,
    ) -> Self {
        let joint_names: Vec<String> =
            dataset.joint_names.iter().map(|n| format!("{n}.pos")).collect();

        let mut features = BTreeMap::new();
        for key in ["action", "observation.state"] {
            features.insert(
                key.to_string(),
                FeatureInfo {
                    dtype: "float32".to_string(),
                    shape: vec![DOF],
                    names: Some(json!(joint_names)),
                    info: None,
                },
            );
        }
        features.insert("timestamp".to_string(), FeatureInfo::scalar("float32"));
        for key in ["frame_index", "episode_index", "index", "task_index"] {
            features.insert(key.to_string(), FeatureInfo::scalar("int64"));
        }

        for camera in &dataset.cameras {
            let container = episodes
                .iter()
                .flat_map(|e| e.videos.iter())
                .find(|v| &v.camera == camera)
                .map(|v| v.container.clone());
            features.insert(
                feature_key(camera),
                FeatureInfo {
                    dtype: "video".to_string(),
                    shape: Vec::new(),
                    names: Some(json!(["height", "width", "channels"])),
                    info: Some(json!({
                        "video.fps": fps,
                        "video.container": container,
                    })),
                },
            );
        }

        let mut splits = BTreeMap::new();
        splits.insert("train".to_string(), format!("0:{}", episodes.len()));

        let total_videos = episodes.iter().map(|e| e.videos.len()).sum();
        Self {
            codebase_version: CODEBASE_VERSION.to_string(),
            robot_type: dataset.robot_type.clone(),
            total_episodes: episodes.len(),
            total_frames,
            total_tasks: dataset.tasks.len(),
            total_videos,
            chunks_size: CHUNK_SIZE,
            data_files_size_in_mb: data_bytes as f64 / MB,
            video_files_size_in_mb: video_bytes as f64 / MB,
            fps,
            splits,
            data_path: "data/chunk-{episode_chunk:03d}/episode_{episode_index:06d}.parquet"
                .to_string(),
            video_path: (!dataset.cameras.is_empty()).then(|| {
                "videos/chunk-{episode_chunk:03d}/{video_key}/episode_{episode_index:06d}.{container}"
                    .to_string()
            }),
            features,
        }
    }
}

/// 数据集卡片
pub(crate) fn readme(info: &DatasetInfo) -> Result<String, DatasetError> {
    let features: String = info
        .features
        .iter()
        .map(|(name, f)| format!("- `{}`: {} {:?}\n", name, f.dtype, f.shape))
        .collect();

    Ok(format!(
        "---
license: apache-2.0
task_categories:
- robotics
tags:
- LeRobot
- {robot}
---

# {robot} teleoperation dataset

Recorded with soarm keyboard teleoperation, exported in LeRobot {version} format.

| | |
|---|---|
| Robot | `{robot}` |
| FPS | {fps} |
| Episodes | {episodes} |
| Frames | {frames} |
| Tasks | {tasks} |
| Videos | {videos} |

## Features

{features}
## meta/info.json

```json
{info_json}
```
",
        robot = info.robot_type,
        version = info.codebase_version,
        fps = info.fps,
        episodes = info.total_episodes,
        frames = info.total_frames,
        tasks = info.total_tasks,
        videos = info.total_videos,
        info_json = serde_json::to_string_pretty(info)?,
    ))
}
