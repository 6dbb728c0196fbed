//! LeRobot 数据集导出
//!
//! 把录制结果重采样为固定帧率，生成 LeRobot 目录布局下的全部文件：
//!
//! ```text
//! data/chunk-000/episode_000000.parquet
//! meta/info.json
//! meta/stats.json
//! meta/tasks.parquet
//! meta/episodes/chunk-000/file-000.parquet
//! videos/chunk-000/observation.images.{camera}/episode_000000.{container}
//! README.md
//! ```
//!
//! 文件先在内存中生成（`DatasetFile`），再写入目录、打包 ZIP 或交给发布器。

mod archive;
mod meta;
mod parquet_io;
mod publish;

pub use archive::{to_zip, write_to_dir};
pub use publish::{
    Credentials, DirectoryPublisher, PublishHandle, PublishProgress, PublishSummary, Publisher,
};

use crate::error::DatasetError;
use crate::frame::IndexedFrame;
use crate::interpolate::interpolated_regular_episode;
use crate::recorder::RecordedDataset;
use crate::stats::compute_stats;
use crate::video::VideoSegment;
use bytes::Bytes;
use tracing::{info, warn};

/// 数据集格式版本
pub const CODEBASE_VERSION: &str = "v3.0";

/// 每个 chunk 最多容纳的片段数
pub const CHUNK_SIZE: usize = 1000;

/// 内存中的数据集文件
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetFile {
    /// 相对数据集根目录的路径，使用 `/` 分隔
    pub path: String,
    pub bytes: Bytes,
}

impl DatasetFile {
    pub fn new(path: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 重采样后的片段
#[derive(Debug, Clone)]
pub(crate) struct ExportEpisode {
    /// 导出后的片段序号（跳过空片段后重新编号）
    pub index: usize,
    pub frames: Vec<IndexedFrame>,
    pub tasks: Vec<String>,
    pub videos: Vec<VideoSegment>,
}

impl ExportEpisode {
    pub fn chunk(&self) -> usize {
        self.index / CHUNK_SIZE
    }

    pub fn data_path(&self) -> String {
        format!(
            "data/chunk-{:03}/episode_{:06}.parquet",
            self.chunk(),
            self.index
        )
    }

    pub fn video_path(&self, video: &VideoSegment) -> String {
        format!(
            "videos/chunk-{:03}/{}/episode_{:06}.{}",
            self.chunk(),
            video.feature_key(),
            self.index,
            video.container
        )
    }

    /// 片段时长（秒）
    pub fn duration(&self, fps: u32) -> f64 {
        self.frames.len() as f64 / f64::from(fps)
    }
}

/// 数据集导出器
pub struct DatasetExporter {
    dataset: RecordedDataset,
}

impl DatasetExporter {
    pub fn new(dataset: RecordedDataset) -> Self {
        Self { dataset }
    }

    pub fn dataset(&self) -> &RecordedDataset {
        &self.dataset
    }

    /// 重采样所有非空片段，全局序号连续
    pub(crate) fn resample(&self, fps: u32) -> Result<Vec<ExportEpisode>, DatasetError> {
        if fps == 0 {
            return Err(DatasetError::RecordingState("fps must be positive".to_string()));
        }

        let mut out = Vec::new();
        let mut next_index = 0;

        for episode in &self.dataset.episodes {
            if episode.is_empty() {
                warn!("Skipping empty episode {}", episode.index());
                continue;
            }

            let index = out.len();
            let mut frames = interpolated_regular_episode(episode, fps, next_index)?;
            for f in &mut frames {
                f.frame.episode_index = index;
            }
            next_index += frames.len();

            let mut task_indices: Vec<usize> =
                episode.frames().iter().map(|f| f.task_index).collect();
            task_indices.sort_unstable();
            task_indices.dedup();
            let tasks = task_indices
                .into_iter()
                .filter_map(|i| self.dataset.tasks.get(i).cloned())
                .collect();

            let videos = self
                .dataset
                .videos
                .iter()
                .filter(|v| v.episode_index == episode.index())
                .cloned()
                .collect();

            out.push(ExportEpisode {
                index,
                frames,
                tasks,
                videos,
            });
        }

        let orphaned = self
            .dataset
            .videos
            .iter()
            .filter(|v| {
                self.dataset
                    .episodes
                    .iter()
                    .all(|e| e.index() != v.episode_index || e.is_empty())
            })
            .count();
        if orphaned > 0 {
            warn!("Dropping {} videos of empty episodes", orphaned);
        }

        Ok(out)
    }

    /// 生成全部数据集文件
    pub fn files(&self, fps: u32) -> Result<Vec<DatasetFile>, DatasetError> {
        let episodes = self.resample(fps)?;
        let all_frames: Vec<IndexedFrame> =
            episodes.iter().flat_map(|e| e.frames.iter().copied()).collect();

        let mut files = Vec::new();
        for episode in &episodes {
            files.push(DatasetFile::new(
                episode.data_path(),
                parquet_io::episode_parquet(&episode.frames)?,
            ));
        }
        for episode in &episodes {
            for video in &episode.videos {
                files.push(DatasetFile::new(
                    episode.video_path(video),
                    video.data.clone(),
                ));
            }
        }

        let stats = compute_stats(&all_frames);
        files.push(DatasetFile::new(
            "meta/tasks.parquet",
            parquet_io::tasks_parquet(&self.dataset.tasks)?,
        ));
        files.push(DatasetFile::new(
            "meta/episodes/chunk-000/file-000.parquet",
            parquet_io::episodes_parquet(&episodes, &self.dataset.cameras, fps)?,
        ));
        files.push(DatasetFile::new(
            "meta/stats.json",
            serde_json::to_vec_pretty(&stats)?,
        ));

        // info.json 需要知道其余文件的大小
        let data_bytes: usize = files
            .iter()
            .filter(|f| f.path.starts_with("data/"))
            .map(DatasetFile::len)
            .sum();
        let video_bytes: usize = files
            .iter()
            .filter(|f| f.path.starts_with("videos/"))
            .map(DatasetFile::len)
            .sum();

        let info = meta::DatasetInfo::build(
            &self.dataset,
            &episodes,
            all_frames.len(),
            fps,
            data_bytes,
            video_bytes,
        );
        files.push(DatasetFile::new(
            "meta/info.json",
            serde_json::to_vec_pretty(&info)?,
        ));
        files.push(DatasetFile::new("README.md", meta::readme(&info)?));

        info!(
            "Exported {} episodes, {} frames at {} fps ({} files)",
            episodes.len(),
            all_frames.len(),
            fps,
            files.len()
        );
        Ok(files)
    }
}

