//! 数据集模块
//!
//! 把遥操作过程录制为 LeRobot 格式的数据集：
//! - `DatasetRecorder` 作为电机变更回调，把事件转换为帧
//! - 导出前按固定帧率重采样（线性插值）
//! - 生成 Parquet / JSON 元数据 / README，写入目录、打包 ZIP 或发布
//!
//! # 示例
//!
//! ```no_run
//! use soarm_dataset::{DatasetExporter, DatasetRecorder, JointFeature, RecorderConfig};
//! use soarm_protocol::NormMode;
//! use std::sync::Arc;
//!
//! let features = vec![JointFeature::new("gripper", NormMode::Range0To100)];
//! let recorder = Arc::new(DatasetRecorder::new(features, &[], RecorderConfig::default()));
//! recorder.start()?;
//! // ... teleop.on_change(recorder.clone()) ...
//! recorder.stop()?;
//!
//! let files = DatasetExporter::new(recorder.snapshot()?).files(30)?;
//! let archive = soarm_dataset::to_zip(&files)?;
//! # Ok::<(), soarm_dataset::DatasetError>(())
//! ```

pub mod error;
pub mod export;
pub mod frame;
pub mod interpolate;
pub mod recorder;
pub mod stats;
pub mod video;

pub use error::DatasetError;
pub use export::{
    Credentials, DatasetExporter, DatasetFile, DirectoryPublisher, PublishHandle,
    PublishProgress, PublishSummary, Publisher, to_zip, write_to_dir,
};
pub use frame::{DOF, Episode, Frame, IndexedFrame, JointVector};
pub use interpolate::{frame_at, interpolate, interpolated_regular_episode};
pub use recorder::{DatasetRecorder, JointFeature, RecordedDataset, RecorderConfig};
pub use stats::{FeatureStats, StatsAccumulator, compute_stats};
pub use video::VideoSegment;
