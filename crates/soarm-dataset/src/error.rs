//! 数据集错误类型

use thiserror::Error;

/// 数据集层错误
#[derive(Error, Debug)]
pub enum DatasetError {
    /// 当前录制状态不允许该操作
    #[error("Invalid recording state: {0}")]
    RecordingState(String),

    /// 帧时间戳倒退
    ///
    /// 录制线程遇到此错误会直接 panic：继续录制只会产出无法重采样的数据。
    #[error("Frame timestamp {next}s precedes previous frame at {previous}s")]
    TemporalInvariantViolation { previous: f64, next: f64 },

    #[error("Unknown camera: {0}")]
    UnknownCamera(String),

    /// 导出路径非法（绝对路径或包含 `..`）
    #[error("Invalid dataset path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Publish failed: {0}")]
    Publish(String),
}
