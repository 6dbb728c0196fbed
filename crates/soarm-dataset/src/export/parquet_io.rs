//! Parquet 编码
//!
//! 每个文件只含一个 RecordBatch；schema 由列数组推导。

use super::ExportEpisode;
use crate::error::DatasetError;
use crate::frame::{DOF, IndexedFrame, JointVector};
use crate::stats::{NUMERIC_FEATURES, compute_stats};
use crate::video::feature_key;
use arrow::array::{
    ArrayRef, FixedSizeListArray, Float32Array, Float64Array, Float64Builder, Int64Array,
    ListBuilder, StringArray, StringBuilder,
};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

type Columns = Vec<(String, ArrayRef)>;

fn write_batch(columns: Columns) -> Result<Vec<u8>, DatasetError> {
    let batch = RecordBatch::try_from_iter(columns)?;
    let props = WriterProperties::builder()
        .set_created_by(format!("soarm-dataset {}", env!("CARGO_PKG_VERSION")))
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buf)
}

fn int64_column(values: impl Iterator<Item = usize>) -> ArrayRef {
    Arc::new(Int64Array::from_iter_values(values.map(|v| v as i64)))
}

/// 定长 `float32` 向量列
fn vector_column(rows: impl Iterator<Item = JointVector>) -> Result<ArrayRef, DatasetError> {
    let values: Vec<f32> = rows.flatten().collect();
    let item = Arc::new(Field::new("item", DataType::Float32, false));
    let array =
        FixedSizeListArray::try_new(item, DOF as i32, Arc::new(Float32Array::from(values)), None)?;
    Ok(Arc::new(array))
}

fn float_list_column<'a>(rows: impl Iterator<Item = &'a [f64]>) -> ArrayRef {
    let mut builder = ListBuilder::new(Float64Builder::new());
    for row in rows {
        builder.values().append_slice(row);
        builder.append(true);
    }
    Arc::new(builder.finish())
}

/// 单个片段的数据文件
pub(crate) fn episode_parquet(frames: &[IndexedFrame]) -> Result<Vec<u8>, DatasetError> {
    let columns: Columns = vec![
        (
            "timestamp".to_string(),
            Arc::new(Float32Array::from_iter_values(
                frames.iter().map(|f| f.frame.timestamp as f32),
            )),
        ),
        (
            "action".to_string(),
            vector_column(frames.iter().map(|f| f.frame.action))?,
        ),
        (
            "observation.state".to_string(),
            vector_column(frames.iter().map(|f| f.frame.observation_state))?,
        ),
        (
            "episode_index".to_string(),
            int64_column(frames.iter().map(|f| f.frame.episode_index)),
        ),
        (
            "task_index".to_string(),
            int64_column(frames.iter().map(|f| f.frame.task_index)),
        ),
        (
            "frame_index".to_string(),
            int64_column(frames.iter().map(|f| f.frame_index)),
        ),
        (
            "index".to_string(),
            int64_column(frames.iter().map(|f| f.global_index)),
        ),
    ];
    write_batch(columns)
}

/// `meta/tasks.parquet`
pub(crate) fn tasks_parquet(tasks: &[String]) -> Result<Vec<u8>, DatasetError> {
    let columns: Columns = vec![
        ("task_index".to_string(), int64_column(0..tasks.len())),
        (
            "description".to_string(),
            Arc::new(StringArray::from_iter_values(tasks.iter())),
        ),
    ];
    write_batch(columns)
}

/// `meta/episodes/chunk-000/file-000.parquet`：每个片段一行
pub(crate) fn episodes_parquet(
    episodes: &[ExportEpisode],
    cameras: &[String],
    fps: u32,
) -> Result<Vec<u8>, DatasetError> {
    let mut tasks = ListBuilder::new(StringBuilder::new());
    for ep in episodes {
        for task in &ep.tasks {
            tasks.values().append_value(task);
        }
        tasks.append(true);
    }

    let from_index = |ep: &ExportEpisode| ep.frames.first().map_or(0, |f| f.global_index);
    let mut columns: Columns = vec![
        ("episode_index".to_string(), int64_column(episodes.iter().map(|e| e.index))),
        ("tasks".to_string(), Arc::new(tasks.finish())),
        ("length".to_string(), int64_column(episodes.iter().map(|e| e.frames.len()))),
        ("data/chunk_index".to_string(), int64_column(episodes.iter().map(|e| e.chunk()))),
        ("dataset_from_index".to_string(), int64_column(episodes.iter().map(from_index))),
        (
            "dataset_to_index".to_string(),
            int64_column(episodes.iter().map(|e| from_index(e) + e.frames.len())),
        ),
    ];

    let stats: Vec<_> = episodes.iter().map(|e| compute_stats(&e.frames)).collect();
    for feature in NUMERIC_FEATURES {
        let per_episode = || stats.iter().map(move |s| &s[feature]);
        columns.push((
            format!("stats/{feature}/min"),
            float_list_column(per_episode().map(|s| s.min.as_slice())),
        ));
        columns.push((
            format!("stats/{feature}/max"),
            float_list_column(per_episode().map(|s| s.max.as_slice())),
        ));
        columns.push((
            format!("stats/{feature}/mean"),
            float_list_column(per_episode().map(|s| s.mean.as_slice())),
        ));
        columns.push((
            format!("stats/{feature}/std"),
            float_list_column(per_episode().map(|s| s.std.as_slice())),
        ));
        columns.push((
            format!("stats/{feature}/count"),
            Arc::new(Int64Array::from_iter_values(
                per_episode().map(|s| s.count.first().copied().unwrap_or(0) as i64),
            )),
        ));
    }

    // 每个片段对应一个视频文件，时间范围覆盖整个片段
    for camera in cameras {
        let ranges: Vec<Option<f64>> = episodes
            .iter()
            .map(|e| {
                e.videos
                    .iter()
                    .any(|v| &v.camera == camera)
                    .then(|| e.duration(fps))
            })
            .collect();
        let from: Vec<Option<f64>> = ranges.iter().map(|r| r.map(|_| 0.0)).collect();

        let key = feature_key(camera);
        columns.push((
            format!("videos/{key}/from_timestamp"),
            Arc::new(Float64Array::from(from)),
        ));
        columns.push((
            format!("videos/{key}/to_timestamp"),
            Arc::new(Float64Array::from(ranges)),
        ));
    }

    write_batch(columns)
}
