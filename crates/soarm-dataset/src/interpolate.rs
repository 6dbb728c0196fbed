//! 固定频率重采样
//!
//! 录制的帧只在电机变化时产生，间隔不规则。导出前按固定帧率在
//! `[start, end)` 上均匀取样：
//!
//! - 取样时间早于第一帧 → 使用第一帧
//! - 取样时间不早于最后一帧 → 使用最后一帧
//! - 否则在包围它的两帧 `a.t <= t < b.t` 之间线性插值
//!
//! 输出帧的片段/任务序号取自前一帧 `a`。

use crate::error::DatasetError;
use crate::frame::{DOF, Episode, Frame, IndexedFrame, JointVector};

fn lerp(a: &JointVector, b: &JointVector, ratio: f32) -> JointVector {
    let mut out = [0.0; DOF];
    for (i, v) in out.iter_mut().enumerate() {
        *v = a[i] + (b[i] - a[i]) * ratio;
    }
    out
}

/// 在两帧之间线性插值
///
/// # Panics
///
/// `t` 不满足 `a.timestamp <= t < b.timestamp` 时 panic。
pub fn interpolate(a: &Frame, b: &Frame, t: f64) -> Frame {
    assert!(
        a.timestamp <= t && t < b.timestamp,
        "interpolation time {t} outside bracket [{}, {})",
        a.timestamp,
        b.timestamp
    );

    let ratio = ((t - a.timestamp) / (b.timestamp - a.timestamp)) as f32;
    Frame {
        timestamp: t,
        action: lerp(&a.action, &b.action, ratio),
        observation_state: lerp(&a.observation_state, &b.observation_state, ratio),
        episode_index: a.episode_index,
        task_index: a.task_index,
    }
}

/// 求时间 `t` 处的帧值（越界时钳位到首尾帧）
///
/// `frames` 必须非空且按时间单调不减。
pub fn frame_at(frames: &[Frame], t: f64) -> Frame {
    let (first, last) = match (frames.first(), frames.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => panic!("frame_at called with no frames"),
    };

    let boundary = if t < first.timestamp {
        Some(first)
    } else if t >= last.timestamp {
        Some(last)
    } else {
        None
    };
    if let Some(f) = boundary {
        return Frame { timestamp: t, ..*f };
    }

    // 第一个时间戳大于 t 的帧；前面至少有一帧（first.t <= t）
    let upper = frames.partition_point(|f| f.timestamp <= t);
    interpolate(&frames[upper - 1], &frames[upper], t)
}

/// 把片段重采样为固定帧率
///
/// 帧数为 `floor(timespan * fps)`，第 `i` 帧位于 `start + i / fps`，
/// 全局序号从 `start_index` 开始连续编号。
///
/// # 错误
///
/// 片段没有任何帧或 `fps` 为 0 时返回 `RecordingState`。
pub fn interpolated_regular_episode(
    episode: &Episode,
    fps: u32,
    start_index: usize,
) -> Result<Vec<IndexedFrame>, DatasetError> {
    if episode.is_empty() {
        return Err(DatasetError::RecordingState(format!(
            "episode {} has no frames to resample",
            episode.index()
        )));
    }
    if fps == 0 {
        return Err(DatasetError::RecordingState("fps must be positive".to_string()));
    }

    let fps = f64::from(fps);
    let start = episode.start_time().unwrap_or(0.0);
    let count = (episode.timespan() * fps).floor() as usize;

    let frames = episode.frames();
    Ok((0..count)
        .map(|i| IndexedFrame {
            frame: frame_at(frames, start + i as f64 / fps),
            frame_index: i,
            global_index: start_index + i,
        })
        .collect())
}
