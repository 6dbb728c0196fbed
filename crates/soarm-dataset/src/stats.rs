//! # 特征统计
//!
//! 为 `meta/stats.json` 与片段元数据计算逐分量统计量。
//! 标量列按 1 维向量处理。

use crate::frame::IndexedFrame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单个特征的统计量（逐分量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    /// 最小值
    pub min: Vec<f64>,

    /// 最大值
    pub max: Vec<f64>,

    /// 平均值
    pub mean: Vec<f64>,

    /// 标准差（总体）
    pub std: Vec<f64>,

    /// 样本数量
    pub count: Vec<u64>,
}

/// 增量累加器
#[derive(Debug, Clone)]
pub struct StatsAccumulator {
    count: u64,
    min: Vec<f64>,
    max: Vec<f64>,
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl StatsAccumulator {
    pub fn new(dim: usize) -> Self {
        Self {
            count: 0,
            min: vec![f64::INFINITY; dim],
            max: vec![f64::NEG_INFINITY; dim],
            sum: vec![0.0; dim],
            sum_sq: vec![0.0; dim],
        }
    }

    /// 加入一个样本，长度必须等于维度
    pub fn push(&mut self, sample: &[f64]) {
        debug_assert_eq!(sample.len(), self.sum.len());
        self.count += 1;
        for (i, v) in sample.iter().enumerate() {
            self.min[i] = self.min[i].min(*v);
            self.max[i] = self.max[i].max(*v);
            self.sum[i] += v;
            self.sum_sq[i] += v * v;
        }
    }

    /// 计算统计量；没有样本时各项为 0
    pub fn finish(&self) -> FeatureStats {
        let dim = self.sum.len();
        if self.count == 0 {
            return FeatureStats {
                min: vec![0.0; dim],
                max: vec![0.0; dim],
                mean: vec![0.0; dim],
                std: vec![0.0; dim],
                count: vec![0],
            };
        }

        let n = self.count as f64;
        let mean: Vec<f64> = self.sum.iter().map(|s| s / n).collect();
        let std = self
            .sum_sq
            .iter()
            .zip(&mean)
            .map(|(sq, m)| (sq / n - m * m).max(0.0).sqrt())
            .collect();

        FeatureStats {
            min: self.min.clone(),
            max: self.max.clone(),
            mean,
            std,
            count: vec![self.count],
        }
    }
}

/// 数据列（特征名）
pub const NUMERIC_FEATURES: [&str; 7] = [
    "action",
    "observation.state",
    "timestamp",
    "frame_index",
    "episode_index",
    "index",
    "task_index",
];

/// 计算所有数值特征的统计量，键为特征名
pub fn compute_stats<'a>(
    frames: impl IntoIterator<Item = &'a IndexedFrame>,
) -> BTreeMap<String, FeatureStats> {
    let mut acc: Vec<StatsAccumulator> = NUMERIC_FEATURES
        .iter()
        .map(|name| match *name {
            "action" | "observation.state" => StatsAccumulator::new(crate::frame::DOF),
            _ => StatsAccumulator::new(1),
        })
        .collect();

    for f in frames {
        let action: Vec<f64> = f.frame.action.iter().map(|v| f64::from(*v)).collect();
        let state: Vec<f64> = f.frame.observation_state.iter().map(|v| f64::from(*v)).collect();
        acc[0].push(&action);
        acc[1].push(&state);
        acc[2].push(&[f.frame.timestamp]);
        acc[3].push(&[f.frame_index as f64]);
        acc[4].push(&[f.frame.episode_index as f64]);
        acc[5].push(&[f.global_index as f64]);
        acc[6].push(&[f.frame.task_index as f64]);
    }

    NUMERIC_FEATURES
        .iter()
        .zip(&acc)
        .map(|(name, a)| (name.to_string(), a.finish()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{DOF, Frame};

    #[test]
    fn test_accumulator() {
        let mut acc = StatsAccumulator::new(2);
        acc.push(&[1.0, 10.0]);
        acc.push(&[3.0, 10.0]);
        let stats = acc.finish();

        assert_eq!(stats.min, vec![1.0, 10.0]);
        assert_eq!(stats.max, vec![3.0, 10.0]);
        assert_eq!(stats.mean, vec![2.0, 10.0]);
        assert_eq!(stats.std, vec![1.0, 0.0]);
        assert_eq!(stats.count, vec![2]);
    }

    #[test]
    fn test_empty_accumulator() {
        let stats = StatsAccumulator::new(3).finish();
        assert_eq!(stats.mean, vec![0.0; 3]);
        assert_eq!(stats.count, vec![0]);
    }

    #[test]
    fn test_compute_stats_covers_all_features() {
        let frames: Vec<IndexedFrame> = (0..4)
            .map(|i| IndexedFrame {
                frame: Frame {
                    timestamp: i as f64 * 0.5,
                    action: [i as f32; DOF],
                    observation_state: [0.0; DOF],
                    episode_index: 0,
                    task_index: 0,
                },
                frame_index: i,
                global_index: 10 + i,
            })
            .collect();

        let stats = compute_stats(&frames);
        assert_eq!(stats.len(), NUMERIC_FEATURES.len());
        assert_eq!(stats["action"].max, vec![3.0; DOF]);
        assert_eq!(stats["action"].mean, vec![1.5; DOF]);
        assert_eq!(stats["timestamp"].max, vec![1.5]);
        assert_eq!(stats["index"].min, vec![10.0]);
        assert_eq!(stats["observation.state"].std, vec![0.0; DOF]);
    }
}
