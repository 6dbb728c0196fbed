//! 相机视频片段
//!
//! 录制器不负责编码：外部采集完成后把整段视频交回，按
//! `{片段序号, 相机名}` 归档，导出时写入 `videos/` 目录。

use bytes::Bytes;

/// 一段已完成的视频
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSegment {
    pub camera: String,
    /// 开始采集时所在的片段
    pub episode_index: usize,
    /// 容器格式扩展名，例如 `mp4`
    pub container: String,
    pub data: Bytes,
}

impl VideoSegment {
    /// 导出时使用的特征名
    pub fn feature_key(&self) -> String {
        feature_key(&self.camera)
    }
}

/// 相机对应的特征名：`observation.images.{camera}`
pub fn feature_key(camera: &str) -> String {
    format!("observation.images.{camera}")
}
