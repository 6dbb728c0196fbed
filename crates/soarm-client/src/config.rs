//! 用户配置
//!
//! 跨会话保存的设置（串口、相机、数据集仓库等）通过 [`ConfigStore`] 注入，
//! 而不是全局单例：
//! - [`TomlConfigStore`]: 配置目录下的 `soarm/config.toml`
//! - [`MemoryConfigStore`]: 内存实现，测试使用

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use soarm_driver::AckPolicy;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// 配置读写错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine config directory")]
    NoConfigDir,

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// 写入应答策略（配置文件中的写法）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckMode {
    #[default]
    Optimistic,
    Strict,
}

impl From<AckMode> for AckPolicy {
    fn from(mode: AckMode) -> Self {
        match mode {
            AckMode::Optimistic => AckPolicy::Optimistic,
            AckMode::Strict => AckPolicy::Strict,
        }
    }
}

/// 遥操作调参
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeleopSettings {
    /// 控制频率
    pub tick_hz: f64,
    /// 每个周期每个按键的步长（原始刻度）
    pub step_size: i32,
    /// 按键状态超时（防止丢失松开事件导致卡键）
    pub key_timeout_ms: u64,
}

impl Default for TeleopSettings {
    fn default() -> Self {
        Self {
            tick_hz: 60.0,
            step_size: 10,
            key_timeout_ms: 10_000,
        }
    }
}

impl TeleopSettings {
    pub fn key_timeout(&self) -> Duration {
        Duration::from_millis(self.key_timeout_ms)
    }
}

/// 全部用户设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 默认串口
    pub port: Option<String>,
    pub baud_rate: u32,
    /// 机械臂型号（`so100_follower` / `so101_follower`）
    pub robot_type: String,
    /// 相机名称（数据集中的视频流）
    pub cameras: Vec<String>,
    /// 数据集帧率
    pub fps: u32,
    /// 默认任务描述
    pub task: String,
    /// 发布数据集时使用的凭据
    pub hub_token: Option<String>,
    /// 数据集仓库名
    pub repo_name: Option<String>,
    pub ack: AckMode,
    pub teleop: TeleopSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 1_000_000,
            robot_type: "so100_follower".to_string(),
            cameras: Vec::new(),
            fps: 30,
            task: "teleoperation".to_string(),
            hub_token: None,
            repo_name: None,
            ack: AckMode::default(),
            teleop: TeleopSettings::default(),
        }
    }
}

/// 配置存储接口
pub trait ConfigStore: Send + Sync {
    /// 读取配置，不存在时返回默认值
    fn load(&self) -> Result<Settings, ConfigError>;

    /// 保存配置
    fn save(&self, settings: &Settings) -> Result<(), ConfigError>;
}

/// TOML 文件存储
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 系统配置目录下的 `soarm/config.toml`
    pub fn default_location() -> Result<Self, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push("soarm");
        path.push("config.toml");
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&self) -> Result<Settings, ConfigError> {
        if !self.path.exists() {
            debug!("No config at {}, using defaults", self.path.display());
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = toml::to_string_pretty(settings)?;
        fs::write(&self.path, content).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!("Config saved to {}", self.path.display());
        Ok(())
    }
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    settings: Mutex<Option<Settings>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(Some(settings)),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Result<Settings, ConfigError> {
        Ok(self.settings.lock().clone().unwrap_or_default())
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        *self.settings.lock() = Some(settings.clone());
        Ok(())
    }
}
