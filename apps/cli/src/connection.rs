//! 连接管理
//!
//! 每个命令都按同样的步骤连接机械臂：读取配置 → 打开串口 →
//! 构建共享总线 → 加载校准文件（如果存在）。

use anyhow::{Context, Result, anyhow};
use soarm_client::{CalibrationResult, ConfigStore, RobotProfile, Settings, TomlConfigStore};
use soarm_driver::{MotorBus, MotorConfig, SharedBus, shared};
use soarm_serial::{SerialConfig, SerialTransport};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// 配置文件位置（命令行参数优先）
#[derive(Debug, Clone)]
pub struct ConfigLocation {
    path: Option<PathBuf>,
}

impl ConfigLocation {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn store(&self) -> Result<TomlConfigStore> {
        match &self.path {
            Some(path) => Ok(TomlConfigStore::new(path)),
            None => TomlConfigStore::default_location().context("无法确定配置目录"),
        }
    }

    pub fn load(&self) -> Result<Settings> {
        let store = self.store()?;
        store
            .load()
            .with_context(|| format!("读取配置失败: {}", store.path().display()))
    }

    /// 校准文件：与配置文件同目录的 `calibration/{robot_type}.json`
    pub fn calibration_path(&self, robot_type: &str) -> Result<PathBuf> {
        let store = self.store()?;
        let dir = store
            .path()
            .parent()
            .ok_or_else(|| anyhow!("配置路径没有上级目录"))?;
        Ok(dir.join("calibration").join(format!("{robot_type}.json")))
    }

    pub fn load_calibration(&self, robot_type: &str) -> Result<Option<CalibrationResult>> {
        let path = self.calibration_path(robot_type)?;
        if !path.exists() {
            debug!("No calibration at {}", path.display());
            return Ok(None);
        }
        let json = fs::read_to_string(&path)
            .with_context(|| format!("读取校准文件失败: {}", path.display()))?;
        let result = CalibrationResult::from_json(&json)
            .with_context(|| format!("校准文件格式错误: {}", path.display()))?;
        Ok(Some(result))
    }

    pub fn save_calibration(&self, result: &CalibrationResult) -> Result<PathBuf> {
        let path = self.calibration_path(&result.robot_type)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("创建校准目录失败")?;
        }
        fs::write(&path, result.to_json()?)
            .with_context(|| format!("写入校准文件失败: {}", path.display()))?;
        Ok(path)
    }
}

/// 已连接的机械臂
pub struct Session {
    pub settings: Settings,
    pub profile: RobotProfile,
    pub bus: SharedBus<SerialTransport>,
    pub calibration: Option<CalibrationResult>,
}

impl Session {
    /// 打开串口（`port` 覆盖配置）
    pub fn open(location: &ConfigLocation, port: Option<&str>) -> Result<Self> {
        let settings = location.load()?;
        let port = port
            .map(str::to_string)
            .or_else(|| settings.port.clone())
            .ok_or_else(|| {
                anyhow!("未指定串口，请使用 --port 或 `soarm-cli config set --port <PORT>`")
            })?;

        let profile = RobotProfile::from_type(&settings.robot_type)
            .ok_or_else(|| anyhow!("未知的机械臂型号: {}", settings.robot_type))?;

        println!("🔌 连接到 {} ({} baud)...", port, settings.baud_rate);
        let transport =
            SerialTransport::open(&SerialConfig::new(&port).with_baud_rate(settings.baud_rate))
                .with_context(|| format!("打开串口失败: {port}"))?;

        let bus = MotorBus::new(transport).with_ack_policy(settings.ack.into());
        let calibration = location.load_calibration(&profile.robot_type)?;
        info!(
            "Connected to {} on {} (calibrated: {})",
            profile.robot_type,
            port,
            calibration.is_some()
        );

        Ok(Self {
            settings,
            profile,
            bus: shared(bus),
            calibration,
        })
    }

    /// 电机配置：有校准时使用校准范围，否则全行程
    pub fn motor_configs(&self) -> Vec<MotorConfig> {
        match &self.calibration {
            Some(calibration) => calibration.motor_configs(),
            None => {
                let resolution = self.bus.lock().table().resolution;
                self.profile.motor_configs(resolution)
            },
        }
    }
}
