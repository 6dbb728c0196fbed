//! 配置管理命令
//!
//! 读写 `soarm/config.toml`（串口、型号、数据集参数等）

use crate::connection::ConfigLocation;
use anyhow::{Result, bail};
use clap::Subcommand;
use soarm_client::config::AckMode;
use soarm_client::{ConfigStore, RobotProfile, Settings};

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 串口（如 /dev/ttyACM0, COM3）
        #[arg(short, long)]
        port: Option<String>,

        /// 波特率
        #[arg(short, long)]
        baud_rate: Option<u32>,

        /// 机械臂型号（so100_follower / so101_follower）
        #[arg(short, long)]
        robot_type: Option<String>,

        /// 数据集帧率
        #[arg(long)]
        fps: Option<u32>,

        /// 默认任务描述
        #[arg(long)]
        task: Option<String>,

        /// 数据集仓库名
        #[arg(long)]
        repo_name: Option<String>,

        /// 发布凭据
        #[arg(long)]
        hub_token: Option<String>,

        /// 写入应答策略（optimistic / strict）
        #[arg(long, value_parser = parse_ack)]
        ack: Option<AckMode>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

fn parse_ack(s: &str) -> Result<AckMode, String> {
    match s {
        "optimistic" => Ok(AckMode::Optimistic),
        "strict" => Ok(AckMode::Strict),
        other => Err(format!("unknown ack mode: {other}")),
    }
}

fn or_unset(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("(未设置)")
}

impl ConfigCommand {
    pub fn execute(self, location: &ConfigLocation) -> Result<()> {
        match self {
            ConfigCommand::Set {
                port,
                baud_rate,
                robot_type,
                fps,
                task,
                repo_name,
                hub_token,
                ack,
            } => {
                let store = location.store()?;
                let mut settings = store.load()?;

                if let Some(robot_type) = robot_type {
                    if RobotProfile::from_type(&robot_type).is_none() {
                        bail!("未知的机械臂型号: {}", robot_type);
                    }
                    println!("✅ 设置机械臂型号: {}", robot_type);
                    settings.robot_type = robot_type;
                }
                if let Some(port) = port {
                    println!("✅ 设置默认串口: {}", port);
                    settings.port = Some(port);
                }
                if let Some(baud_rate) = baud_rate {
                    println!("✅ 设置波特率: {}", baud_rate);
                    settings.baud_rate = baud_rate;
                }
                if let Some(fps) = fps {
                    if fps == 0 {
                        bail!("帧率必须大于 0");
                    }
                    println!("✅ 设置帧率: {}", fps);
                    settings.fps = fps;
                }
                if let Some(task) = task {
                    println!("✅ 设置任务描述: {}", task);
                    settings.task = task;
                }
                if let Some(repo_name) = repo_name {
                    println!("✅ 设置仓库名: {}", repo_name);
                    settings.repo_name = Some(repo_name);
                }
                if let Some(token) = hub_token {
                    println!("✅ 设置发布凭据");
                    settings.hub_token = Some(token);
                }
                if let Some(ack) = ack {
                    println!("✅ 设置应答策略: {:?}", ack);
                    settings.ack = ack;
                }

                store.save(&settings)?;
                Ok(())
            },

            ConfigCommand::Get { key } => {
                let settings = location.load()?;
                match key.as_str() {
                    "port" => println!("{}", or_unset(&settings.port)),
                    "baud_rate" => println!("{}", settings.baud_rate),
                    "robot_type" => println!("{}", settings.robot_type),
                    "fps" => println!("{}", settings.fps),
                    "task" => println!("{}", settings.task),
                    "repo_name" => println!("{}", or_unset(&settings.repo_name)),
                    _ => print_settings(&settings),
                }
                Ok(())
            },

            ConfigCommand::Check => {
                let store = location.store()?;
                let settings = store.load()?;
                println!("配置文件: {}", store.path().display());
                print_settings(&settings);

                match RobotProfile::from_type(&settings.robot_type) {
                    Some(profile) => {
                        let calibration = location.calibration_path(&profile.robot_type)?;
                        if calibration.exists() {
                            println!("✅ 校准文件: {}", calibration.display());
                        } else {
                            println!("⚠️  未校准（运行 `soarm-cli calibrate`）");
                        }
                    },
                    None => println!("❌ 未知的机械臂型号: {}", settings.robot_type),
                }
                if settings.port.is_none() {
                    println!("⚠️  未设置串口");
                }
                Ok(())
            },
        }
    }
}

fn print_settings(settings: &Settings) {
    println!("SO-ARM CLI 配置:");
    println!("  串口: {}", or_unset(&settings.port));
    println!("  波特率: {}", settings.baud_rate);
    println!("  型号: {}", settings.robot_type);
    println!("  帧率: {}", settings.fps);
    println!("  任务: {}", settings.task);
    println!("  仓库: {}", or_unset(&settings.repo_name));
    println!(
        "  凭据: {}",
        if settings.hub_token.is_some() { "已设置" } else { "(未设置)" }
    );
    println!("  应答策略: {:?}", settings.ack);
    println!(
        "  遥操作: {} Hz, 步长 {}, 按键超时 {} ms",
        settings.teleop.tick_hz, settings.teleop.step_size, settings.teleop.key_timeout_ms
    );
}
