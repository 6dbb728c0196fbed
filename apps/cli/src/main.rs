//! # SO-ARM CLI
//!
//! Command-line interface for SO-100 / SO-101 robot arms.
//!
//! ```bash
//! # 配置默认串口
//! soarm-cli config set --port /dev/ttyACM0
//!
//! # 校准（结果保存到配置目录）
//! soarm-cli calibrate
//!
//! # 键盘遥操作并录制数据集
//! soarm-cli teleop --record ./so100_dataset.zip
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod connection;
mod safety;
mod terminal;

use commands::{
    CalibrateCommand, ConfigCommand, MoveCommand, PortsCommand, PositionCommand, TeleopCommand,
};
use connection::ConfigLocation;

/// SO-ARM CLI - 机械臂命令行工具
#[derive(Parser, Debug)]
#[command(name = "soarm-cli")]
#[command(about = "Command-line interface for SO-100 / SO-101 robot arms", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认：系统配置目录下的 soarm/config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 列出可用串口
    Ports(PortsCommand),

    /// 查询当前关节位置
    Position(PositionCommand),

    /// 移动关节到目标位置
    Move(MoveCommand),

    /// 校准归零偏移与活动范围
    Calibrate(CalibrateCommand),

    /// 键盘遥操作（可选录制数据集）
    Teleop(TeleopCommand),
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("soarm_cli=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let location = ConfigLocation::new(cli.config);

    match cli.command {
        Commands::Config(cmd) => cmd.execute(&location),
        Commands::Ports(cmd) => cmd.execute(),
        Commands::Position(cmd) => cmd.execute(&location),
        Commands::Move(cmd) => cmd.execute(&location),
        Commands::Calibrate(cmd) => cmd.execute(&location),
        Commands::Teleop(cmd) => cmd.execute(&location),
    }
}
