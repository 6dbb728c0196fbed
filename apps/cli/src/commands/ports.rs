//! 串口列表命令

use anyhow::{Context, Result};
use clap::Args;

/// 串口列表命令参数
#[derive(Args, Debug)]
pub struct PortsCommand {}

impl PortsCommand {
    pub fn execute(&self) -> Result<()> {
        let ports = soarm_serial::available_ports().context("枚举串口失败")?;
        if ports.is_empty() {
            println!("未找到串口，请检查 USB 连接");
            return Ok(());
        }

        println!("可用串口:");
        for port in ports {
            println!("  {}", port);
        }
        Ok(())
    }
}
