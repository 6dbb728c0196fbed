//! 位置查询命令

use crate::connection::{ConfigLocation, Session};
use anyhow::{Result, bail};
use clap::Args;
use serde_json::json;

/// 位置查询命令参数
#[derive(Args, Debug)]
pub struct PositionCommand {
    /// 串口（覆盖配置）
    #[arg(short, long)]
    pub port: Option<String>,

    /// 输出格式（table / json）
    #[arg(short, long, default_value = "table")]
    pub format: String,
}

impl PositionCommand {
    pub fn execute(&self, location: &ConfigLocation) -> Result<()> {
        if self.format != "table" && self.format != "json" {
            bail!("未知的输出格式: {}", self.format);
        }

        let session = Session::open(location, self.port.as_deref())?;
        let motors = session.motor_configs();
        let ids: Vec<u8> = motors.iter().map(|m| m.id).collect();
        let positions = session.bus.lock().read_all(&ids)?;

        let rows: Vec<_> = motors
            .iter()
            .zip(&positions)
            .map(|(motor, raw)| {
                let norm_mode = session
                    .profile
                    .joint(&motor.name)
                    .map(|j| j.norm_mode)
                    .unwrap_or_default();
                let normalized =
                    raw.map(|p| norm_mode.normalize(p, motor.min_position, motor.max_position));
                (motor, *raw, normalized)
            })
            .collect();

        if self.format == "json" {
            let value: Vec<_> = rows
                .iter()
                .map(|(motor, raw, normalized)| {
                    json!({
                        "id": motor.id,
                        "name": motor.name,
                        "raw": raw,
                        "normalized": normalized,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        println!("📊 关节位置:");
        for (motor, raw, normalized) in rows {
            match (raw, normalized) {
                (Some(raw), Some(normalized)) => println!(
                    "  [{}] {:<14} {:>5}  ({:>7.2})",
                    motor.id, motor.name, raw, normalized
                ),
                _ => println!("  [{}] {:<14} 读取失败", motor.id, motor.name),
            }
        }
        if session.calibration.is_none() {
            println!("\n💡 提示: 未校准，归一化值基于全行程");
        }
        Ok(())
    }
}
