//! 移动命令
//!
//! 直接设定关节目标位置，包含安全检查和确认机制

use crate::connection::{ConfigLocation, Session};
use crate::safety::SafetyChecker;
use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use soarm_client::{DirectTeleoperator, Teleoperator};

/// 移动命令参数
#[derive(Args, Debug)]
pub struct MoveCommand {
    /// 目标位置（原始刻度），逗号分隔的 `关节=位置`
    /// 例如：elbow_flex=2500,gripper=1800
    #[arg(short, long)]
    pub joints: String,

    /// 跳过确认提示
    #[arg(long)]
    pub force: bool,

    /// 串口（覆盖配置）
    #[arg(short, long)]
    pub port: Option<String>,
}

impl MoveCommand {
    /// 解析关节目标
    pub fn parse_joints(&self) -> Result<Vec<(String, i32)>> {
        let targets = self
            .joints
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|pair| {
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("格式应为 关节=位置: {}", pair))?;
                let value = value
                    .trim()
                    .parse::<i32>()
                    .with_context(|| format!("解析位置失败: {}", pair))?;
                Ok((name.trim().to_string(), value))
            })
            .collect::<Result<Vec<_>>>()?;

        if targets.is_empty() {
            bail!("关节目标不能为空");
        }
        Ok(targets)
    }

    /// 执行移动
    pub fn execute(&self, location: &ConfigLocation) -> Result<()> {
        let targets = self.parse_joints()?;
        let session = Session::open(location, self.port.as_deref())?;

        for (name, _) in &targets {
            if session.profile.joint(name).is_none() {
                bail!("未知关节: {}（可用: {}）", name, session.profile.names().join(", "));
            }
        }

        let teleop = DirectTeleoperator::new(session.bus.clone(), session.motor_configs());
        teleop.start()?;

        let motors = teleop.motor_configs();
        let moves: Vec<(u16, u16)> = targets
            .iter()
            .filter_map(|(name, target)| {
                motors
                    .iter()
                    .find(|m| &m.name == name)
                    .map(|m| (m.current_position, m.clamp(*target)))
            })
            .collect();

        let checker = SafetyChecker::default();
        if !self.force
            && checker.requires_confirmation(&moves)
            && !checker.show_confirmation_prompt(&moves)?
        {
            println!("❌ 已取消");
            return Ok(());
        }

        println!("⏳ 正在移动到目标位置...");
        for (name, target) in &targets {
            let applied = teleop.move_motor(name, *target)?;
            if i32::from(applied) != *target {
                println!("  {}: {} (钳位自 {})", name, applied, target);
            } else {
                println!("  {}: {}", name, applied);
            }
        }
        teleop.stop();

        println!("✅ 移动完成");
        Ok(())
    }
}
