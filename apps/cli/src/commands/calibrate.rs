//! 校准命令
//!
//! 1. 用户把机械臂摆到各关节行程中点，确认后写入归零偏移
//! 2. 用户逐个关节活动到两端，按 Enter 结束范围记录
//! 3. 限位写入电机，结果保存到配置目录

use crate::connection::{ConfigLocation, Session};
use anyhow::{Context, Result};
use clap::Args;
use soarm_client::{CalibrationEngine, CalibrationStage, MotorRange};
use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// 进度输出间隔
const PROGRESS_INTERVAL_MS: u64 = 500;

/// 校准命令参数
#[derive(Args, Debug)]
pub struct CalibrateCommand {
    /// 串口（覆盖配置）
    #[arg(short, long)]
    pub port: Option<String>,

    /// 跳过开始前的确认
    #[arg(long)]
    pub yes: bool,
}

fn format_ranges(ranges: &[MotorRange]) -> String {
    ranges
        .iter()
        .map(|r| format!("{}={}..{}", r.name, r.min, r.max))
        .collect::<Vec<_>>()
        .join("  ")
}

impl CalibrateCommand {
    pub fn execute(&self, location: &ConfigLocation) -> Result<()> {
        let session = Session::open(location, self.port.as_deref())?;

        if !self.yes {
            let ready = inquire::Confirm::new("请把机械臂摆到各关节行程的中点，准备好了吗？")
                .with_default(true)
                .prompt()
                .map_err(|e| anyhow::anyhow!("用户交互失败: {}", e))?;
            if !ready {
                println!("❌ 已取消");
                return Ok(());
            }
        }

        let mut engine = CalibrationEngine::new(session.bus.clone(), session.profile.clone());
        let handle = engine.handle();

        engine.on_stage(|stage| match stage {
            CalibrationStage::RecordRange => {
                println!("🔄 逐个活动每个关节到两端，完成后按 Enter");
            },
            other => println!("⏳ {}", other),
        });

        let started = Instant::now();
        let last_print = Arc::new(AtomicU64::new(0));
        engine.on_progress(move |ranges| {
            let now = started.elapsed().as_millis() as u64;
            let last = last_print.load(Ordering::Relaxed);
            if now >= last + PROGRESS_INTERVAL_MS {
                last_print.store(now, Ordering::Relaxed);
                println!("  {}", format_ranges(ranges));
            }
        });

        // Enter 结束范围记录
        std::thread::Builder::new()
            .name("calibration-input".to_string())
            .spawn(move || {
                let mut line = String::new();
                let _ = std::io::stdin().lock().read_line(&mut line);
                handle.stop();
            })
            .context("启动输入线程失败")?;

        let result = engine.run().context("校准失败")?;

        println!("📊 校准结果:");
        for m in &result.motors {
            println!(
                "  [{}] {:<14} offset {:>5}  range {:>4}..{:<4}",
                m.id, m.name, m.homing_offset, m.range_min, m.range_max
            );
        }

        let path = location.save_calibration(&result)?;
        println!("💾 已保存到: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ranges() {
        let ranges = vec![MotorRange {
            name: "gripper".to_string(),
            id: 6,
            current: 2000,
            min: 1500,
            max: 2800,
        }];
        assert_eq!(format_ranges(&ranges), "gripper=1500..2800");
    }
}
