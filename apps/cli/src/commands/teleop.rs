//! 键盘遥操作命令
//!
//! 终端进入 raw mode，按键映射到默认键位表。可选把整个过程录制为
//! LeRobot 数据集：Enter 开始下一个片段，Esc 急停并结束，Ctrl+C 结束。

use crate::connection::{ConfigLocation, Session};
use crate::terminal::{HeldKeys, KeyChange, RawTerminal, is_interrupt, key_name};
use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use soarm_client::{
    KeyBindings, KeyboardTeleoperator, Settings, TeleopConfig, TeleopState, Teleoperator,
};
use soarm_dataset::{
    Credentials, DatasetExporter, DatasetRecorder, DirectoryPublisher, JointFeature, Publisher,
    RecorderConfig, to_zip, write_to_dir,
};
use soarm_serial::SerialTransport;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 事件轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// 遥操作命令参数
#[derive(Args, Debug)]
pub struct TeleopCommand {
    /// 串口（覆盖配置）
    #[arg(short, long)]
    pub port: Option<String>,

    /// 录制数据集到目录，或 `.zip` 文件
    #[arg(short, long)]
    pub record: Option<PathBuf>,

    /// 数据集帧率（覆盖配置）
    #[arg(long)]
    pub fps: Option<u32>,

    /// 任务描述（覆盖配置）
    #[arg(long)]
    pub task: Option<String>,

    /// 录制完成后发布到本地仓库（仓库名，默认取配置）
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    pub publish: Option<String>,

    /// 终端不上报松开事件时，按键保持的时间（毫秒）
    #[arg(long, default_value_t = 600)]
    pub hold_ms: u64,
}

/// 发布目标仓库名：命令行优先，其次配置
fn resolve_repo_name(arg: Option<&str>, configured: Option<&str>) -> Option<String> {
    match arg {
        Some(name) if !name.is_empty() => Some(name.to_string()),
        Some(_) => configured.map(str::to_string),
        None => None,
    }
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

impl TeleopCommand {
    pub fn execute(&self, location: &ConfigLocation) -> Result<()> {
        let session = Session::open(location, self.port.as_deref())?;
        let settings = session.settings.clone();

        let repo_name = resolve_repo_name(self.publish.as_deref(), settings.repo_name.as_deref());
        if self.publish.is_some() && repo_name.is_none() {
            bail!("未指定仓库名，请使用 --publish <REPO> 或 `soarm-cli config set --repo-name`");
        }
        if self.publish.is_some() && self.record.is_none() {
            bail!("--publish 需要同时指定 --record");
        }
        let fps = self.fps.unwrap_or(settings.fps);
        if fps == 0 {
            bail!("帧率必须大于 0");
        }
        if !settings.cameras.is_empty() {
            warn!("Camera capture is not available from the CLI, recording joints only");
        }

        let config = TeleopConfig {
            tick_rate_hz: settings.teleop.tick_hz,
            step_size: settings.teleop.step_size,
            key_timeout: settings.teleop.key_timeout(),
            read_initial_positions: true,
        };
        let teleop = KeyboardTeleoperator::new(
            session.bus.clone(),
            session.motor_configs(),
            KeyBindings::default(),
            config,
        );

        let recorder = match &self.record {
            Some(_) => {
                let features = session
                    .profile
                    .joints
                    .iter()
                    .map(|j| JointFeature::new(j.name, j.norm_mode))
                    .collect();
                let recorder = Arc::new(DatasetRecorder::new(
                    features,
                    &session.motor_configs(),
                    RecorderConfig {
                        robot_type: session.profile.robot_type.clone(),
                        task: self.task.clone().unwrap_or(settings.task.clone()),
                    },
                ));
                teleop.on_change(recorder.clone());
                Some(recorder)
            },
            None => None,
        };

        teleop.start()?;
        if let Some(recorder) = &recorder {
            // 启动时读回的实际位置作为第一帧的 action
            recorder.sync_positions(&teleop.motor_configs());
            recorder.start()?;
        }

        print_help(&teleop, recorder.is_some());
        let outcome = self.run_loop(&teleop, recorder.as_deref());
        teleop.stop();

        if let Some(stats) = teleop.scheduler_stats() {
            info!("Teleop ticks: {}, skipped: {}", stats.ticks, stats.skipped);
        }

        let (Some(recorder), Some(output)) = (recorder, &self.record) else {
            return outcome;
        };
        finish_recording(outcome, |publish| {
            let repo_name = if publish { repo_name.as_deref() } else { None };
            self.save_recording(&recorder, output, fps, repo_name, &settings)
        })
    }

    /// 停止录制，导出到 `output`，可选发布
    fn save_recording(
        &self,
        recorder: &DatasetRecorder,
        output: &Path,
        fps: u32,
        repo_name: Option<&str>,
        settings: &Settings,
    ) -> Result<()> {
        if recorder.is_recording() {
            recorder.stop()?;
        }

        let dataset = recorder.snapshot()?;
        if dataset.frame_count() == 0 {
            println!("⚠️  没有录制到任何帧，跳过导出");
            return Ok(());
        }

        let files = DatasetExporter::new(dataset).files(fps)?;
        if is_zip(output) {
            fs::write(output, to_zip(&files)?)
                .with_context(|| format!("写入失败: {}", output.display()))?;
        } else {
            write_to_dir(&files, output)?;
        }
        println!("💾 数据集已保存到: {}", output.display());

        if let Some(repo_name) = repo_name {
            let root = dirs::data_local_dir()
                .ok_or_else(|| anyhow!("无法确定数据目录"))?
                .join("soarm")
                .join("hub");
            let credentials = Credentials {
                token: settings.hub_token.clone(),
            };

            let mut handle = DirectoryPublisher::new(root).publish(files, &credentials, repo_name)?;
            handle.on_progress(|p| {
                println!("  📤 [{}/{}] {}", p.files_done, p.files_total, p.path);
            });
            let summary = handle.wait()?;
            println!(
                "✅ 已发布 {}（{} 个文件）到 {}",
                summary.repo_name, summary.files, summary.location
            );
        }
        Ok(())
    }

    fn run_loop(
        &self,
        teleop: &KeyboardTeleoperator<SerialTransport>,
        recorder: Option<&DatasetRecorder>,
    ) -> Result<()> {
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("设置 Ctrl+C 处理器失败")?;

        let terminal = RawTerminal::enter()?;
        let mut held = HeldKeys::new(Duration::from_millis(self.hold_ms));

        let apply = |change: KeyChange| match change {
            KeyChange::Pressed(key) => teleop.press(&key),
            KeyChange::Released(key) => teleop.release(&key),
        };

        while !interrupted.load(Ordering::SeqCst) && teleop.state() == TeleopState::Active {
            if event::poll(POLL_INTERVAL)?
                && let Event::Key(key) = event::read()?
            {
                if is_interrupt(&key) {
                    break;
                }
                if key.code == KeyCode::Enter && key.kind == KeyEventKind::Press {
                    if let Some(recorder) = recorder {
                        let index = recorder.next_episode()?;
                        print!("🎬 片段 {}\r\n", index);
                    }
                } else if let Some(name) = key_name(key.code)
                    && let Some(change) = held.on_event(name, key.kind, Instant::now())
                {
                    apply(change);
                }
            }

            if !terminal.reports_release() {
                for change in held.expire(Instant::now()) {
                    apply(change);
                }
            }
        }
        drop(terminal);

        if teleop.state() == TeleopState::Idle {
            println!("🛑 急停");
        }
        Ok(())
    }
}

/// 先保存已录制的数据，再返回遥操作循环的错误
///
/// 循环出错时只保存到本地，不发布。
fn finish_recording<F>(outcome: Result<()>, save: F) -> Result<()>
where
    F: FnOnce(bool) -> Result<()>,
{
    match outcome {
        Ok(()) => save(true),
        Err(e) => {
            warn!("Teleoperation failed, saving recorded frames first: {:#}", e);
            if let Err(save_error) = save(false) {
                warn!("Saving the recording failed: {:#}", save_error);
            }
            Err(e)
        },
    }
}

fn print_help(teleop: &KeyboardTeleoperator<SerialTransport>, recording: bool) {
    let bindings = teleop.bindings();
    let mut keys: Vec<_> = bindings.iter().collect();
    keys.sort_by(|a, b| (&a.1.motor_name, a.1.direction).cmp(&(&b.1.motor_name, b.1.direction)));

    println!("⌨️  键位:");
    for (key, binding) in keys {
        let sign = if binding.direction > 0 { "+" } else { "-" };
        println!("  {:<10} {}{}", key, binding.motor_name, sign);
    }
    println!("  {:<10} 急停", bindings.stop_key());
    if recording {
        println!("  {:<10} 下一个片段", "Enter");
    }
    println!("  {:<10} 结束", "Ctrl+C");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_repo_name() {
        assert_eq!(resolve_repo_name(None, Some("cfg")), None);
        assert_eq!(resolve_repo_name(Some(""), Some("cfg")).as_deref(), Some("cfg"));
        assert_eq!(resolve_repo_name(Some("arg"), Some("cfg")).as_deref(), Some("arg"));
        assert_eq!(resolve_repo_name(Some(""), None), None);
    }

    #[test]
    fn test_recording_saved_before_loop_error() {
        let mut calls = Vec::new();
        let result = finish_recording(Err(anyhow!("terminal lost")), |publish| {
            calls.push(publish);
            Ok(())
        });
        assert_eq!(result.unwrap_err().to_string(), "terminal lost");
        assert_eq!(calls, vec![false]);

        // 保存失败时仍返回循环的错误
        let result = finish_recording(Err(anyhow!("terminal lost")), |_| bail!("disk full"));
        assert_eq!(result.unwrap_err().to_string(), "terminal lost");
    }

    #[test]
    fn test_recording_saved_and_published_on_success() {
        let mut calls = Vec::new();
        finish_recording(Ok(()), |publish| {
            calls.push(publish);
            Ok(())
        })
        .unwrap();
        assert_eq!(calls, vec![true]);

        assert!(finish_recording(Ok(()), |_| bail!("disk full")).is_err());
    }

    #[test]
    fn test_zip_output_detection() {
        assert!(is_zip(Path::new("out/data.zip")));
        assert!(is_zip(Path::new("DATA.ZIP")));
        assert!(!is_zip(Path::new("out/data")));
    }
}
