//! 固定频率调度器
//!
//! 在独立线程中按固定周期调用回调，使用绝对时间锚点消除累积漂移。
//!
//! # 超时（Overrun）
//!
//! 回调耗时超过一个周期时，已经错过的周期直接跳过而不是排队补执行，
//! 避免慢速总线造成无限积压。跳过的周期数记入 [`SchedulerStats`] 并打印 `warn!`。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 回调返回值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    /// 回调请求停止调度
    Stop,
}

/// 调度统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    pub ticks: u64,
    pub skipped: u64,
}

/// 固定频率调度器
///
/// Drop 时自动停止并等待线程退出。
pub struct FixedRateScheduler {
    period: Duration,
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl FixedRateScheduler {
    /// 启动调度线程
    ///
    /// 第一次回调立即执行。
    pub fn start<F>(name: &str, period: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> TickControl + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));
        let skipped = Arc::new(AtomicU64::new(0));

        let handle = {
            let running = running.clone();
            let ticks = ticks.clone();
            let skipped = skipped.clone();

            thread::Builder::new().name(name.to_string()).spawn(move || {
                let mut next_tick = Instant::now();

                while running.load(Ordering::Acquire) {
                    next_tick += period;

                    let control = tick();
                    ticks.fetch_add(1, Ordering::Relaxed);
                    if control == TickControl::Stop {
                        running.store(false, Ordering::Release);
                        break;
                    }

                    let now = Instant::now();
                    if next_tick <= now {
                        let behind = now.duration_since(next_tick);
                        let missed = missed_periods(behind, period);
                        next_tick += period * missed as u32;
                        skipped.fetch_add(missed, Ordering::Relaxed);
                        warn!(
                            "Control loop overrun: {:?} behind schedule, skipping {} tick(s)",
                            behind, missed
                        );
                    }

                    sleep_until(next_tick, &running);
                }

                debug!("Scheduler thread exited");
            })?
        };

        Ok(Self {
            period,
            running,
            ticks,
            skipped,
            handle: Some(handle),
        })
    }

    /// 按频率（Hz）启动
    pub fn start_hz<F>(name: &str, rate_hz: f64, tick: F) -> std::io::Result<Self>
    where
        F: FnMut() -> TickControl + Send + 'static,
    {
        Self::start(name, Duration::from_secs_f64(1.0 / rate_hz.max(f64::EPSILON)), tick)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 线程是否仍在调度
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// 停止调度并等待当前回调执行完毕
    ///
    /// 在调度线程内部调用时只设置停止标志，不等待自身。
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!("Scheduler thread panicked");
            }
        }
    }
}

impl Drop for FixedRateScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 睡眠到 `deadline`，期间每 50ms 检查一次停止标志
fn sleep_until(deadline: Instant, running: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(50);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || !running.load(Ordering::Acquire) {
            return;
        }
        spin_sleep::sleep(remaining.min(SLICE));
    }
}

/// 落后 `behind` 时需要跳过的周期数（至少 1）
fn missed_periods(behind: Duration, period: Duration) -> u64 {
    if period.is_zero() {
        return 1;
    }
    (behind.as_nanos() / period.as_nanos()) as u64 + 1
}
