//! 驱动计时看门狗
//!
//! 包装一个 [`RobotDriver`] 并转发全部调用，同时用后台线程监控
//! 动作执行节拍：
//!
//! 1. 单个动作的执行时间不超过 `max_action_duration`；
//! 2. 上一动作结束到下一动作到达（`apply_action`）的间隔不超过
//!    `max_inter_action_duration`。
//!
//! 任一约束被破坏即立刻停机，之后外部动作被静默忽略。包装器
//! drop 时保证内层驱动的 `shutdown` 已被调用，硬件总是落在安全
//! 状态。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::driver::RobotDriver;
use crate::series::{LocalTimeSeries, TimeSeries, WAIT_SLICE};

/// 看门狗配置
///
/// 两个超时都为 `Some` 时才启动监控线程；任一为 `None`（不限时）
/// 则只保留 shutdown-on-drop 语义并告警——此时不如直接用内层
/// 驱动。
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    /// 单个动作允许的最长执行时间
    pub max_action_duration: Option<Duration>,
    /// 相邻动作之间允许的最长间隔
    pub max_inter_action_duration: Option<Duration>,
}

/// 带计时监控的驱动包装器
pub struct MonitoredDriver<A, O> {
    inner: Arc<dyn RobotDriver<A, O>>,
    shared: Arc<Shared<A, O>>,
    watchdog: Option<JoinHandle<()>>,
}

struct Shared<A, O> {
    inner: Arc<dyn RobotDriver<A, O>>,
    is_shutdown: AtomicBool,
    /// 每次 apply_action 开始/结束各打一个标记
    action_started: LocalTimeSeries<bool>,
    action_ended: LocalTimeSeries<bool>,
    /// 看门狗检测到超时后存放的错误信息
    timeout_message: Mutex<Option<String>>,
}

impl<A, O> Shared<A, O> {
    /// 停机一次（幂等）
    fn shutdown_once(&self) {
        if !self.is_shutdown.swap(true, Ordering::AcqRel) {
            self.inner.shutdown();
        }
    }
}

impl<A, O> MonitoredDriver<A, O>
where
    A: Send + 'static,
    O: Send + 'static,
{
    /// 包装 `inner` 并（在两个超时都有限时）启动监控线程
    pub fn new(inner: Arc<dyn RobotDriver<A, O>>, config: MonitorConfig) -> Self {
        let shared = Arc::new(Shared {
            inner: inner.clone(),
            is_shutdown: AtomicBool::new(false),
            action_started: LocalTimeSeries::new(1000),
            action_ended: LocalTimeSeries::new(1000),
            timeout_message: Mutex::new(None),
        });

        let watchdog = match (config.max_action_duration, config.max_inter_action_duration) {
            (Some(action), Some(inter)) => {
                let shared = shared.clone();
                Some(std::thread::spawn(move || {
                    watchdog_loop(shared, action, inter);
                }))
            },
            _ => {
                warn!(
                    "MonitoredDriver created without finite timeouts; the monitoring loop is NOT \
                     running. If monitoring is not needed, use the driver directly."
                );
                None
            },
        };

        Self {
            inner,
            shared,
            watchdog,
        }
    }

    /// 看门狗是否已经触发停机
    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown.load(Ordering::Acquire)
    }
}

/// 在 deadline 之前切片等待 `index` 出现；被停机打断返回 true
fn sliced_wait(
    series: &LocalTimeSeries<bool>,
    is_shutdown: &AtomicBool,
    index: u64,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if is_shutdown.load(Ordering::Acquire) {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        if series.wait_for_index(index, remaining.min(WAIT_SLICE)) {
            return true;
        }
    }
}

fn watchdog_loop<A, O>(shared: Arc<Shared<A, O>>, action: Duration, inter: Duration) {
    // 等第一个动作开始
    while !shared.is_shutdown.load(Ordering::Acquire)
        && !shared.action_started.wait_for_index(0, WAIT_SLICE)
    {}

    let mut t = 0_u64;
    while !shared.is_shutdown.load(Ordering::Acquire) {
        if !sliced_wait(&shared.action_ended, &shared.is_shutdown, t, action) {
            let message = "Action did not end on time, shutting down.";
            error!("{message}");
            *shared.timeout_message.lock() = Some(message.to_string());
            shared.shutdown_once();
            return;
        }
        if !sliced_wait(&shared.action_started, &shared.is_shutdown, t + 1, inter) {
            let message = "Action did not start on time, shutting down.";
            error!("{message}");
            *shared.timeout_message.lock() = Some(message.to_string());
            shared.shutdown_once();
            return;
        }
        t += 1;
    }
}

impl<A, O> RobotDriver<A, O> for MonitoredDriver<A, O>
where
    A: Send + 'static,
    O: Send + 'static,
{
    fn initialize(&self) {
        self.inner.initialize();
    }

    fn get_latest_observation(&self) -> O {
        self.inner.get_latest_observation()
    }

    fn apply_action(&self, action: A) -> A {
        if self.shared.is_shutdown.load(Ordering::Acquire) {
            // 停机后不再执行，原样返回
            return action;
        }
        self.shared.action_started.append(true);
        let applied = self.inner.apply_action(action);
        self.shared.action_ended.append(true);
        applied
    }

    fn get_error(&self) -> Option<String> {
        if let Some(inner_error) = self.inner.get_error() {
            return Some(inner_error);
        }
        self.shared.timeout_message.lock().clone()
    }

    fn shutdown(&self) {
        self.shared.shutdown_once();
    }
}

impl<A, O> Drop for MonitoredDriver<A, O> {
    fn drop(&mut self) {
        self.shared.shutdown_once();
        if let Some(handle) = self.watchdog.take()
            && handle.join().is_err()
        {
            error!("MonitoredDriver watchdog thread panicked");
        }
    }
}
