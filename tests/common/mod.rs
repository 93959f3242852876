//! 测试公共设施：可编程的模拟驱动
//!
//! 观测值为单调递增的计数（0.0, 1.0, 2.0, ...），
//! `get_latest_observation` 睡眠一个步长来模拟硬件节拍。

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use servolink::RobotDriver;

/// 模拟硬件驱动
pub struct MockDriver {
    /// 每步节拍（get_latest_observation 的阻塞时长）
    step_period: Duration,
    /// 已产生的观测数
    observation_count: AtomicU64,
    /// 从第几个观测开始上报故障（0 = 不报）
    error_after_observations: AtomicU64,
    /// 上报的故障信息
    error_message: Mutex<String>,
    /// 动作安全钳位（|a| 超过该值会被截断）；None = 原样执行
    clamp_limit: Option<f64>,
    pub initialize_calls: AtomicU32,
    pub shutdown_calls: AtomicU32,
    /// 实际执行过的动作
    pub applied_log: Mutex<Vec<f64>>,
}

impl MockDriver {
    pub fn new(step_period: Duration) -> Self {
        Self {
            step_period,
            observation_count: AtomicU64::new(0),
            error_after_observations: AtomicU64::new(0),
            error_message: Mutex::new(String::new()),
            clamp_limit: None,
            initialize_calls: AtomicU32::new(0),
            shutdown_calls: AtomicU32::new(0),
            applied_log: Mutex::new(Vec::new()),
        }
    }

    /// 从第 `n` 个观测起 `get_error` 返回 `message`
    pub fn fail_after_observations(self, n: u64, message: &str) -> Self {
        self.error_after_observations.store(n, Ordering::SeqCst);
        *self.error_message.lock().unwrap() = message.to_string();
        self
    }

    /// 启用动作钳位
    pub fn with_clamp(mut self, limit: f64) -> Self {
        self.clamp_limit = Some(limit);
        self
    }

    pub fn shutdown_count(&self) -> u32 {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

impl RobotDriver<f64, f64> for MockDriver {
    fn initialize(&self) {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn get_latest_observation(&self) -> f64 {
        std::thread::sleep(self.step_period);
        self.observation_count.fetch_add(1, Ordering::SeqCst) as f64
    }

    fn apply_action(&self, action: f64) -> f64 {
        let applied = match self.clamp_limit {
            Some(limit) => action.clamp(-limit, limit),
            None => action,
        };
        self.applied_log.lock().unwrap().push(applied);
        applied
    }

    fn get_error(&self) -> Option<String> {
        let threshold = self.error_after_observations.load(Ordering::SeqCst);
        if threshold > 0 && self.observation_count.load(Ordering::SeqCst) >= threshold {
            return Some(self.error_message.lock().unwrap().clone());
        }
        None
    }

    fn shutdown(&self) {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
    }
}
