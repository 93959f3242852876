//! 前端模块
//!
//! 面向用户代码的生产者/消费者 API：注入期望动作，读取观测、
//! 实际动作与状态。前端只是数据包上的薄门面，所有阻塞都发生在
//! 时间序列内部，自身不跨挂起点持锁；阻塞读可被全局中断取消
//! （返回 `SeriesError::Interrupted`）。

use std::sync::Arc;
use std::time::Duration;

use crate::data::RobotData;
use crate::error::SeriesError;
use crate::series::{TimeIndex, WAIT_SLICE};
use crate::signal;
use crate::status::Status;

/// 客户端前端
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use servolink::{RobotData, RobotFrontend};
///
/// let data = Arc::new(RobotData::<f64, f64>::new(1000));
/// let frontend = RobotFrontend::new(data);
///
/// let t = frontend.append_desired_action(0.5);
/// let observation = frontend.get_observation(t).unwrap();
/// let applied = frontend.get_applied_action(t).unwrap();
/// ```
pub struct RobotFrontend<A, O> {
    data: Arc<RobotData<A, O>>,
}

impl<A, O> RobotFrontend<A, O>
where
    A: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    /// 在共享数据包上创建前端
    pub fn new(data: Arc<RobotData<A, O>>) -> Self {
        Self { data }
    }

    /// 追加期望动作，返回分配到的时间索引
    pub fn append_desired_action(&self, action: A) -> TimeIndex {
        self.data.desired_action.append(action)
    }

    /// 读取索引 `t` 的观测（阻塞到该步存在）
    pub fn get_observation(&self, t: TimeIndex) -> Result<O, SeriesError> {
        self.data.observation.at(t)
    }

    /// 读取索引 `t` 的期望动作（阻塞到该步存在）
    pub fn get_desired_action(&self, t: TimeIndex) -> Result<A, SeriesError> {
        self.data.desired_action.at(t)
    }

    /// 读取索引 `t` 的实际动作（阻塞到该步存在）
    pub fn get_applied_action(&self, t: TimeIndex) -> Result<A, SeriesError> {
        self.data.applied_action.at(t)
    }

    /// 读取索引 `t` 的状态（阻塞到该步存在）
    pub fn get_status(&self, t: TimeIndex) -> Result<Status, SeriesError> {
        self.data.status.at(t)
    }

    /// 读取第 `t` 步的提交时间戳（Unix 毫秒）
    ///
    /// 取观测序列的时钟列：观测是每步最先提交的数据。
    pub fn get_timestamp_ms(&self, t: TimeIndex) -> Result<f64, SeriesError> {
        self.data.observation.timestamp_ms(t)
    }

    /// 阻塞直到期望动作序列包含索引 `t`
    ///
    /// 可被全局中断取消。
    pub fn wait_until_time_index(&self, t: TimeIndex) -> Result<(), SeriesError> {
        while !self.data.desired_action.wait_for_index(t, WAIT_SLICE) {
            if signal::is_interrupted() {
                return Err(SeriesError::Interrupted);
            }
        }
        Ok(())
    }

    /// 期望动作序列的最新索引（尚无动作时为 `None`）
    pub fn get_current_time_index(&self) -> Option<TimeIndex> {
        self.data.desired_action.newest_index()
    }

    /// 等待索引 `t` 的状态出现
    ///
    /// 非阻塞读者（如监控界面）用它限时跟随循环进度。
    pub fn wait_for_status(&self, t: TimeIndex, timeout: Duration) -> bool {
        self.data.status.wait_for_index(t, timeout)
    }
}
