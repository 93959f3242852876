//! 时间序列模块
//!
//! 时间序列是本仓库唯一的同步原语：一个有界、单调索引的日志，
//! 支持阻塞等待未来索引。后端与前端之间的全部数据交换都经过它。
//!
//! - [`LocalTimeSeries`]：进程内实现（Mutex + Condvar）
//! - [`ShmTimeSeries`]：跨进程实现（命名共享内存段 + seqlock 槽）
//!
//! 两者通过 [`TimeSeries`] trait 统一，`RobotData` 以
//! `Arc<dyn TimeSeries<T>>` 持有。

mod local;
mod segment;
mod shm;

pub use local::LocalTimeSeries;
pub use segment::ShmSegment;
pub use shm::{ShmSeriesConfig, ShmTimeSeries};

use std::time::Duration;

use crate::error::SeriesError;

/// 单调步计数器，从 0 开始，每次 append 递增 1，永不复用。
pub type TimeIndex = u64;

/// 阻塞等待的切片长度
///
/// 所有不带调用方超时的阻塞等待都以该粒度轮询，以便及时观察到
/// 全局中断标志。该值同时决定了关闭请求到循环退出的最坏延迟。
pub const WAIT_SLICE: Duration = Duration::from_millis(100);

/// 有界阻塞日志的操作契约
///
/// # 并发契约
///
/// - 多生产者多消费者；`append` 串行化。
/// - 索引连续、严格 +1 递增、永不复用。
/// - 读者看到的任意单个元素都是一致快照（无撕裂读）。
/// - 时间戳列随索引单调不减。
/// - 允许虚假唤醒：`wait_for_index` 的返回值以重新检查后的
///   真值为准。
pub trait TimeSeries<T>: Send + Sync {
    /// 追加一个元素，返回分配到的时间索引
    ///
    /// 超过历史长度时淘汰最老元素。同时记录墙钟时间戳（毫秒）。
    fn append(&self, value: T) -> TimeIndex;

    /// 最新索引；序列为空时返回 `None`
    fn newest_index(&self) -> Option<TimeIndex>;

    /// 最新元素
    ///
    /// # 错误
    /// - `SeriesError::Empty`: 序列为空
    fn newest_element(&self) -> Result<T, SeriesError>;

    /// 读取索引 `index` 处的元素
    ///
    /// 若 `index` 尚未写入则阻塞等待；若已被淘汰返回
    /// `SeriesError::Evicted`；阻塞期间收到全局中断返回
    /// `SeriesError::Interrupted`。
    fn at(&self, index: TimeIndex) -> Result<T, SeriesError>;

    /// 读取索引 `index` 的提交时间戳（Unix 毫秒）
    ///
    /// 阻塞/淘汰语义与 [`TimeSeries::at`] 相同。
    fn timestamp_ms(&self, index: TimeIndex) -> Result<f64, SeriesError>;

    /// 等待索引 `index` 出现
    ///
    /// 在 `timeout` 之前出现返回 `true`，超时返回 `false`。
    fn wait_for_index(&self, index: TimeIndex, timeout: Duration) -> bool;

    /// 至今为止 append 的总次数
    fn length(&self) -> u64;
}
