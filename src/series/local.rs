//! 进程内时间序列实现
//!
//! 环形缓冲区 + `parking_lot` Mutex/Condvar。锁内不做分配以外的
//! 重活，临界区只覆盖环槽读写；所有阻塞都切成 [`WAIT_SLICE`]
//! 粒度，以便观察全局中断标志。

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};

use crate::error::SeriesError;
use crate::series::{TimeIndex, TimeSeries, WAIT_SLICE};
use crate::signal;

/// 默认历史长度
pub const DEFAULT_HISTORY: usize = 1000;

struct Inner<T> {
    /// 环形缓冲区，元素为 (值, 提交时间戳毫秒)
    buffer: VecDeque<(T, f64)>,
    /// 至今 append 的总次数（最新索引 = count - 1）
    count: u64,
    /// 上一次写入的时间戳，用于保证时间戳列单调不减
    last_timestamp_ms: f64,
}

/// 进程内有界阻塞日志
///
/// # Example
///
/// ```
/// use servolink::series::{LocalTimeSeries, TimeSeries};
///
/// let series = LocalTimeSeries::new(100);
/// let t = series.append(42_i32);
/// assert_eq!(t, 0);
/// assert_eq!(series.at(0).unwrap(), 42);
/// ```
pub struct LocalTimeSeries<T> {
    inner: Mutex<Inner<T>>,
    appended: Condvar,
    history: usize,
}

impl<T: Clone> LocalTimeSeries<T> {
    /// 创建历史长度为 `history` 的序列
    ///
    /// `history` 为 0 时按 1 处理（至少保留最新元素）。
    pub fn new(history: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: VecDeque::with_capacity(history.max(1)),
                count: 0,
                last_timestamp_ms: 0.0,
            }),
            appended: Condvar::new(),
            history: history.max(1),
        }
    }

    /// 仍保留的最老索引（序列为空时无意义，调用方先检查 count）
    fn oldest_index(inner: &Inner<T>) -> u64 {
        inner.count - inner.buffer.len() as u64
    }

    /// 读取索引处的 (值, 时间戳)，带阻塞与淘汰检查
    fn get(&self, index: TimeIndex) -> Result<(T, f64), SeriesError> {
        let mut inner = self.inner.lock();
        loop {
            if inner.count > index {
                let oldest = Self::oldest_index(&inner);
                if index < oldest {
                    return Err(SeriesError::Evicted { index, oldest });
                }
                let slot = (index - oldest) as usize;
                let (value, ts) = &inner.buffer[slot];
                return Ok((value.clone(), *ts));
            }

            // 索引还在未来：切片等待，期间检查全局中断
            if signal::is_interrupted() {
                return Err(SeriesError::Interrupted);
            }
            self.appended.wait_for(&mut inner, WAIT_SLICE);
        }
    }
}

fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
        * 1000.0
}

impl<T: Clone + Send> TimeSeries<T> for LocalTimeSeries<T> {
    fn append(&self, value: T) -> TimeIndex {
        let mut inner = self.inner.lock();

        // 墙钟可能被 NTP 回拨，这里夹紧保证时间戳列单调不减
        let timestamp_ms = now_ms().max(inner.last_timestamp_ms);
        inner.last_timestamp_ms = timestamp_ms;

        if inner.buffer.len() == self.history {
            inner.buffer.pop_front();
        }
        inner.buffer.push_back((value, timestamp_ms));

        let assigned = inner.count;
        inner.count += 1;
        drop(inner);

        self.appended.notify_all();
        assigned
    }

    fn newest_index(&self) -> Option<TimeIndex> {
        let inner = self.inner.lock();
        inner.count.checked_sub(1)
    }

    fn newest_element(&self) -> Result<T, SeriesError> {
        let inner = self.inner.lock();
        match inner.buffer.back() {
            Some((value, _)) => Ok(value.clone()),
            None => Err(SeriesError::Empty),
        }
    }

    fn at(&self, index: TimeIndex) -> Result<T, SeriesError> {
        self.get(index).map(|(value, _)| value)
    }

    fn timestamp_ms(&self, index: TimeIndex) -> Result<f64, SeriesError> {
        self.get(index).map(|(_, ts)| ts)
    }

    fn wait_for_index(&self, index: TimeIndex, timeout: Duration) -> bool {
        // Duration::MAX 加法会溢出，None 表示无截止时间
        let deadline = Instant::now().checked_add(timeout);

        let mut inner = self.inner.lock();
        while inner.count <= index {
            let slice = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    remaining.min(WAIT_SLICE)
                },
                None => WAIT_SLICE,
            };
            self.appended.wait_for(&mut inner, slice);
        }
        true
    }

    fn length(&self) -> u64 {
        self.inner.lock().count
    }
}
