//! 控制循环检查点计时
//!
//! 每步在六个内部检查点打点，周期性输出各段耗时统计，用于观察
//! 循环节拍与定位抖动来源（例如观测 append 偶发超过 2ms 的
//! 优先级反转问题）。只被工作线程访问，无需同步。

use std::time::{Duration, Instant};

use tracing::info;

/// 每隔多少步输出一次统计
pub const STATISTICS_INTERVAL: u64 = 5000;

/// 循环内的六个检查点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// 驱动取观测
    GetObservation = 0,
    /// 观测写入序列
    AppendObservation = 1,
    /// 策略判定 + 状态写入
    Status = 2,
    /// 等待并取出期望动作
    GetAction = 3,
    /// 驱动执行动作
    ApplyAction = 4,
    /// 实际动作写入序列
    AppendAppliedAction = 5,
}

impl Checkpoint {
    const COUNT: usize = 6;

    fn label(self) -> &'static str {
        match self {
            Checkpoint::GetObservation => "get observation",
            Checkpoint::AppendObservation => "append observation",
            Checkpoint::Status => "status",
            Checkpoint::GetAction => "get action",
            Checkpoint::ApplyAction => "apply action",
            Checkpoint::AppendAppliedAction => "append applied action",
        }
    }

    fn all() -> [Checkpoint; Self::COUNT] {
        [
            Checkpoint::GetObservation,
            Checkpoint::AppendObservation,
            Checkpoint::Status,
            Checkpoint::GetAction,
            Checkpoint::ApplyAction,
            Checkpoint::AppendAppliedAction,
        ]
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    count: u64,
    total: Duration,
    max: Duration,
}

/// 检查点计时器
///
/// `start()` 开始一步，随后按顺序 `checkpoint(..)`，每个检查点
/// 记录与上一个打点之间的耗时。
pub struct CheckpointTimer {
    buckets: [Bucket; Checkpoint::COUNT],
    last_mark: Instant,
}

impl CheckpointTimer {
    pub fn new() -> Self {
        Self {
            buckets: [Bucket::default(); Checkpoint::COUNT],
            last_mark: Instant::now(),
        }
    }

    /// 开始新的一步
    pub fn start(&mut self) {
        self.last_mark = Instant::now();
    }

    /// 记录一个检查点（耗时 = 距上一个打点）
    pub fn checkpoint(&mut self, point: Checkpoint) {
        let now = Instant::now();
        let elapsed = now - self.last_mark;
        self.last_mark = now;

        let bucket = &mut self.buckets[point as usize];
        bucket.count += 1;
        bucket.total += elapsed;
        bucket.max = bucket.max.max(elapsed);
    }

    /// 输出累计统计并清零
    pub fn log_statistics(&mut self, step: u64) {
        for point in Checkpoint::all() {
            let bucket = self.buckets[point as usize];
            if bucket.count == 0 {
                continue;
            }
            let average = bucket.total / bucket.count as u32;
            info!(
                step,
                checkpoint = point.label(),
                average_us = average.as_micros() as u64,
                max_us = bucket.max.as_micros() as u64,
                "loop timing"
            );
        }
        self.buckets = [Bucket::default(); Checkpoint::COUNT];
    }
}

impl Default for CheckpointTimer {
    fn default() -> Self {
        Self::new()
    }
}
