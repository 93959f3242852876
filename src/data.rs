//! 机器人数据包
//!
//! 把四条时间序列捆成一个被动数据对象：期望动作、实际动作、
//! 观测、状态。后端与前端都持有它的 `Arc`，互不拥有对方。
//!
//! 写入方约定（见并发模型）：
//! - `desired_action`：前端写入；后端仅在重复上一动作时写入
//! - `applied_action` / `observation` / `status`：仅后端写入

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DataError;
use crate::series::{LocalTimeSeries, ShmSeriesConfig, ShmTimeSeries, TimeSeries};
use crate::status::Status;

/// 默认历史长度
pub const DEFAULT_HISTORY: usize = 1000;

/// 四条流的数据包
///
/// `A` 为动作类型，`O` 为观测类型；核心把它们当作不透明值透传。
/// 不变式：第 t 步完成后，四条序列都包含索引 t。
pub struct RobotData<A, O> {
    /// 期望动作（前端生产，后端消费）
    pub desired_action: Arc<dyn TimeSeries<A>>,
    /// 实际动作（驱动安全钳位后真正执行的动作）
    pub applied_action: Arc<dyn TimeSeries<A>>,
    /// 观测
    pub observation: Arc<dyn TimeSeries<O>>,
    /// 每步状态
    pub status: Arc<dyn TimeSeries<Status>>,
}

impl<A, O> RobotData<A, O>
where
    A: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    /// 单进程数据包（历史长度 `history`，默认用 [`DEFAULT_HISTORY`]）
    pub fn new(history: usize) -> Self {
        Self {
            desired_action: Arc::new(LocalTimeSeries::new(history)),
            applied_action: Arc::new(LocalTimeSeries::new(history)),
            observation: Arc::new(LocalTimeSeries::new(history)),
            status: Arc::new(LocalTimeSeries::new(history)),
        }
    }
}

impl<A, O> Default for RobotData<A, O>
where
    A: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl<A, O> RobotData<A, O>
where
    A: Serialize + DeserializeOwned + Send + 'static,
    O: Serialize + DeserializeOwned + Send + 'static,
{
    /// 多进程数据包
    ///
    /// 四条序列放进以 `prefix` 命名的共享内存段
    /// （`/{prefix}__desired_action` 等）。恰好一个进程以
    /// `is_master = true` 创建段，其余进程 attach。master 的
    /// `RobotData` drop 时段被 unlink。
    ///
    /// 宿主需保证 master 先启动；attach 在 master 创建前调用会
    /// 返回错误。
    pub fn new_multi_process(
        shared_memory_id_prefix: &str,
        is_master: bool,
        history: usize,
    ) -> Result<Self, DataError> {
        let config = ShmSeriesConfig {
            history,
            ..Default::default()
        };

        let open_action = |field: &str| -> Result<Arc<dyn TimeSeries<A>>, DataError> {
            let name = segment_name(shared_memory_id_prefix, field)?;
            let series = if is_master {
                ShmTimeSeries::create(&name, config.clone())?
            } else {
                ShmTimeSeries::attach(&name)?
            };
            Ok(Arc::new(series))
        };

        let desired_action = open_action("desired_action")?;
        let applied_action = open_action("applied_action")?;

        let observation: Arc<dyn TimeSeries<O>> = {
            let name = segment_name(shared_memory_id_prefix, "observation")?;
            Arc::new(if is_master {
                ShmTimeSeries::create(&name, config.clone())?
            } else {
                ShmTimeSeries::attach(&name)?
            })
        };

        let status: Arc<dyn TimeSeries<Status>> = {
            let name = segment_name(shared_memory_id_prefix, "status")?;
            Arc::new(if is_master {
                ShmTimeSeries::create(&name, config.clone())?
            } else {
                ShmTimeSeries::attach(&name)?
            })
        };

        Ok(Self {
            desired_action,
            applied_action,
            observation,
            status,
        })
    }
}

fn segment_name(prefix: &str, field: &str) -> Result<String, DataError> {
    if prefix.is_empty() || prefix.contains('/') {
        return Err(DataError::InvalidName(format!(
            "shared memory prefix must be non-empty and slash-free: '{prefix}'"
        )));
    }
    Ok(format!("/{prefix}__{field}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ErrorKind;

    #[test]
    fn test_single_process_data() {
        let data: RobotData<f64, f64> = RobotData::new(10);

        assert_eq!(data.desired_action.append(1.0), 0);
        assert_eq!(data.observation.append(2.0), 0);
        assert_eq!(data.applied_action.append(1.5), 0);
        assert_eq!(data.status.append(Status::default()), 0);

        assert_eq!(data.desired_action.at(0).unwrap(), 1.0);
        assert_eq!(data.status.at(0).unwrap().error_kind, ErrorKind::None);
    }

    #[test]
    fn test_series_are_independent() {
        let data: RobotData<i32, i32> = RobotData::new(10);
        data.desired_action.append(1);
        data.desired_action.append(2);
        assert_eq!(data.desired_action.newest_index(), Some(1));
        assert_eq!(data.observation.newest_index(), None);
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let result: Result<RobotData<f64, f64>, _> = RobotData::new_multi_process("bad/prefix", true, 10);
        assert!(matches!(result, Err(DataError::InvalidName(_))));

        let result: Result<RobotData<f64, f64>, _> = RobotData::new_multi_process("", true, 10);
        assert!(matches!(result, Err(DataError::InvalidName(_))));
    }

    #[test]
    fn test_attach_without_master_fails() {
        let result: Result<RobotData<f64, f64>, _> =
            RobotData::new_multi_process("servolink_no_master_here", false, 10);
        assert!(result.is_err());
    }
}
