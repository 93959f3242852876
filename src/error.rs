//! 错误类型定义
//!
//! 按层拆分：时间序列层（`SeriesError`）与数据存储层（`DataError`）。
//! 后端循环本身从不向外抛错误：所有故障都以 `Status` 的形式写入
//! 状态序列（见 `backend` 模块）。

use thiserror::Error;

/// 时间序列错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SeriesError {
    /// 序列为空（`newest_element` 在无任何元素时调用）
    #[error("Time series is empty")]
    Empty,

    /// 请求的索引已被环形缓冲区淘汰
    #[error("Time index {index} was dropped from history (oldest kept: {oldest})")]
    Evicted {
        /// 请求的索引
        index: u64,
        /// 仍保留的最老索引
        oldest: u64,
    },

    /// 阻塞等待期间收到全局中断
    #[error("Blocking wait was interrupted by global shutdown signal")]
    Interrupted,
}

/// 数据存储层错误类型（共享内存路径）
#[derive(Error, Debug)]
pub enum DataError {
    /// 共享内存段名称非法
    #[error("Invalid shared memory segment name: {0}")]
    InvalidName(String),

    /// 创建共享内存段失败
    #[error("Failed to create shared memory segment: {0}")]
    SegmentCreate(#[source] std::io::Error),

    /// 打开共享内存段失败（通常是 master 还未创建）
    #[error("Failed to open shared memory segment '{name}': {source}")]
    SegmentOpen {
        /// 段名称
        name: String,
        /// 底层错误
        #[source]
        source: std::io::Error,
    },

    /// 段尺寸小于头部要求
    #[error("Shared memory segment too small: {actual} bytes (need at least {required})")]
    SegmentTooSmall {
        /// 实际尺寸
        actual: usize,
        /// 要求的最小尺寸
        required: usize,
    },

    /// 段头部与期望不一致（魔数/版本/历史长度/槽尺寸）
    #[error("Shared memory header mismatch: {0}")]
    HeaderMismatch(String),
}
