//! 硬件驱动契约
//!
//! 后端消费的能力集合：初始化、取最新观测、执行动作、读故障、
//! 安全停机。驱动由后端独占调用（全部发生在工作线程上，外加
//! 宿主线程经 `RobotBackend::initialize` 的一次委托），实现方
//! 以内部可变性满足 `&self` 签名。

mod monitor;

pub use monitor::{MonitorConfig, MonitoredDriver};

/// 机器人硬件驱动
///
/// 所有方法都是同步阻塞的，在后端工作线程上调用。
///
/// 节拍约定：`get_latest_observation` 可以短暂阻塞以对齐硬件
/// 节拍——整个控制循环的步进频率就由它决定；它不得返回比上一步
/// 更旧的读数。
pub trait RobotDriver<A, O>: Send + Sync {
    /// 准备硬件
    ///
    /// 在循环做有用功之前由宿主通过 `RobotBackend::initialize`
    /// 调用一次。失败通过后续 `get_error` 上报。
    fn initialize(&self);

    /// 返回最新传感器读数（可短暂阻塞，决定循环节拍）
    fn get_latest_observation(&self) -> O;

    /// 在硬件上执行动作，返回实际执行的动作（安全钳位后）
    fn apply_action(&self, action: A) -> A;

    /// 读取故障信息
    ///
    /// `None` 表示无故障。读取无副作用；故障一旦出现即视为
    /// 锁存，直到停机。
    fn get_error(&self) -> Option<String>;

    /// 把硬件带到安全停止状态
    ///
    /// 幂等；不得 panic。
    fn shutdown(&self);
}
