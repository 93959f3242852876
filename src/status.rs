//! 每步状态记录
//!
//! 后端在每个时间步向 `RobotData::status` 追加一条 `Status`，
//! 记录该步的错误类型、错误信息与动作重复计数。

use serde::{Deserialize, Serialize};

/// 每步错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// 正常步（无错误）
    None,
    /// 驱动上报的硬件故障（`RobotDriver::get_error`）
    DriverError,
    /// 后端策略错误（首动作超时 / 重复次数耗尽 / 动作数达上限）
    BackendError,
}

impl Default for ErrorKind {
    fn default() -> Self {
        ErrorKind::None
    }
}

/// 每步状态
///
/// `error_kind` / `error_message` 由 `set_error` 统一写入；
/// `action_repetitions` 独立维护：它记录上一条期望动作被后端
/// 自动重复的连续次数，`set_error` 不会覆盖它。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// 错误类型
    pub error_kind: ErrorKind,
    /// 人类可读错误信息（无错误时为空）
    pub error_message: String,
    /// 当前连续动作重复次数
    pub action_repetitions: u32,
}

impl Status {
    /// 设置错误类型与信息
    ///
    /// 只覆盖 `error_kind` 和 `error_message`，不触碰
    /// `action_repetitions`（同一步内可能先记录了重复计数，
    /// 随后又被驱动错误覆盖）。
    pub fn set_error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.error_kind = kind;
        self.error_message = message.into();
    }

    /// 该步是否有错误
    pub fn has_error(&self) -> bool {
        self.error_kind != ErrorKind::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status() {
        let status = Status::default();
        assert_eq!(status.error_kind, ErrorKind::None);
        assert_eq!(status.error_message, "");
        assert_eq!(status.action_repetitions, 0);
        assert!(!status.has_error());
    }

    #[test]
    fn test_set_error_keeps_repetitions() {
        let mut status = Status {
            action_repetitions: 2,
            ..Default::default()
        };

        status.set_error(ErrorKind::BackendError, "Next action was not provided in time");
        assert_eq!(status.error_kind, ErrorKind::BackendError);
        assert_eq!(status.error_message, "Next action was not provided in time");
        // 重复计数不被 set_error 覆盖
        assert_eq!(status.action_repetitions, 2);
        assert!(status.has_error());
    }

    #[test]
    fn test_set_error_overwrites_previous() {
        let mut status = Status::default();
        status.set_error(ErrorKind::BackendError, "Maximum number of actions reached");
        // 驱动错误覆盖后端错误（同一步内驱动故障优先）
        status.set_error(ErrorKind::DriverError, "overheat");
        assert_eq!(status.error_kind, ErrorKind::DriverError);
        assert_eq!(status.error_message, "overheat");
    }

    #[test]
    fn test_status_serde_roundtrip() {
        let mut status = Status::default();
        status.set_error(ErrorKind::DriverError, "overheat");
        status.action_repetitions = 1;

        let json = serde_json::to_string(&status).unwrap();
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
