//! 进程级中断标志
//!
//! 整个进程只有一个中断标志：SIGINT（Ctrl-C）处理器与
//! [`request_global_shutdown`] 写同一个 `AtomicBool`，同进程内的
//! 所有后端循环在每个等待切片检查它。安装是幂等的，后端不依赖
//! 任何特定的信号投递线程。

use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

/// 安装进程级 SIGINT 处理器（幂等）
///
/// 第一次调用注册处理器，之后的调用是空操作。注册失败只记录
/// 警告：宿主可能已经接管了信号（例如嵌入在别的框架里），此时
/// 仍可通过 [`request_global_shutdown`] 触发同一标志。
pub fn install() {
    INSTALL.call_once(|| {
        let result = ctrlc::set_handler(|| {
            INTERRUPTED.store(true, Ordering::Release);
        });
        match result {
            Ok(()) => info!("interrupt handler installed"),
            Err(e) => warn!("failed to install interrupt handler: {e}"),
        }
    });
}

/// 是否收到过中断（SIGINT 或程序化关停）
pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Acquire)
}

/// 程序化触发全局关停
///
/// 与收到 SIGINT 完全等价：同进程内所有后端有序退出，不追加
/// 错误状态。
pub fn request_global_shutdown() {
    INTERRUPTED.store(true, Ordering::Release);
}

/// 清除中断标志
///
/// 供宿主在一次有序关停处理完毕后重新武装，以及测试使用。
pub fn reset() {
    INTERRUPTED.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    // 标志翻转的行为覆盖放在 tests/signal_shutdown.rs（独立进程）：
    // 这里置位全局标志会干扰同进程并行运行的其它单元测试。

    #[test]
    fn test_starts_not_interrupted() {
        assert!(!is_interrupted());
    }

    #[test]
    fn test_install_is_idempotent() {
        install();
        install();
    }
}
