//! 后端模块
//!
//! [`RobotBackend`] 是驱动与数据包之间的通信纽带：构造即启动
//! 一个实时工作线程跑控制循环（见 [`worker`] 模块），析构时请求
//! 关停并回收线程。生命周期：
//!
//! ```text
//! CREATED ──initialize()──▶ READY ──首次迭代──▶ RUNNING
//! RUNNING ──error|limit|signal|request──▶ STOPPING
//!          ──driver.shutdown()──▶ TERMINATED
//! ```
//!
//! `loop_is_running` 在 {READY, RUNNING, STOPPING} 为 true；
//! TERMINATED 为终态，无回边。

pub(crate) mod timing;
mod worker;

pub use timing::{Checkpoint, CheckpointTimer, STATISTICS_INTERVAL};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::error;

use crate::data::RobotData;
use crate::driver::RobotDriver;
use crate::series::WAIT_SLICE;
use crate::signal;

/// 后端配置
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use servolink::backend::BackendConfig;
///
/// // 默认：实时模式，无首动作超时，不限动作数
/// let config = BackendConfig::default();
///
/// // 自定义
/// let config = BackendConfig {
///     real_time_mode: true,
///     first_action_timeout: Some(Duration::from_secs(10)),
///     max_number_of_actions: 1000,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// 实时模式
    ///
    /// 开启时要求客户端按时供给动作：迟到的动作按重复策略处理，
    /// 重复次数耗尽即判错停机。关闭时循环单纯阻塞等待下一动作。
    pub real_time_mode: bool,

    /// 首动作超时
    ///
    /// 从循环启动到收到第一个客户端动作的墙钟时限；超时即判错
    /// 停机。`None` 表示不限时。
    pub first_action_timeout: Option<Duration>,

    /// 动作总数上限（0 = 不限）
    ///
    /// 达到上限后循环以 BACKEND_ERROR 结束（保留原始分类语义）。
    pub max_number_of_actions: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            real_time_mode: true,
            first_action_timeout: None,
            max_number_of_actions: 0,
        }
    }
}

/// 工作线程与宿主共享的上下文
pub(crate) struct BackendContext<A, O> {
    pub driver: Arc<dyn RobotDriver<A, O>>,
    pub data: Arc<RobotData<A, O>>,
    pub config: BackendConfig,
    /// 关停请求标志，循环每次迭代与每个等待切片检查
    pub is_shutdown_requested: AtomicBool,
    /// 循环存活标志（READY/RUNNING/STOPPING 为 true）
    pub loop_is_running: AtomicBool,
    /// 运行期可调：动作迟到时最多自动重复上一动作的次数
    pub max_action_repetitions: AtomicU32,
}

impl<A, O> BackendContext<A, O> {
    pub(crate) fn has_shutdown_request(&self) -> bool {
        // Acquire pairs with the Release store in request_shutdown
        self.is_shutdown_requested.load(Ordering::Acquire) || signal::is_interrupted()
    }

    pub(crate) fn request_shutdown(&self) {
        self.is_shutdown_requested.store(true, Ordering::Release);
    }
}

/// 机器人后端：驱动与数据包之间的控制循环
///
/// 构造后立即返回；硬件初始化须由宿主显式调用
/// [`RobotBackend::initialize`]。析构时请求关停并等待工作线程
/// 退出。
pub struct RobotBackend<A, O> {
    ctx: Arc<BackendContext<A, O>>,
    worker: Option<JoinHandle<()>>,
}

impl<A, O> RobotBackend<A, O>
where
    A: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    /// 创建后端并启动工作线程
    ///
    /// # 参数
    /// - `driver`: 硬件驱动（后端独占调用）
    /// - `data`: 数据包（与前端共享）
    /// - `config`: 后端配置，`None` 用默认值
    pub fn new(
        driver: Arc<dyn RobotDriver<A, O>>,
        data: Arc<RobotData<A, O>>,
        config: Option<BackendConfig>,
    ) -> Self {
        // 进程级中断处理器：幂等安装，多个后端共享同一标志
        signal::install();

        let ctx = Arc::new(BackendContext {
            driver,
            data,
            config: config.unwrap_or_default(),
            is_shutdown_requested: AtomicBool::new(false),
            loop_is_running: AtomicBool::new(true),
            max_action_repetitions: AtomicU32::new(0),
        });

        let worker = {
            let ctx = ctx.clone();
            std::thread::Builder::new()
                .name("servolink-backend".into())
                .spawn(move || worker::control_loop(ctx))
                .expect("failed to spawn backend worker thread")
        };

        Self {
            ctx,
            worker: Some(worker),
        }
    }

    /// 初始化硬件（委托给驱动）
    ///
    /// 失败由驱动经 `get_error` 上报，循环会在下一步把它物化为
    /// DRIVER_ERROR 状态。
    pub fn initialize(&self) {
        self.ctx.driver.initialize();
    }

    /// 请求关停（幂等）
    ///
    /// 循环可能还需要最多一个等待切片加一次驱动调用才真正退出；
    /// 用 [`RobotBackend::wait_until_terminated`] 确认。
    pub fn request_shutdown(&self) {
        self.ctx.request_shutdown();
    }

    /// 阻塞直到循环退出（每 100ms 轮询一次存活标志）
    pub fn wait_until_terminated(&self) {
        while self.ctx.loop_is_running.load(Ordering::Acquire) {
            std::thread::sleep(WAIT_SLICE);
        }
    }

    /// 循环是否仍在运行
    pub fn is_running(&self) -> bool {
        self.ctx.loop_is_running.load(Ordering::Acquire)
    }

    /// 设置动作迟到时的最大自动重复次数（默认 0，不重复）
    ///
    /// 超过该次数后循环以 BACKEND_ERROR 停机。非实时模式下此
    /// 设置无效。
    pub fn set_max_action_repetitions(&self, max_action_repetitions: u32) {
        self.ctx
            .max_action_repetitions
            .store(max_action_repetitions, Ordering::Relaxed);
    }

    /// 读取当前的最大重复次数
    pub fn get_max_action_repetitions(&self) -> u32 {
        self.ctx.max_action_repetitions.load(Ordering::Relaxed)
    }
}

impl<A, O> Drop for RobotBackend<A, O> {
    fn drop(&mut self) {
        self.ctx.request_shutdown();

        if let Some(handle) = self.worker.take() {
            // 有界 join：循环最坏在一个等待切片加一次驱动调用内
            // 退出；卡在驱动里的线程交给进程退出清理
            if join_timeout(handle, Duration::from_secs(5)).is_err() {
                error!("backend worker did not shut down in time (stuck in a driver call?)");
            }
        }
    }
}

/// 带超时的线程 join
///
/// 目标线程交给一个看护线程去 join，自己只在通道上限时等待。
/// 超时后看护线程继续收尾，由进程退出兜底。
fn join_timeout(handle: JoinHandle<()>, timeout: Duration) -> Result<(), ()> {
    use std::sync::mpsc;

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = handle.join();
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) => {
            error!("backend worker thread panicked");
            Err(())
        },
        Err(_) => Err(()),
    }
}
