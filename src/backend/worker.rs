//! 控制循环主体
//!
//! 独立的实时工作线程函数：每步从驱动取观测、按实时准入策略
//! 取（或重复）期望动作、执行并回写实际动作与状态。循环从不向
//! 外抛错误——所有故障都物化为一条非 NONE 状态，然后有序停机。

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, error};

use crate::backend::BackendContext;
use crate::backend::timing::{Checkpoint, CheckpointTimer, STATISTICS_INTERVAL};
use crate::error::SeriesError;
use crate::series::{TimeIndex, TimeSeries, WAIT_SLICE};
use crate::status::{ErrorKind, Status};

/// 工作线程入口
///
/// 生命周期：等首个期望动作（Phase A）→ 逐步迭代（Phase B）→
/// 驱动停机、清掉运行标志。
pub(crate) fn control_loop<A, O>(ctx: Arc<BackendContext<A, O>>)
where
    A: Clone + Send + 'static,
    O: Clone + Send + 'static,
{
    #[cfg(feature = "realtime")]
    {
        use tracing::{info, warn};

        match thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max) {
            Ok(()) => info!("control loop thread priority set to MAX (realtime)"),
            Err(e) => warn!(
                "failed to elevate control loop thread priority: {e:?}. \
                 On Linux this may require CAP_SYS_NICE; running best-effort.",
            ),
        }
    }

    let data = &ctx.data;
    let start_time = Instant::now();

    // ============================================================
    // Phase A：等待客户端提供第一个期望动作
    // ============================================================
    while !ctx.has_shutdown_request() && !data.desired_action.wait_for_index(0, WAIT_SLICE) {
        let timed_out = ctx
            .config
            .first_action_timeout
            .is_some_and(|timeout| start_time.elapsed() > timeout);
        if timed_out {
            let mut status = Status::default();
            status.set_error(ErrorKind::BackendError, "First action was not provided in time");
            data.status.append(status.clone());

            error!("{}; robot is shut down", status.error_message);
            ctx.request_shutdown();
            break;
        }
    }

    // ============================================================
    // Phase B：逐步迭代
    // ============================================================
    let mut timer = CheckpointTimer::new();
    let max_number_of_actions = u64::from(ctx.config.max_number_of_actions);

    let mut t: TimeIndex = 0;
    while !ctx.has_shutdown_request() {
        let mut status = Status::default();

        if max_number_of_actions > 0 && t >= max_number_of_actions {
            status.set_error(ErrorKind::BackendError, "Maximum number of actions reached");
        }

        timer.start();

        // 取最新观测并写入序列。这一步必须先于下面的期望动作
        // 等待：第 t 步的状态/实际动作提交之前，索引 t 的观测
        // 已经对读者可见。
        let observation = ctx.driver.get_latest_observation();
        timer.checkpoint(Checkpoint::GetObservation);

        data.observation.append(observation);
        timer.checkpoint(Checkpoint::AppendObservation);

        // 实时准入策略：动作迟到时重复上一动作或判错
        if ctx.config.real_time_mode
            && data.desired_action.newest_index().is_none_or(|newest| newest < t)
        {
            let repetitions = data
                .status
                .newest_element()
                .map(|s| s.action_repetitions)
                .unwrap_or(0);

            if repetitions < ctx.max_action_repetitions.load(Ordering::Relaxed) {
                match data.desired_action.newest_element() {
                    Ok(last_action) => {
                        data.desired_action.append(last_action);
                        status.action_repetitions = repetitions + 1;
                    },
                    // 没有可重复的动作（不应发生：Phase A 保证
                    // 索引 0 已存在），按迟到判错
                    Err(_) => {
                        status.set_error(
                            ErrorKind::BackendError,
                            "Next action was not provided in time",
                        );
                    },
                }
            } else {
                status.set_error(ErrorKind::BackendError, "Next action was not provided in time");
            }
        }

        // 期望动作已在序列里时提前探测淘汰：客户端把整个历史
        // 套圈的情况必须记进本步状态（状态追加之后就没有机会
        // 补记了）
        if !status.has_error()
            && data.desired_action.newest_index().is_some_and(|newest| newest >= t)
            && let Err(SeriesError::Evicted { .. }) = data.desired_action.at(t)
        {
            status.set_error(ErrorKind::BackendError, "Desired action was dropped from history");
        }

        // 轮询驱动故障；驱动错误覆盖本步已设置的后端错误
        if let Some(driver_error) = ctx.driver.get_error() {
            status.set_error(ErrorKind::DriverError, driver_error);
        }

        data.status.append(status.clone());

        // 有错即停：消息只向操作员通道输出一次
        if status.has_error() {
            error!("{}; robot is shut down", status.error_message);
            break;
        }
        timer.checkpoint(Checkpoint::Status);

        // 等待生产者。非实时模式下这是唯一的节拍约束，会无限
        // 阻塞；切片轮询保证关停请求 100ms 内被观察到。
        while !ctx.has_shutdown_request() && !data.desired_action.wait_for_index(t, WAIT_SLICE) {}
        if ctx.has_shutdown_request() {
            break;
        }

        let desired_action = match data.desired_action.at(t) {
            Ok(action) => action,
            // 淘汰在状态追加之前已经探测过；这里只剩等待窗口内
            // 被套圈的竞态，按被打断的在途步处理（status[t] 已
            // 提交为 NONE，applied[t] 不再产生）
            Err(e) => {
                error!("desired action {t} unavailable ({e}); robot is shut down");
                break;
            },
        };
        timer.checkpoint(Checkpoint::GetAction);

        let applied_action = ctx.driver.apply_action(desired_action);
        timer.checkpoint(Checkpoint::ApplyAction);

        data.applied_action.append(applied_action);
        timer.checkpoint(Checkpoint::AppendAppliedAction);

        if t > 0 && t % STATISTICS_INTERVAL == 0 {
            timer.log_statistics(t);
        }

        t += 1;
    }

    // ============================================================
    // 有序停机
    // ============================================================
    ctx.driver.shutdown();
    // Release: all series writes above are visible to threads that
    // observe loop_is_running == false.
    ctx.loop_is_running.store(false, Ordering::Release);
    debug!("control loop exited after {t} steps");
}
