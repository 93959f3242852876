//! 数据记录器
//!
//! 可选组件：独立线程跟随后端进度，把每步的
//! (观测, 实际动作, 状态) 快照成一行 JSON 追加到文件
//! （newline-delimited records）。显式启动/停止；句柄 drop 时
//! 线程同样会退出并冲刷缓冲，但不返回写入结果——建议总是显式
//! 调用 [`DataLogger::stop`] 拿到错误与计数。
//!
//! 全局中断（SIGINT / `request_global_shutdown`）被视同停止
//! 请求：后端被中断后不再产生数据，记录线程排空已完成的步、
//! 冲刷后自行退出，不依赖宿主记得调用 `stop`。

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};
use serde::Serialize;
use tracing::{debug, error};

use crate::data::RobotData;
use crate::series::{TimeIndex, TimeSeries, WAIT_SLICE};
use crate::signal;
use crate::status::Status;

/// 记录器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerConfig {
    /// 每写入多少条记录冲刷一次缓冲
    pub flush_interval: u64,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { flush_interval: 100 }
    }
}

/// 单条记录（文件中的一行）
#[derive(Serialize)]
struct LogRecord<'a, A, O> {
    time_index: TimeIndex,
    timestamp_ms: f64,
    observation: &'a O,
    /// 循环在提交实际动作之前退出的步（最后一个出错步，或关停
    /// 打断的在途步）记为 `null`
    applied_action: Option<&'a A>,
    status: &'a Status,
}

/// 数据记录器句柄
pub struct DataLogger {
    /// drop 掉发送端即通知线程退出（线程以 Disconnected 判停）
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<io::Result<u64>>>,
}

impl DataLogger {
    /// 启动记录线程，向 `path` 追写 NDJSON
    pub fn start<A, O>(
        data: Arc<RobotData<A, O>>,
        path: impl AsRef<Path>,
        config: Option<LoggerConfig>,
    ) -> io::Result<Self>
    where
        A: Serialize + Clone + Send + 'static,
        O: Serialize + Clone + Send + 'static,
    {
        let file = File::create(path.as_ref())?;
        let writer = BufWriter::new(file);
        let config = config.unwrap_or_default();

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = std::thread::Builder::new()
            .name("servolink-logger".into())
            .spawn(move || logger_loop(data, writer, config, stop_rx))?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// 停止记录：排空已可用的步、冲刷并关闭文件
    ///
    /// 返回写入的记录条数。
    pub fn stop(mut self) -> io::Result<u64> {
        drop(self.stop_tx.take());
        match self.thread.take().expect("logger thread already taken").join() {
            Ok(result) => result,
            Err(_) => Err(io::Error::other("logger thread panicked")),
        }
    }
}

impl Drop for DataLogger {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.thread.take() {
            match handle.join() {
                Ok(Err(e)) => error!("data logger failed: {e}"),
                Err(_) => error!("data logger thread panicked"),
                Ok(Ok(_)) => {},
            }
        }
    }
}

/// 显式 stop 或全局中断：二者都意味着后端不会再产生数据
fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    signal::is_interrupted() || matches!(stop_rx.try_recv(), Err(TryRecvError::Disconnected))
}

fn logger_loop<A, O>(
    data: Arc<RobotData<A, O>>,
    mut writer: BufWriter<File>,
    config: LoggerConfig,
    stop_rx: Receiver<()>,
) -> io::Result<u64>
where
    A: Serialize + Clone + Send + 'static,
    O: Serialize + Clone + Send + 'static,
{
    let mut written = 0_u64;

    'steps: for t in 0.. {
        // 状态是每步最后必然提交的流（出错步也有），以它跟随进度
        while !data.status.wait_for_index(t, WAIT_SLICE) {
            if stop_requested(&stop_rx) {
                // 停止时只排空已经可用的步
                if !data.status.wait_for_index(t, std::time::Duration::ZERO) {
                    break 'steps;
                }
                break;
            }
        }

        let Ok(status) = data.status.at(t) else {
            // 记录器落后到整步被淘汰，只能跳过
            debug!("log step {t} evicted before it was written");
            continue;
        };
        let observation = match data.observation.at(t) {
            Ok(observation) => observation,
            Err(e) => {
                debug!("observation {t} unavailable ({e}), skipping record");
                continue;
            },
        };
        let timestamp_ms = data.observation.timestamp_ms(t).unwrap_or(0.0);

        // 实际动作在状态之后提交：正常步等它到达；出错步与被
        // 关停打断的在途步不会再有，记 null
        let applied_action = loop {
            if data.applied_action.wait_for_index(t, WAIT_SLICE) {
                break data.applied_action.at(t).ok();
            }
            if status.has_error() || stop_requested(&stop_rx) {
                break None;
            }
        };

        let record = LogRecord {
            time_index: t,
            timestamp_ms,
            observation: &observation,
            applied_action: applied_action.as_ref(),
            status: &status,
        };
        serde_json::to_writer(&mut writer, &record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")?;
        written += 1;

        if written % config.flush_interval == 0 {
            writer.flush()?;
        }

        // 出错步是最后一步，后面不会再有数据
        if status.has_error() {
            break;
        }
    }

    writer.flush()?;
    debug!("data logger wrote {written} records");
    Ok(written)
}
