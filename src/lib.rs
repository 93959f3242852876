//! Servolink - 机器人控制中间件核心
//!
//! 在实时硬件驱动与共享时间索引数据存储之间做协调：后端控制
//! 循环按驱动节拍逐步推进，从数据包取期望动作、回写观测/实际
//! 动作/状态，并执行实时交付策略（迟到动作的重复或判错）、驱动
//! 故障上报与有序停机。
//!
//! # 架构
//!
//! - **数据层** (`series`, `data`, `status`): 有界时间序列与四条
//!   流的数据包，是唯一的同步原语；支持单进程与共享内存两种
//!   形态
//! - **驱动层** (`driver`): 后端消费的硬件能力契约 + 计时看门狗
//!   包装器
//! - **控制层** (`backend`): 实时工作线程上的控制循环
//! - **客户层** (`frontend`, `logger`): 用户侧生产/消费 API 与
//!   可选的 NDJSON 记录器
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use servolink::prelude::*;
//! # struct MyDriver;
//! # impl RobotDriver<f64, f64> for MyDriver {
//! #     fn initialize(&self) {}
//! #     fn get_latest_observation(&self) -> f64 { 0.0 }
//! #     fn apply_action(&self, a: f64) -> f64 { a }
//! #     fn get_error(&self) -> Option<String> { None }
//! #     fn shutdown(&self) {}
//! # }
//!
//! let data = Arc::new(RobotData::<f64, f64>::new(1000));
//! let backend = RobotBackend::new(Arc::new(MyDriver), data.clone(), None);
//! backend.initialize();
//!
//! let frontend = RobotFrontend::new(data);
//! let t = frontend.append_desired_action(0.5);
//! let observation = frontend.get_observation(t).unwrap();
//! ```

pub mod backend;
pub mod data;
pub mod driver;
pub mod error;
pub mod frontend;
pub mod logger;
pub mod prelude;
pub mod series;
pub mod signal;
pub mod status;
pub mod types;

// Re-export 核心类型（简化用户导入）
pub use backend::{BackendConfig, RobotBackend};
pub use data::RobotData;
pub use driver::{MonitorConfig, MonitoredDriver, RobotDriver};
pub use error::{DataError, SeriesError};
pub use frontend::RobotFrontend;
pub use logger::{DataLogger, LoggerConfig};
pub use series::{TimeIndex, TimeSeries};
pub use status::{ErrorKind, Status};
