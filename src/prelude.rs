//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use servolink::prelude::*;
//! ```

pub use crate::backend::{BackendConfig, RobotBackend};
pub use crate::data::RobotData;
pub use crate::driver::{MonitorConfig, MonitoredDriver, RobotDriver};
pub use crate::error::{DataError, SeriesError};
pub use crate::frontend::RobotFrontend;
pub use crate::logger::{DataLogger, LoggerConfig};
pub use crate::series::{TimeIndex, TimeSeries};
pub use crate::status::{ErrorKind, Status};
pub use crate::types::{JointAction, JointObservation};
