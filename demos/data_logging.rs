//! 数据记录演示
//!
//! 在控制循环旁挂一个 `DataLogger`，把每步快照写成 NDJSON，
//! 跑一段后停止并打印统计。
//!
//! ```bash
//! cargo run --example data_logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use servolink::prelude::*;
use tracing::info;

/// 最简驱动：观测 = 步计数，动作原样执行
struct CountingDriver {
    count: AtomicU64,
}

impl RobotDriver<f64, f64> for CountingDriver {
    fn initialize(&self) {}

    fn get_latest_observation(&self) -> f64 {
        std::thread::sleep(Duration::from_millis(5));
        self.count.fetch_add(1, Ordering::Relaxed) as f64
    }

    fn apply_action(&self, action: f64) -> f64 {
        action
    }

    fn get_error(&self) -> Option<String> {
        None
    }

    fn shutdown(&self) {}
}

fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let data = Arc::new(RobotData::<f64, f64>::new(1000));
    let driver = Arc::new(CountingDriver {
        count: AtomicU64::new(0),
    });

    // 上限 100 步，到达后循环自行结束
    let config = BackendConfig {
        max_number_of_actions: 100,
        ..Default::default()
    };
    let backend = RobotBackend::new(driver, data.clone(), Some(config));
    backend.initialize();

    let log_path = std::env::temp_dir().join("servolink_demo.ndjson");
    let logger = DataLogger::start(data.clone(), &log_path, None)?;
    info!("logging to {}", log_path.display());

    let frontend = RobotFrontend::new(data);
    for i in 0..100 {
        frontend.append_desired_action(i as f64 * 0.1);
    }

    backend.wait_until_terminated();
    let records = logger.stop()?;
    info!("wrote {records} records to {}", log_path.display());

    Ok(())
}
