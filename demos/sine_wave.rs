//! 正弦跟踪演示
//!
//! 用一个模拟单关节驱动演示完整控制链路：后端按驱动节拍逐步
//! 推进，前端以 100Hz 供给正弦位置目标。Ctrl-C 有序退出。
//!
//! ```bash
//! cargo run --example sine_wave
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use servolink::prelude::*;
use servolink::signal;
use tracing::info;

/// 模拟单关节硬件：观测 = 当前位置，动作 = 目标位置
struct SimulatedJoint {
    position: Mutex<f64>,
}

impl SimulatedJoint {
    /// 关节每步最多移动的行程（模拟速度限制 = 安全钳位）
    const MAX_STEP: f64 = 0.05;
}

impl RobotDriver<f64, f64> for SimulatedJoint {
    fn initialize(&self) {
        info!("simulated joint initialized");
    }

    fn get_latest_observation(&self) -> f64 {
        // 10ms 节拍（100Hz 控制频率）
        std::thread::sleep(Duration::from_millis(10));
        *self.position.lock()
    }

    fn apply_action(&self, action: f64) -> f64 {
        let mut position = self.position.lock();
        let clamped = action.clamp(*position - Self::MAX_STEP, *position + Self::MAX_STEP);
        *position = clamped;
        clamped
    }

    fn get_error(&self) -> Option<String> {
        None
    }

    fn shutdown(&self) {
        info!("simulated joint stopped at {:.3} rad", *self.position.lock());
    }
}

fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let driver = Arc::new(SimulatedJoint {
        position: Mutex::new(0.0),
    });
    let data = Arc::new(RobotData::<f64, f64>::new(1000));

    let backend = RobotBackend::new(driver, data.clone(), None);
    backend.initialize();
    // 客户端最多迟到 3 步
    backend.set_max_action_repetitions(3);

    let frontend = RobotFrontend::new(data);

    info!("tracking a 0.5Hz sine wave; press Ctrl-C to stop");
    let mut t = 0_u64;
    while backend.is_running() && !signal::is_interrupted() {
        let target = (t as f64 * 0.01 * std::f64::consts::PI).sin();
        let index = frontend.append_desired_action(target);

        match frontend.get_applied_action(index) {
            Ok(applied) => {
                if index % 100 == 0 {
                    let observation = frontend.get_observation(index).unwrap_or(f64::NAN);
                    info!(
                        "step {index}: goal {target:.3}, applied {applied:.3}, position {observation:.3}"
                    );
                }
            },
            Err(e) => {
                info!("stopping: {e}");
                break;
            },
        }
        t += 1;
    }

    backend.request_shutdown();
    backend.wait_until_terminated();
    info!("backend terminated");
}
