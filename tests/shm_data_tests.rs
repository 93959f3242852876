//! 多进程数据包测试
//!
//! master 创建共享内存段，另一侧 attach，两侧经各自的
//! `RobotData` 观察同一批流。真正的多进程行为由段与 seqlock
//! 保证；这里在单进程内用两份映射验证同样的读写路径。

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::MockDriver;
use servolink::prelude::*;
use servolink::status::ErrorKind;

fn unique_prefix(tag: &str) -> String {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("servolink_test_{tag}_{ts}")
}

#[test]
fn test_master_and_attached_share_streams() {
    let prefix = unique_prefix("share");
    let master: RobotData<f64, f64> = RobotData::new_multi_process(&prefix, true, 100).unwrap();
    let attached: RobotData<f64, f64> = RobotData::new_multi_process(&prefix, false, 100).unwrap();

    // attach 侧写期望动作，master 侧读
    attached.desired_action.append(1.5);
    assert!(master.desired_action.wait_for_index(0, Duration::from_millis(500)));
    assert_eq!(master.desired_action.at(0).unwrap(), 1.5);

    // master 侧写观测/状态，attach 侧读
    master.observation.append(3.0);
    let mut status = Status::default();
    status.set_error(ErrorKind::BackendError, "Maximum number of actions reached");
    master.status.append(status);

    assert_eq!(attached.observation.at(0).unwrap(), 3.0);
    let read_back = attached.status.at(0).unwrap();
    assert_eq!(read_back.error_kind, ErrorKind::BackendError);
    assert_eq!(read_back.error_message, "Maximum number of actions reached");
}

#[test]
fn test_attach_before_master_fails() {
    let prefix = unique_prefix("nomaster");
    let result: Result<RobotData<f64, f64>, _> = RobotData::new_multi_process(&prefix, false, 100);
    assert!(result.is_err());
}

#[test]
fn test_master_drop_unlinks_segments() {
    let prefix = unique_prefix("unlink");
    {
        let _master: RobotData<f64, f64> =
            RobotData::new_multi_process(&prefix, true, 100).unwrap();
    }
    // master 已 drop，段被 unlink，attach 应失败
    let result: Result<RobotData<f64, f64>, _> = RobotData::new_multi_process(&prefix, false, 100);
    assert!(result.is_err());
}

#[test]
fn test_backend_runs_on_shared_memory_data() {
    // 整条控制链路跑在共享内存数据包上：后端用 master 侧，
    // 前端用 attach 侧
    let prefix = unique_prefix("backend");
    let master = Arc::new(
        RobotData::<f64, f64>::new_multi_process(&prefix, true, 100).unwrap(),
    );
    let attached = Arc::new(
        RobotData::<f64, f64>::new_multi_process(&prefix, false, 100).unwrap(),
    );

    let driver = Arc::new(MockDriver::new(Duration::from_millis(2)));
    let backend = RobotBackend::new(driver.clone(), master, None);
    backend.initialize();

    let frontend = RobotFrontend::new(attached);
    for i in 0..3 {
        frontend.append_desired_action(i as f64 + 0.5);
    }

    assert_eq!(frontend.get_applied_action(2).unwrap(), 2.5);
    for t in 0..3 {
        assert_eq!(frontend.get_status(t).unwrap().error_kind, ErrorKind::None);
        assert!(frontend.get_timestamp_ms(t).unwrap() > 0.0);
    }

    backend.request_shutdown();
    backend.wait_until_terminated();
    assert_eq!(driver.shutdown_count(), 1);
}

#[test]
fn test_joint_types_over_shared_memory() {
    // 参考动作/观测类型走跨进程序列（bincode 编码进槽）
    let prefix = unique_prefix("joints");
    let master: RobotData<JointAction<3>, JointObservation<3>> =
        RobotData::new_multi_process(&prefix, true, 50).unwrap();
    let attached: RobotData<JointAction<3>, JointObservation<3>> =
        RobotData::new_multi_process(&prefix, false, 50).unwrap();

    let action = JointAction::torque([0.1, -0.2, 0.3]);
    attached.desired_action.append(action);
    assert_eq!(master.desired_action.at(0).unwrap(), action);

    let observation = JointObservation {
        position: [1.0, 2.0, 3.0],
        tip_force: Some(vec![0.5]),
        ..Default::default()
    };
    master.observation.append(observation.clone());
    assert_eq!(attached.observation.at(0).unwrap(), observation);
}
