//! 全局中断关停测试
//!
//! 中断标志是进程级全局状态：测试放在独立的测试二进制里，并且
//! 合并为单个用例顺序执行，避免置位标志影响并行用例。

mod common;

use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;

use common::MockDriver;
use servolink::prelude::*;
use servolink::signal;
use servolink::status::ErrorKind;

#[test]
fn test_global_shutdown_behaviour() {
    // ============================================================
    // 阶段 1：中断终止后端，不追加错误状态
    // ============================================================
    let driver = Arc::new(MockDriver::new(Duration::from_millis(2)));
    let data = Arc::new(RobotData::<f64, f64>::new(1000));
    let backend = RobotBackend::new(driver.clone(), data.clone(), None);
    backend.initialize();

    let frontend = RobotFrontend::new(data.clone());
    for i in 0..1000 {
        frontend.append_desired_action(i as f64);
    }

    // 跑满 10 步后触发全局中断（等价于收到 SIGINT）
    frontend.get_applied_action(10).unwrap();
    signal::request_global_shutdown();
    backend.wait_until_terminated();
    assert!(!backend.is_running());

    // 有序退出：没有任何一步被标成错误
    let newest = data.status.newest_index().unwrap();
    assert!(newest >= 10);
    for t in 0..=newest {
        assert_eq!(
            frontend.get_status(t).unwrap().error_kind,
            ErrorKind::None,
            "step {t}"
        );
    }
    assert_eq!(driver.shutdown_count(), 1);

    // 宿主处理完一轮关停后可以重新武装
    signal::reset();
    assert!(!signal::is_interrupted());

    // ============================================================
    // 阶段 2：中断取消阻塞读
    // ============================================================
    let data = Arc::new(RobotData::<f64, f64>::new(100));
    let frontend = RobotFrontend::new(data.clone());

    let reader = {
        let data = data.clone();
        std::thread::spawn(move || data.observation.at(0))
    };
    let waiter = std::thread::spawn(move || frontend.wait_until_time_index(5));

    std::thread::sleep(Duration::from_millis(50));
    signal::request_global_shutdown();

    // 阻塞读在一个等待切片内观察到中断并返回
    assert_eq!(reader.join().unwrap(), Err(SeriesError::Interrupted));
    assert_eq!(waiter.join().unwrap(), Err(SeriesError::Interrupted));

    signal::reset();

    // ============================================================
    // 阶段 3：挂着 DataLogger 的后端被中断（而非出错）：记录
    // 线程观察到全局中断后排空退出，在途步的实际动作记 null
    // ============================================================
    let driver = Arc::new(MockDriver::new(Duration::from_millis(2)));
    let data = Arc::new(RobotData::<f64, f64>::new(1000));
    // 非实时模式：喂完 6 个动作后，第 6 步写完状态便阻塞等待
    // desired[6]，构成一个确定的在途步
    let config = BackendConfig {
        real_time_mode: false,
        ..Default::default()
    };
    let backend = RobotBackend::new(driver.clone(), data.clone(), Some(config));
    backend.initialize();

    let log_path = std::env::temp_dir().join(format!(
        "servolink_interrupt_log_{}.ndjson",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    let logger = DataLogger::start(data.clone(), &log_path, None).unwrap();

    let frontend = RobotFrontend::new(data.clone());
    for i in 0..6 {
        frontend.append_desired_action(i as f64);
    }
    frontend.get_applied_action(5).unwrap();
    // 让工作线程走到第 6 步的期望动作等待处
    std::thread::sleep(Duration::from_millis(100));

    signal::request_global_shutdown();
    backend.wait_until_terminated();

    // 不显式 stop 也不会卡死：线程自行退出，stop 立即收尾
    let records = logger.stop().unwrap();
    assert_eq!(records, 7);

    let file = std::fs::File::open(&log_path).unwrap();
    let lines: Vec<String> = std::io::BufReader::new(file)
        .lines()
        .map(|l| l.unwrap())
        .collect();
    assert_eq!(lines.len(), 7);

    // 被中断的在途步：状态是 NONE（不是错误），实际动作为 null
    let last: serde_json::Value = serde_json::from_str(&lines[6]).unwrap();
    assert_eq!(last["time_index"], 6);
    assert_eq!(last["applied_action"], serde_json::Value::Null);
    assert_eq!(last["status"]["error_kind"], "None");
    // 完成的步都带实际动作
    let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(first["applied_action"], 0.0);

    std::fs::remove_file(&log_path).ok();
    signal::reset();
}
