//! 遥操作测试
//!
//! 键盘与直接控制两种策略共享一条模拟总线，通过 `Teleoperator` 接口统一操作。

use parking_lot::Mutex;
use soarm_client::{
    DirectTeleoperator, KeyBindings, KeyboardTeleoperator, RobotProfile, TeleopConfig,
    TeleopState, Teleoperator,
};
use soarm_driver::{BusTiming, MotorBus, MotorChangeEvent, shared};
use soarm_serial::mock::SimulatedBus;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn manual() -> TeleopConfig {
    TeleopConfig {
        tick_rate_hz: 0.0,
        ..TeleopConfig::default()
    }
}

#[test]
fn test_strategies_share_bus_and_event_order() {
    let profile = RobotProfile::so100();
    let sim = SimulatedBus::new(&profile.ids());
    let bus = shared(MotorBus::new(sim.clone()).with_timing(BusTiming::immediate()));

    let keyboard = KeyboardTeleoperator::new(
        bus.clone(),
        profile.motor_configs(4096),
        KeyBindings::default(),
        manual(),
    );
    let direct = DirectTeleoperator::new(bus, profile.motor_configs(4096));

    let events: Arc<Mutex<Vec<MotorChangeEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let strategies: Vec<&dyn Teleoperator> = vec![&keyboard, &direct];
    for strategy in &strategies {
        let sink = events.clone();
        strategy.on_change(Arc::new(move |e: &MotorChangeEvent| sink.lock().push(e.clone())));
        strategy.start().unwrap();
        assert_eq!(strategy.state(), TeleopState::Active);
    }

    keyboard.press("o");
    keyboard.step();
    direct.move_motor("wrist_flex", 3000).unwrap();
    keyboard.step();

    let events = events.lock();
    let names: Vec<&str> = events.iter().map(|e| e.motor_name.as_str()).collect();
    assert_eq!(names, vec!["gripper", "wrist_flex", "gripper"]);
    assert!(
        events
            .windows(2)
            .all(|w| w[0].command_sent_at <= w[1].command_sent_at)
    );
    assert_eq!(sim.raw_position(6), Some(2067));
    assert_eq!(sim.raw_position(4), Some(3000));

    for strategy in &strategies {
        strategy.stop();
        assert_eq!(strategy.state(), TeleopState::Idle);
    }
}

#[test]
fn test_emergency_stop_in_running_loop() {
    let profile = RobotProfile::so101();
    let sim = SimulatedBus::new(&profile.ids());
    let bus = shared(MotorBus::new(sim.clone()).with_timing(BusTiming::immediate()));
    let teleop = KeyboardTeleoperator::new(
        bus,
        profile.motor_configs(4096),
        KeyBindings::default(),
        TeleopConfig {
            tick_rate_hz: 100.0,
            ..TeleopConfig::default()
        },
    );

    teleop.start().unwrap();
    teleop.press("ArrowUp");
    thread::sleep(Duration::from_millis(50));
    teleop.press("Escape");

    let deadline = Instant::now() + Duration::from_secs(2);
    while teleop.state() == TeleopState::Active && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(teleop.state(), TeleopState::Idle);

    let frozen = sim.raw_position(2);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sim.raw_position(2), frozen);
    assert!(frozen.unwrap() > 2047);

    // 停止后可以重新启动
    teleop.start().unwrap();
    assert_eq!(teleop.state(), TeleopState::Active);
    teleop.stop();
}

#[test]
fn test_calibrated_limits_bound_motion() {
    let sim = SimulatedBus::new(&[3]);
    sim.set_raw_position(3, 3390);
    let bus = shared(MotorBus::new(sim.clone()).with_timing(BusTiming::immediate()));

    let motors = vec![soarm_driver::MotorConfig::new(3, "elbow_flex", 4096).with_limits(1200, 3400)];
    let teleop = KeyboardTeleoperator::new(bus, motors, KeyBindings::default(), manual());
    teleop.start().unwrap();

    teleop.press("w");
    for _ in 0..20 {
        teleop.step();
    }
    assert_eq!(sim.raw_position(3), Some(3400));

    teleop.release("w");
    teleop.press("s");
    for _ in 0..1000 {
        teleop.step();
    }
    assert_eq!(sim.raw_position(3), Some(1200));
}
