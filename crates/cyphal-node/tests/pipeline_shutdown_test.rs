//! Task Pipeline start/stop lifecycle (§4.8).

#[path = "harness/mod.rs"]
mod harness;

use std::thread;
use std::time::Duration;

use cyphal_node::config::ConfigSnapshot;
use cyphal_node::hal::TimeSource;
use cyphal_node::task::{Command, TaskPipeline};

use harness::MockBus;

#[derive(Debug, Clone, Copy, Default)]
struct ZeroClock;

impl TimeSource for ZeroClock {
    fn now_usec(&self) -> u64 {
        0
    }
}

#[test]
fn all_three_tasks_run_and_stop_within_the_grace_period() {
    let bus = MockBus::new();
    let transport = bus.attach();
    let config = ConfigSnapshot {
        node_id: 11,
        ..ConfigSnapshot::default()
    };
    let mut pipeline = TaskPipeline::new(transport, config, Box::new(ZeroClock)).unwrap();

    pipeline.start(11);
    pipeline.command_sender().send(Command::Start).unwrap();

    thread::sleep(Duration::from_millis(300));
    let counts = pipeline.cycle_counts();
    assert!(counts.node > 0, "node task never ran a cycle");
    assert!(counts.tx > 0, "tx task never ran a cycle");
    assert!(counts.rx > 0, "rx task never ran a cycle");

    let (state, _, _, node_id) = pipeline.node_snapshot();
    assert_eq!(node_id, 11);
    assert_eq!(state, cyphal_node::node::NodeState::Operational);

    let stop_started = std::time::Instant::now();
    pipeline.stop();
    assert!(stop_started.elapsed() < Duration::from_secs(5), "stop() exceeded the shutdown grace period");
}
