// demos/linux/cn_listener.rs
use cyphal_node::config::ConfigSnapshot;
use cyphal_node::hal::{Ipv4Address, Transport};
use cyphal_node::task::{Command, SystemTimeSource, TaskPipeline};
use cyphal_node::types::DEFAULT_UDP_PORT;
use cyphal_node_linux::LinuxUdpTransport;
use log::info;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // IMPORTANT: run with a multicast-capable interface address, e.g. the
    // IPv4 address bound to eth0, not an interface name.
    let node_id = 42;
    let interface_addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1".to_string());

    let transport = LinuxUdpTransport::init(&interface_addr, DEFAULT_UDP_PORT, Ipv4Address::new(239, 65, 65, 65)).map_err(|e| format!("{e}"))?;

    let config = ConfigSnapshot {
        node_id,
        ..ConfigSnapshot::default()
    };

    let mut pipeline = TaskPipeline::new(transport, config, Box::new(SystemTimeSource))?;
    let commands = pipeline.command_sender();

    info!("Starting Cyphal/UDP node {node_id} on {interface_addr}...");
    pipeline.start(node_id);
    commands.send(Command::Start)?;

    loop {
        thread::sleep(Duration::from_secs(1));
        let counts = pipeline.cycle_counts();
        info!("cycles: node={} tx={} rx={}", counts.node, counts.tx, counts.rx);
    }
}
