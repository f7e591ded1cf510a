//! Node task: lifecycle, dynamic allocation, beacon cadence, command
//! mailbox (§4.8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ConfigValue;
use crate::hal::Transport;
use crate::log::{log_info, log_warn, DiagContext};
use crate::node::{AllocatorAction, Health};

use super::mailbox::{Command, Mailbox};
use super::pipeline::{CounterSet, Shared, NODE};
use super::NODE_CYCLE_MS;

pub(crate) fn run<T: Transport + Send + 'static>(
    shared: Arc<Shared<T>>,
    mailbox: Mailbox<Command>,
    node_id: u8,
    start: Instant,
    stopped: Arc<AtomicBool>,
    counters: CounterSet,
) {
    let ctx = DiagContext { component: "node_task", node_id };
    let now_ms = |start: Instant| start.elapsed().as_millis() as u64;

    {
        let mut node = shared.node.lock().expect("node lock poisoned during init");
        if let Err(err) = node.initialize(node_id, shared.preferred_node_id, now_ms(start)) {
            log_warn!(ctx, "node initialization failed: {err}");
        }
    }

    loop {
        if shared.stop_requested.load(Ordering::SeqCst) {
            break;
        }

        match mailbox.recv_timeout(Duration::from_millis(NODE_CYCLE_MS)) {
            Ok(Command::Start) => {
                shared.node_running.store(true, Ordering::SeqCst);
                if let Ok(mut beacon) = shared.beacon.lock() {
                    beacon.start();
                }
                log_info!(ctx, "node task started");
            }
            Ok(Command::Stop) => break,
            Ok(Command::Restart) => {
                if let Ok(mut guard) = shared.node_guard.lock() {
                    guard.reset();
                }
            }
            Ok(Command::UpdateConfig(snapshot)) => {
                if let Ok(mut config) = shared.config.lock() {
                    let _ = config.set(ConfigValue::BeaconIntervalMs(snapshot.beacon_interval_ms));
                    if let Ok(mut beacon) = shared.beacon.lock() {
                        let _ = beacon.set_interval(snapshot.beacon_interval_ms);
                    }
                }
            }
            Ok(Command::HealthCheck) => {
                if let Ok(node) = shared.node.lock() {
                    log_info!(ctx, "health={:?} mode={:?}", node.health(), node.mode());
                }
            }
            Err(_) => {}
        }

        let now = now_ms(start);

        if let (Ok(mut node), Ok(mut table)) = (shared.node.lock(), shared.allocation_table.lock()) {
            node.tick_uptime(now);
            let _action = node.process_allocation(now, &mut table);
            if matches!(_action, AllocatorAction::Failed) {
                log_warn!(ctx, "dynamic node-id allocation failed");
            }
        }

        if shared.node_running.load(Ordering::SeqCst) {
            let snapshot = {
                let node = shared.node.lock().ok();
                node.map(|n| (n.node_id(), n.health(), n.mode(), n.uptime_sec()))
            };
            if let Some((id, health, mode, uptime_sec)) = snapshot {
                if id != 0 {
                    let record = shared.beacon.lock().ok().and_then(|mut b| b.tick(id, health, mode, uptime_sec, now));
                    if let Some(mut record) = record {
                        if let Ok(mut ids) = shared.transfer_ids.lock() {
                            record.transfer_id = ids.next(record.source_node_id, record.subject_id);
                        }
                        if let Ok(mut queue) = shared.queue.lock() {
                            let _ = queue.push(record);
                        }
                    }
                }
            }
        }

        if let Ok(mut guard) = shared.tx_guard.lock() {
            if guard.check_liveness(now) {
                if let Ok(mut node) = shared.node.lock() {
                    let _ = node.set_health(Health::Advisory);
                }
                log_warn!(ctx, "tx task missed its heartbeat window");
            }
        }
        if let Ok(mut guard) = shared.rx_guard.lock() {
            if guard.check_liveness(now) {
                if let Ok(mut node) = shared.node.lock() {
                    let _ = node.set_health(Health::Advisory);
                }
                log_warn!(ctx, "rx task missed its heartbeat window");
            }
        }

        if let Ok(mut guard) = shared.node_guard.lock() {
            guard.heartbeat(now);
        }
        counters[NODE].fetch_add(1, Ordering::Relaxed);
    }

    stopped.store(true, Ordering::SeqCst);
}
