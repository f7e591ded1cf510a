//! TX task: drains the Priority Queue onto the wire (§4.8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::codec::Codec;
use crate::error::{CyphalError, ErrorKind};
use crate::hal::{Endpoint, Ipv4Address, Transport};
use crate::log::{log_warn, DiagContext};
use crate::node::Health;
use crate::types::{MAX_DATAGRAM_LEN, SERVICE_MULTICAST_BASE, SUBJECT_MULTICAST_BASE};

use super::pipeline::{CounterSet, Shared, TX};
use super::FAST_CYCLE_MS;

const SEND_RETRIES: u32 = 3;
const SEND_BACKOFF_MS: u64 = 10;

fn destination_for(subject_id: u16, is_service: bool, destination_node_id: u8, port: u16) -> Endpoint {
    let base = if is_service { SERVICE_MULTICAST_BASE } else { SUBJECT_MULTICAST_BASE };
    let low16 = if is_service { destination_node_id as u32 } else { subject_id as u32 };
    Endpoint::new(Ipv4Address::from_u32(base | low16), port)
}

pub(crate) fn run<T: Transport + Send + 'static>(shared: Arc<Shared<T>>, start: Instant, stopped: Arc<AtomicBool>, counters: CounterSet) {
    let ctx = DiagContext { component: "tx_task", node_id: 0 };

    while !shared.node_running.load(Ordering::SeqCst) {
        if shared.stop_requested.load(Ordering::SeqCst) {
            stopped.store(true, Ordering::SeqCst);
            return;
        }
        std::thread::sleep(Duration::from_millis(FAST_CYCLE_MS));
    }

    loop {
        if shared.stop_requested.load(Ordering::SeqCst) {
            break;
        }

        let record = shared.queue.lock().ok().and_then(|mut q| q.pop());
        if let Some(record) = record {
            let port = shared.config.lock().map(|c| c.snapshot().udp_port).unwrap_or(crate::types::DEFAULT_UDP_PORT);
            let destination = destination_for(record.subject_id, record.kind.is_service(), record.destination_node_id, port);

            let mut buffer = [0u8; MAX_DATAGRAM_LEN];
            match record.serialize(&mut buffer) {
                Ok(len) => {
                    let mut sent = false;
                    let mut last_err: Option<CyphalError> = None;
                    for attempt in 0..SEND_RETRIES {
                        let outcome = shared.transport.lock().ok().map(|mut t| t.send(&buffer[..len], destination));
                        match outcome {
                            Some(Ok(())) => {
                                sent = true;
                                break;
                            }
                            Some(Err(err)) => last_err = Some(err),
                            None => {}
                        }
                        if attempt + 1 < SEND_RETRIES {
                            std::thread::sleep(Duration::from_millis(SEND_BACKOFF_MS));
                        }
                    }
                    if !sent {
                        shared.send_error_count.fetch_add(1, Ordering::Relaxed);
                        if let Ok(mut node) = shared.node.lock() {
                            let _ = node.set_health(Health::Advisory);
                        }
                        let err = last_err
                            .unwrap_or_else(|| CyphalError::new(ErrorKind::SendFailed, "tx_task::run", line!(), "transport lock unavailable"));
                        if let Ok(mut guard) = shared.tx_guard.lock() {
                            guard.record_failure(&err);
                        }
                        log_warn!(ctx, "send failed after {SEND_RETRIES} attempts: {err}");
                    }
                }
                Err(err) => log_warn!(ctx, "record failed to serialize: {err}"),
            }
        }

        if let Ok(mut guard) = shared.tx_guard.lock() {
            guard.heartbeat(start.elapsed().as_millis() as u64);
        }
        counters[TX].fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(FAST_CYCLE_MS));
    }

    stopped.store(true, Ordering::SeqCst);
}
