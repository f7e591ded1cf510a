//! RX task: pulls datagrams off the wire and dispatches them (§4.8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::beacon::decode_beacon_payload;
use crate::codec::Codec;
use crate::hal::Transport;
use crate::log::{log_debug, DiagContext};
use crate::record::MessageRecord;
use crate::types::{BEACON_SUBJECT_ID, MAX_DATAGRAM_LEN};

use super::pipeline::{CounterSet, Shared, RX};
use super::FAST_CYCLE_MS;

pub(crate) fn run<T: Transport + Send + 'static>(shared: Arc<Shared<T>>, start: Instant, stopped: Arc<AtomicBool>, counters: CounterSet) {
    let ctx = DiagContext { component: "rx_task", node_id: 0 };

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

        let mut buffer = [0u8; MAX_DATAGRAM_LEN];
        let received = shared.transport.lock().ok().and_then(|mut t| t.recv(&mut buffer, Duration::from_millis(0)).ok());

        if let Some((len, _source)) = received {
            let now_usec = shared.time.now_usec();
            match MessageRecord::deserialize(&buffer[..len], now_usec) {
                Ok(record) => dispatch(&shared, &ctx, record),
                Err(err) => log_debug!(ctx, "dropped malformed datagram: {err}"),
            }
        }

        if let Ok(mut guard) = shared.rx_guard.lock() {
            guard.heartbeat(start.elapsed().as_millis() as u64);
        }
        counters[RX].fetch_add(1, Ordering::Relaxed);
        std::thread::sleep(Duration::from_millis(FAST_CYCLE_MS));
    }

    stopped.store(true, Ordering::SeqCst);
}

fn dispatch<T: Transport>(shared: &Shared<T>, ctx: &DiagContext, record: MessageRecord) {
    if record.subject_id == BEACON_SUBJECT_ID && !record.kind.is_service() {
        match decode_beacon_payload(&record.payload) {
            Ok((health, mode, uptime_sec)) => {
                if let Ok(mut peers) = shared.peers.lock() {
                    let now_ms = record.timestamp_usec / 1000;
                    // The beacon wire payload carries no name field yet.
                    let _ = peers.observe_beacon(record.source_node_id, health, mode, uptime_sec, "", now_ms);
                }
            }
            Err(err) => log_debug!(*ctx, "dropped malformed beacon: {err}"),
        }
        return;
    }

    // All other subjects/services are surfaced to subscriber dispatch,
    // an external collaborator outside this crate's scope (§1).
    log_debug!(*ctx, "dispatched subject {} to subscriber", record.subject_id);
}
