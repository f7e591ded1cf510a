//! Assembles the Node/TX/RX tasks over one [`Transport`] and starts/stops
//! them as a unit (§4.8).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crate::codec::TransferIdAllocator;
use crate::config::{ConfigSnapshot, ConfigStore};
use crate::error::CyphalError;
use crate::hal::{TimeSource, Transport};
use crate::log::log_warn;
use crate::node::{AllocationTable, Health, Mode, NodeContext, NodeState};
use crate::peer::PeerTable;
use crate::queue::PriorityQueue;
use crate::stability::StabilityGuard;
use crate::sync::BoundedMutex;
use crate::BeaconService;

use super::mailbox::{Command, Mailbox, MailboxSender};
use super::{node_task, rx_task, tx_task, FAST_CYCLE_MS, NODE_CYCLE_MS, SHUTDOWN_GRACE};

/// Indices into a [`TaskPipeline`]'s cycle-counter set.
pub(crate) const NODE: usize = 0;
pub(crate) const TX: usize = 1;
pub(crate) const RX: usize = 2;

pub(crate) type CounterSet = Arc<[AtomicU32; 3]>;

/// State shared across the three tasks. Every field is individually
/// lock-guarded (§5: "no lock is held while acquiring another").
pub(crate) struct Shared<T: Transport> {
    pub queue: BoundedMutex<PriorityQueue>,
    pub transport: BoundedMutex<T>,
    pub node: BoundedMutex<NodeContext>,
    pub peers: BoundedMutex<PeerTable>,
    pub allocation_table: BoundedMutex<AllocationTable>,
    pub config: BoundedMutex<ConfigStore>,
    pub beacon: BoundedMutex<BeaconService>,
    pub transfer_ids: BoundedMutex<TransferIdAllocator>,
    pub time: Box<dyn TimeSource + Send + Sync>,
    pub node_running: AtomicBool,
    pub stop_requested: AtomicBool,
    pub node_guard: BoundedMutex<StabilityGuard>,
    pub tx_guard: BoundedMutex<StabilityGuard>,
    pub rx_guard: BoundedMutex<StabilityGuard>,
    pub send_error_count: AtomicU32,
    /// Preferred dynamic node-ID candidate, set once at construction (§8
    /// scenarios 4/5). Read by the Node task's one-time `initialize` call.
    pub preferred_node_id: Option<u8>,
}

/// Sampled once-per-loop-iteration counters, readable without
/// synchronization ("statistical only", §4.8).
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleCounts {
    pub node: u32,
    pub tx: u32,
    pub rx: u32,
}

/// Owns the three task threads and the command mailbox that drives the
/// Node task.
pub struct TaskPipeline<T: Transport + Send + 'static> {
    shared: Arc<Shared<T>>,
    command_tx: MailboxSender<Command>,
    mailbox: Option<Mailbox<Command>>,
    node_handle: Option<JoinHandle<()>>,
    tx_handle: Option<JoinHandle<()>>,
    rx_handle: Option<JoinHandle<()>>,
    node_stopped: Arc<AtomicBool>,
    tx_stopped: Arc<AtomicBool>,
    rx_stopped: Arc<AtomicBool>,
    counters: CounterSet,
}

impl<T: Transport + Send + 'static> TaskPipeline<T> {
    /// Builds a stopped pipeline over `transport`, seeded with
    /// `initial_config`.
    pub fn new(transport: T, initial_config: ConfigSnapshot, time: Box<dyn TimeSource + Send + Sync>) -> Result<Self, CyphalError> {
        let mut config = ConfigStore::new();
        config.set(crate::config::ConfigValue::NodeId(initial_config.node_id))?;
        config.set(crate::config::ConfigValue::BeaconIntervalMs(initial_config.beacon_interval_ms))?;

        let beacon = BeaconService::new(initial_config.beacon_interval_ms)?;
        let (command_tx, mailbox) = Mailbox::new();
        let shared = Arc::new(Shared {
            queue: BoundedMutex::new(PriorityQueue::new()),
            transport: BoundedMutex::new(transport),
            node: BoundedMutex::new(NodeContext::new()),
            peers: BoundedMutex::new(PeerTable::new()),
            allocation_table: BoundedMutex::new(AllocationTable::new()),
            config: BoundedMutex::new(config),
            beacon: BoundedMutex::new(beacon),
            transfer_ids: BoundedMutex::new(TransferIdAllocator::new()),
            time,
            node_running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            node_guard: BoundedMutex::new(StabilityGuard::new(NODE_CYCLE_MS * 2)),
            tx_guard: BoundedMutex::new(StabilityGuard::new(FAST_CYCLE_MS * 2)),
            rx_guard: BoundedMutex::new(StabilityGuard::new(FAST_CYCLE_MS * 2)),
            send_error_count: AtomicU32::new(0),
            preferred_node_id: initial_config.preferred_node_id,
        });

        Ok(Self {
            shared,
            command_tx,
            mailbox: Some(mailbox),
            node_handle: None,
            tx_handle: None,
            rx_handle: None,
            node_stopped: Arc::new(AtomicBool::new(false)),
            tx_stopped: Arc::new(AtomicBool::new(false)),
            rx_stopped: Arc::new(AtomicBool::new(false)),
            counters: Arc::new([AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)]),
        })
    }

    /// A cloneable handle for posting [`Command`]s into the Node task.
    pub fn command_sender(&self) -> MailboxSender<Command> {
        self.command_tx.clone()
    }

    pub fn cycle_counts(&self) -> CycleCounts {
        CycleCounts {
            node: self.counters[NODE].load(Ordering::Relaxed),
            tx: self.counters[TX].load(Ordering::Relaxed),
            rx: self.counters[RX].load(Ordering::Relaxed),
        }
    }

    /// Count of TX sends that failed after exhausting all retries (§4.8).
    pub fn send_error_count(&self) -> u32 {
        self.shared.send_error_count.load(Ordering::Relaxed)
    }

    /// `(state, health, mode, node_id)`, for the operator console's
    /// `show-status` command and for tests.
    pub fn node_snapshot(&self) -> (NodeState, Health, Mode, u8) {
        let node = self.shared.node.lock().expect("node lock poisoned");
        (node.state(), node.health(), node.mode(), node.node_id())
    }

    /// Count of peers seen within `timeout_ms` of `now_ms`, for the operator
    /// console's `list-peers` command and for tests.
    pub fn peer_active_count(&self, now_ms: u64, timeout_ms: u64) -> usize {
        let peers = self.shared.peers.lock().expect("peers lock poisoned");
        peers.active_count(now_ms, timeout_ms)
    }

    /// Spawns the three task threads. TX and RX spin-wait on
    /// `shared.node_running` before entering their cycle loops (§4.8: "must
    /// not start until Node task is Running"). May only be called once.
    pub fn start(&mut self, node_id: u8) {
        let mailbox = self.mailbox.take().expect("TaskPipeline::start called more than once");
        let start = Instant::now();

        let shared = Arc::clone(&self.shared);
        let stopped = Arc::clone(&self.node_stopped);
        let counters = Arc::clone(&self.counters);
        self.node_handle = Some(std::thread::spawn(move || {
            node_task::run(shared, mailbox, node_id, start, stopped, counters);
        }));

        let shared = Arc::clone(&self.shared);
        let stopped = Arc::clone(&self.tx_stopped);
        let counters = Arc::clone(&self.counters);
        self.tx_handle = Some(std::thread::spawn(move || {
            tx_task::run(shared, start, stopped, counters);
        }));

        let shared = Arc::clone(&self.shared);
        let stopped = Arc::clone(&self.rx_stopped);
        let counters = Arc::clone(&self.counters);
        self.rx_handle = Some(std::thread::spawn(move || {
            rx_task::run(shared, start, stopped, counters);
        }));
    }

    /// Requests an orderly shutdown. Waits up to 5 s for all three tasks to
    /// report stopped; any still running past that are force-deleted (on a
    /// hosted target, their `JoinHandle` is dropped rather than joined — a
    /// `std::thread::JoinHandle` cannot be force-killed, so this is a
    /// best-effort approximation of the RTOS "force-delete" primitive the
    /// original scheduler provides).
    pub fn stop(&mut self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(Command::Stop);

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while Instant::now() < deadline {
            let all_stopped = self.node_stopped.load(Ordering::SeqCst)
                && self.tx_stopped.load(Ordering::SeqCst)
                && self.rx_stopped.load(Ordering::SeqCst);
            if all_stopped {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        if !(self.node_stopped.load(Ordering::SeqCst) && self.tx_stopped.load(Ordering::SeqCst) && self.rx_stopped.load(Ordering::SeqCst)) {
            log_warn!("task pipeline shutdown grace period elapsed; force-deleting remaining task handles");
        }

        for handle in [self.node_handle.take(), self.tx_handle.take(), self.rx_handle.take()] {
            if let Some(handle) = handle {
                let _ = handle.join();
            }
        }
    }
}
