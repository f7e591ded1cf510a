#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' is used for dynamic allocation (e.g., Vec<MessageRecord> in the queue)
extern crate alloc;

// --- Foundation Modules ---
pub mod types;
pub mod error;
pub mod log;
pub mod hal;
pub mod config;

// --- Transport Core ---
pub mod record;
pub mod queue;
pub mod codec;

// --- Node Abstraction ---
pub mod node;
pub mod beacon;
pub mod peer;
pub mod stability;

// --- Hosted Task Pipeline (threads, mailboxes, bounded-wait sync) ---
#[cfg(feature = "std")]
pub mod sync;
#[cfg(feature = "std")]
pub mod task;

// --- Top-level Exports ---
pub use error::{CyphalError, ErrorKind};
pub use record::{MessageKind, MessageRecord, Priority};
pub use queue::{LevelStats, PriorityQueue};
pub use codec::Codec;
pub use hal::{ConsoleCommandSink, Endpoint, Ipv4Address, TimeSource, Transport};
pub use node::{AllocationTable, AllocatorAction, AllocatorState, DynamicAllocator, Health, Mode, NodeContext, NodeState};
pub use beacon::BeaconService;
pub use peer::{Peer, PeerTable};
pub use config::{ConfigKey, ConfigSnapshot, ConfigStore, ConfigValue};
pub use types::NodeId;
