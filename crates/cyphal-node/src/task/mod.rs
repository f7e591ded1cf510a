//! Hosted mapping of the preemptive priority scheduler onto OS threads
//! (§4.8, §5.1): one thread per task (Node, TX, RX), cooperating through
//! shared, bounded-wait-guarded state.

pub mod mailbox;
mod node_task;
mod pipeline;
mod rx_task;
mod tx_task;

pub use mailbox::{Command, Mailbox, MailboxSender};
pub use pipeline::{CycleCounts, TaskPipeline};

use std::time::{SystemTime, UNIX_EPOCH};

use crate::hal::TimeSource;

/// The production [`TimeSource`] for hosted targets: the wall clock, as
/// microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now_usec(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

pub(crate) const NODE_CYCLE_MS: u64 = 100; // 10 Hz
pub(crate) const FAST_CYCLE_MS: u64 = 10; // 100 Hz (TX/RX)
pub(crate) const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);
