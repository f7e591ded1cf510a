//! Peer discovery table, populated from observed beacons (§4.6).

use alloc::string::{String, ToString};

use crate::error::{cyphal_err, CyphalError, ErrorKind};
use crate::node::{Health, Mode};
use crate::types::{DEFAULT_LIVENESS_TIMEOUT_MS, MAX_NODE_ID, MAX_PEERS};

/// One observed peer's last-known state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub node_id: u8,
    pub last_seen_ms: u64,
    pub health: Health,
    pub mode: Mode,
    pub uptime_sec: u64,
    /// Human-readable name (§3). The beacon wire payload carries no name
    /// field yet, so this is always empty until a naming service exists;
    /// the field is populated here so the data model matches §3 in full.
    pub friendly_name: String,
}

/// A plain (non-locking) fixed-capacity table of observed peers. See
/// [`crate::queue::PriorityQueue`] for the same plain-struct-plus-external-
/// lock pattern applied elsewhere in this crate.
pub struct PeerTable {
    slots: [Option<Peer>; MAX_PEERS],
    discarded_count: u64,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
            discarded_count: 0,
        }
    }
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observed beacon. Invalid `node_id`s are silently ignored
    /// (§4.6). If the table is full and `node_id` is not already tracked,
    /// fails with `QueueFull` and increments the discarded-peer counter.
    pub fn observe_beacon(&mut self, node_id: u8, health: Health, mode: Mode, uptime_sec: u64, friendly_name: &str, now_ms: u64) -> Result<(), CyphalError> {
        if node_id == 0 || node_id > MAX_NODE_ID {
            return Ok(());
        }

        if let Some(slot) = self.slots.iter_mut().flatten().find(|peer| peer.node_id == node_id) {
            slot.last_seen_ms = now_ms;
            slot.health = health;
            slot.mode = mode;
            slot.uptime_sec = uptime_sec;
            slot.friendly_name = friendly_name.to_string();
            return Ok(());
        }

        if let Some(free) = self.slots.iter_mut().find(|slot| slot.is_none()) {
            *free = Some(Peer {
                node_id,
                last_seen_ms: now_ms,
                health,
                mode,
                uptime_sec,
                friendly_name: friendly_name.to_string(),
            });
            return Ok(());
        }

        self.discarded_count += 1;
        Err(cyphal_err!(ErrorKind::QueueFull, "peer table is full"))
    }

    /// The number of entries whose last beacon arrived within
    /// `timeout_ms` of `now_ms`. Expired entries are not removed (§4.6);
    /// they remain visible via [`Self::peers`] until overwritten.
    pub fn active_count(&self, now_ms: u64, timeout_ms: u64) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|peer| now_ms.saturating_sub(peer.last_seen_ms) <= timeout_ms)
            .count()
    }

    /// [`Self::active_count`] using the default liveness timeout (§3).
    pub fn active_count_default(&self, now_ms: u64) -> usize {
        self.active_count(now_ms, DEFAULT_LIVENESS_TIMEOUT_MS)
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.slots.iter().flatten()
    }

    pub fn discarded_count(&self) -> u64 {
        self.discarded_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observing_unknown_peer_inserts_a_slot() {
        let mut table = PeerTable::new();
        table.observe_beacon(7, Health::Nominal, Mode::Operational, 10, "", 1000).unwrap();
        assert_eq!(table.peers().count(), 1);
        assert_eq!(table.active_count_default(1000), 1);
    }

    #[test]
    fn observing_known_peer_updates_in_place() {
        let mut table = PeerTable::new();
        table.observe_beacon(7, Health::Nominal, Mode::Operational, 10, "", 1000).unwrap();
        table.observe_beacon(7, Health::Advisory, Mode::Maintenance, 20, "lidar-front", 2000).unwrap();
        assert_eq!(table.peers().count(), 1);
        let peer = table.peers().next().unwrap();
        assert_eq!(peer.health, Health::Advisory);
        assert_eq!(peer.uptime_sec, 20);
        assert_eq!(peer.friendly_name, "lidar-front");
    }

    #[test]
    fn invalid_node_id_is_ignored() {
        let mut table = PeerTable::new();
        table.observe_beacon(0, Health::Nominal, Mode::Operational, 0, "", 0).unwrap();
        table.observe_beacon(200, Health::Nominal, Mode::Operational, 0, "", 0).unwrap();
        assert_eq!(table.peers().count(), 0);
    }

    #[test]
    fn full_table_rejects_new_peers_and_counts_discards() {
        let mut table = PeerTable::new();
        for id in 1..=MAX_PEERS as u8 {
            table.observe_beacon(id, Health::Nominal, Mode::Operational, 0, "", 0).unwrap();
        }
        let err = table.observe_beacon(MAX_PEERS as u8 + 1, Health::Nominal, Mode::Operational, 0, "", 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueueFull);
        assert_eq!(table.discarded_count(), 1);
    }

    #[test]
    fn liveness_expires_without_removal() {
        // §8 "Peer liveness" invariant.
        let mut table = PeerTable::new();
        table.observe_beacon(7, Health::Nominal, Mode::Operational, 0, "", 1000).unwrap();
        assert_eq!(table.active_count(1000 + 5000, 5000), 1);
        assert_eq!(table.active_count(1000 + 5001, 5000), 0);
        // Entry still present, just inactive.
        assert_eq!(table.peers().count(), 1);
    }

    #[test]
    fn beacon_round_trip_scenario() {
        // §8 scenario 3 (simplified to the table side): four peers observed
        // within the window are all active.
        let mut table = PeerTable::new();
        for id in 1..=4u8 {
            table.observe_beacon(id, Health::Nominal, Mode::Operational, 0, "", 500).unwrap();
        }
        assert!(table.active_count(1000, 5000) >= 4);
    }
}
