//! Periodic liveness beacon (§4.5).

use crate::error::{cyphal_err, CyphalError, ErrorKind};
use crate::node::{Health, Mode};
use crate::record::{MessageKind, MessageRecord, Priority};
use crate::types::{BEACON_PAYLOAD_LEN, BEACON_SUBJECT_ID};

const MIN_INTERVAL_MS: u32 = 100;
const MAX_INTERVAL_MS: u32 = 60_000;
pub const DEFAULT_BEACON_INTERVAL_MS: u32 = 1000;

fn health_to_u8(health: Health) -> u8 {
    match health {
        Health::Nominal => 0,
        Health::Advisory => 1,
        Health::Caution => 2,
        Health::Warning => 3,
    }
}

fn u8_to_health(value: u8) -> Health {
    match value {
        1 => Health::Advisory,
        2 => Health::Caution,
        3 => Health::Warning,
        _ => Health::Nominal,
    }
}

fn mode_to_u8(mode: Mode) -> u8 {
    match mode {
        Mode::Operational => 0,
        Mode::Initialization => 1,
        Mode::Maintenance => 2,
        Mode::SoftwareUpdate => 3,
        Mode::Offline => 4,
    }
}

fn u8_to_mode(value: u8) -> Mode {
    match value {
        1 => Mode::Initialization,
        2 => Mode::Maintenance,
        3 => Mode::SoftwareUpdate,
        4 => Mode::Offline,
        _ => Mode::Operational,
    }
}

/// Encodes `(health, mode, uptime_sec)` into the fixed 8-byte beacon extent:
/// `[health, mode, uptime_sec as 48-bit little-endian]`.
pub fn encode_beacon_payload(health: Health, mode: Mode, uptime_sec: u64) -> [u8; BEACON_PAYLOAD_LEN] {
    let mut payload = [0u8; BEACON_PAYLOAD_LEN];
    payload[0] = health_to_u8(health);
    payload[1] = mode_to_u8(mode);
    let uptime_bytes = uptime_sec.to_le_bytes();
    payload[2..8].copy_from_slice(&uptime_bytes[0..6]);
    payload
}

/// The inverse of [`encode_beacon_payload`].
pub fn decode_beacon_payload(payload: &[u8]) -> Result<(Health, Mode, u64), CyphalError> {
    if payload.len() != BEACON_PAYLOAD_LEN {
        return Err(cyphal_err!(ErrorKind::InvalidParameter, "beacon payload has the wrong extent", payload.len()));
    }
    let health = u8_to_health(payload[0]);
    let mode = u8_to_mode(payload[1]);
    let mut uptime_bytes = [0u8; 8];
    uptime_bytes[0..6].copy_from_slice(&payload[2..8]);
    let uptime_sec = u64::from_le_bytes(uptime_bytes);
    Ok((health, mode, uptime_sec))
}

/// Publishes the fixed-subject liveness beacon (subject 7509) at a
/// configurable cadence (§4.5).
pub struct BeaconService {
    interval_ms: u32,
    last_published_ms: u64,
    running: bool,
}

impl BeaconService {
    /// Constructs a stopped beacon service with the given cadence. Fails
    /// with `InvalidConfig` outside `[100, 60000]` ms.
    pub fn new(interval_ms: u32) -> Result<Self, CyphalError> {
        let mut service = Self {
            interval_ms: DEFAULT_BEACON_INTERVAL_MS,
            last_published_ms: 0,
            running: false,
        };
        service.set_interval(interval_ms)?;
        Ok(service)
    }

    pub fn set_interval(&mut self, interval_ms: u32) -> Result<(), CyphalError> {
        if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&interval_ms) {
            return Err(cyphal_err!(ErrorKind::InvalidConfig, "beacon interval out of range", interval_ms));
        }
        self.interval_ms = interval_ms;
        Ok(())
    }

    pub fn interval_ms(&self) -> u32 {
        self.interval_ms
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Idempotent: starting an already-running service has no effect beyond
    /// returning `Ok`.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Idempotent.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Builds a beacon [`MessageRecord`] unconditionally, regardless of
    /// cadence, and resets the last-published timestamp.
    pub fn send_now(&mut self, node_id: u8, health: Health, mode: Mode, uptime_sec: u64, now_ms: u64) -> MessageRecord {
        self.last_published_ms = now_ms;
        MessageRecord {
            subject_id: BEACON_SUBJECT_ID,
            priority: Priority::Nominal,
            source_node_id: node_id,
            destination_node_id: 0,
            transfer_id: 0,
            payload: alloc::vec::Vec::from(encode_beacon_payload(health, mode, uptime_sec)),
            kind: MessageKind::Subject,
            timestamp_usec: now_ms.saturating_mul(1000),
        }
    }

    /// Called once per Node-task cycle. If running and due, produces a
    /// beacon record; otherwise returns `None`.
    pub fn tick(&mut self, node_id: u8, health: Health, mode: Mode, uptime_sec: u64, now_ms: u64) -> Option<MessageRecord> {
        if !self.running {
            return None;
        }
        if now_ms.saturating_sub(self.last_published_ms) < self.interval_ms as u64 {
            return None;
        }
        Some(self.send_now(node_id, health, mode, uptime_sec, now_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_interval() {
        assert!(BeaconService::new(50).is_err());
        assert!(BeaconService::new(70_000).is_err());
        assert!(BeaconService::new(1000).is_ok());
    }

    #[test]
    fn stopped_service_never_ticks() {
        let mut beacon = BeaconService::new(100).unwrap();
        assert!(beacon.tick(1, Health::Nominal, Mode::Operational, 0, 1000).is_none());
    }

    #[test]
    fn running_service_respects_cadence() {
        let mut beacon = BeaconService::new(200).unwrap();
        beacon.start();
        assert!(beacon.tick(1, Health::Nominal, Mode::Operational, 0, 0).is_some());
        assert!(beacon.tick(1, Health::Nominal, Mode::Operational, 0, 50).is_none());
        assert!(beacon.tick(1, Health::Nominal, Mode::Operational, 0, 200).is_some());
    }

    #[test]
    fn start_stop_are_idempotent() {
        let mut beacon = BeaconService::new(100).unwrap();
        beacon.start();
        beacon.start();
        assert!(beacon.is_running());
        beacon.stop();
        beacon.stop();
        assert!(!beacon.is_running());
    }

    #[test]
    fn beacon_payload_round_trips() {
        let payload = encode_beacon_payload(Health::Caution, Mode::Maintenance, 123_456);
        let (health, mode, uptime) = decode_beacon_payload(&payload).unwrap();
        assert_eq!(health, Health::Caution);
        assert_eq!(mode, Mode::Maintenance);
        assert_eq!(uptime, 123_456);
    }

    #[test]
    fn beacon_cadence_over_ten_second_window() {
        // §8 "Beacon cadence" invariant at interval 200ms: expect roughly 50
        // publications, within [floor(10000/200)-1, ceil(10000/200)+1].
        let mut beacon = BeaconService::new(200).unwrap();
        beacon.start();
        let mut count = 0u32;
        let mut now = 0u64;
        while now <= 10_000 {
            if beacon.tick(1, Health::Nominal, Mode::Operational, 0, now).is_some() {
                count += 1;
            }
            now += 200;
        }
        assert!((49..=51).contains(&count), "count was {count}");
    }
}
