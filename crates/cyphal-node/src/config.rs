//! Typed configuration store (§3, §4.9, §6).

use alloc::string::{String, ToString};

use crate::error::{cyphal_err, CyphalError, ErrorKind};

/// Default multicast address for the Cyphal/UDP transport (§6).
pub const DEFAULT_MULTICAST_ADDR: &str = "239.65.65.65";

/// Snapshot of every configuration field, safe to copy out of the store's
/// lock and use for the remainder of a task cycle (§4.9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub node_id: u8,
    /// First candidate the dynamic allocator should try when `node_id` is
    /// `0` (§4.4, §8 scenarios 4/5). Ignored when `node_id` is nonzero.
    pub preferred_node_id: Option<u8>,
    pub beacon_interval_ms: u32,
    pub udp_port: u16,
    pub multicast_addr: String,
    pub monitor_enabled: bool,
    pub log_level: u8,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            node_id: 0,
            preferred_node_id: None,
            beacon_interval_ms: 1000,
            udp_port: 9382,
            multicast_addr: DEFAULT_MULTICAST_ADDR.to_string(),
            monitor_enabled: false,
            log_level: 3,
        }
    }
}

/// A single configuration key, used by [`ConfigStore::set`] and by the
/// operator console's `set-config(name, value)` command (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    NodeId,
    BeaconIntervalMs,
    UdpPort,
    MulticastAddr,
    MonitorEnabled,
    LogLevel,
}

/// A validated configuration value, one variant per [`ConfigKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    NodeId(u8),
    BeaconIntervalMs(u32),
    UdpPort(u16),
    MulticastAddr(String),
    MonitorEnabled(bool),
    LogLevel(u8),
}

fn parse_ipv4(addr: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = addr.split('.');
    for octet in &mut octets {
        *octet = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}

fn validate(value: &ConfigValue) -> Result<(), CyphalError> {
    match value {
        ConfigValue::NodeId(id) => {
            if *id > 127 {
                return Err(cyphal_err!(ErrorKind::InvalidConfig, "node_id out of range", *id));
            }
        }
        ConfigValue::BeaconIntervalMs(ms) => {
            if !(100..=60_000).contains(ms) {
                return Err(cyphal_err!(ErrorKind::InvalidConfig, "beacon_interval_ms out of range", *ms));
            }
        }
        ConfigValue::UdpPort(port) => {
            if *port == 0 {
                return Err(cyphal_err!(ErrorKind::InvalidConfig, "udp_port must be nonzero"));
            }
        }
        ConfigValue::MulticastAddr(addr) => {
            let octets = parse_ipv4(addr).ok_or_else(|| {
                cyphal_err!(ErrorKind::InvalidConfig, "multicast_addr is not a valid IPv4 literal")
            })?;
            if (octets[0] & 0xF0) != 0xE0 {
                return Err(cyphal_err!(ErrorKind::InvalidConfig, "multicast_addr is not in 224.0.0.0/4"));
            }
        }
        ConfigValue::MonitorEnabled(_) => {}
        ConfigValue::LogLevel(level) => {
            if *level > 5 {
                return Err(cyphal_err!(ErrorKind::InvalidConfig, "log_level out of range", *level));
            }
        }
    }
    Ok(())
}

/// A plain (non-locking) typed key/value store. See [`crate::sync`] for the
/// bounded-wait, concurrent-safe wrapper used by the hosted Task Pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    snapshot: ConfigSnapshot,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            snapshot: ConfigSnapshot::default(),
        }
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and applies `value`, leaving the store unmodified if
    /// validation fails.
    pub fn set(&mut self, value: ConfigValue) -> Result<(), CyphalError> {
        validate(&value)?;
        match value {
            ConfigValue::NodeId(id) => self.snapshot.node_id = id,
            ConfigValue::BeaconIntervalMs(ms) => self.snapshot.beacon_interval_ms = ms,
            ConfigValue::UdpPort(port) => self.snapshot.udp_port = port,
            ConfigValue::MulticastAddr(addr) => self.snapshot.multicast_addr = addr,
            ConfigValue::MonitorEnabled(enabled) => self.snapshot.monitor_enabled = enabled,
            ConfigValue::LogLevel(level) => self.snapshot.log_level = level,
        }
        Ok(())
    }

    /// A lock-free read of every field at once (§4.9).
    pub fn snapshot(&self) -> ConfigSnapshot {
        self.snapshot.clone()
    }

    /// Restores every field to its §6 default.
    pub fn reset_to_defaults(&mut self) {
        self.snapshot = ConfigSnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let store = ConfigStore::new();
        let snap = store.snapshot();
        assert_eq!(snap.node_id, 0);
        assert_eq!(snap.beacon_interval_ms, 1000);
        assert_eq!(snap.udp_port, 9382);
        assert_eq!(snap.multicast_addr, "239.65.65.65");
        assert!(!snap.monitor_enabled);
        assert_eq!(snap.log_level, 3);
    }

    #[test]
    fn rejects_out_of_range_beacon_interval() {
        let mut store = ConfigStore::new();
        let err = store.set(ConfigValue::BeaconIntervalMs(50)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
        // Store is left unmodified.
        assert_eq!(store.snapshot().beacon_interval_ms, 1000);
    }

    #[test]
    fn rejects_non_multicast_address() {
        let mut store = ConfigStore::new();
        assert!(store.set(ConfigValue::MulticastAddr("10.0.0.1".to_string())).is_err());
        assert!(store.set(ConfigValue::MulticastAddr("239.1.1.1".to_string())).is_ok());
    }

    #[test]
    fn set_then_reset_restores_defaults() {
        let mut store = ConfigStore::new();
        store.set(ConfigValue::NodeId(42)).unwrap();
        assert_eq!(store.snapshot().node_id, 42);
        store.reset_to_defaults();
        assert_eq!(store.snapshot().node_id, 0);
    }
}
