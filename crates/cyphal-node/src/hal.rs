// crates/cyphal-node/src/hal.rs
//! Hardware/platform abstraction layer (§4.2, §6 collaborator interfaces).

use core::fmt;
use core::time::Duration;

use crate::error::CyphalError;

/// An IPv4 multicast group address, kept as a plain 4-byte value so the core
/// crate does not need `std::net` under `no_std`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ipv4Address(pub [u8; 4]);

impl Ipv4Address {
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self([a, b, c, d])
    }

    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_be_bytes())
    }

    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// §4.2: a Cyphal/UDP multicast address is well-formed IPv4 multicast
    /// iff its top nibble is `1110` (224.0.0.0/4).
    pub const fn is_multicast(self) -> bool {
        (self.0[0] & 0xF0) == 0xE0
    }
}

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// A UDP endpoint: an IPv4 address plus port. Used both as a destination for
/// `send` and as the reported source of a `recv`'d datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub address: Ipv4Address,
    pub port: u16,
}

impl Endpoint {
    pub const fn new(address: Ipv4Address, port: u16) -> Self {
        Self { address, port }
    }
}

/// Abstracts the physical binding, joining, and datagram I/O of the UDP/IPv4
/// multicast transport (C5), so the core protocol logic stays
/// platform-agnostic (`no_std`-compatible on its own).
///
/// Implementations own the underlying socket and are responsible for
/// serializing concurrent `send`/`recv` calls against it (§4.2's "internally
/// serialized by a mutex with a 100-ms acquisition timeout" maps, on hosted
/// targets, to wrapping the socket in a [`crate::sync::BoundedMutex`]).
pub trait Transport {
    /// Opens a datagram endpoint bound to `port` on `interface`, after
    /// validating that `multicast_addr` is well-formed IPv4 multicast
    /// (§4.2). Fails with `InitFailed` otherwise.
    fn init(interface: &str, port: u16, multicast_addr: Ipv4Address) -> Result<Self, CyphalError>
    where
        Self: Sized;

    /// Joins the subject multicast group `SUBJECT_BASE | subject_id`.
    fn join_subject(&mut self, subject_id: u16) -> Result<(), CyphalError>;
    /// Leaves the subject multicast group `SUBJECT_BASE | subject_id`.
    fn leave_subject(&mut self, subject_id: u16) -> Result<(), CyphalError>;
    /// Joins the service multicast group `SERVICE_BASE | node_id`. `node_id`
    /// must be `1..=127`.
    fn join_service(&mut self, node_id: u8) -> Result<(), CyphalError>;
    /// Leaves the service multicast group `SERVICE_BASE | node_id`.
    fn leave_service(&mut self, node_id: u8) -> Result<(), CyphalError>;

    /// Sends exactly one datagram (`0 < datagram.len() <= 1024 + 16`) to
    /// `destination`. A short write is reported as `SendFailed`.
    fn send(&mut self, datagram: &[u8], destination: Endpoint) -> Result<(), CyphalError>;

    /// Fills `buffer` with one received datagram, returning its length and
    /// source endpoint. Returns `Timeout` if nothing arrives within
    /// `timeout`.
    fn recv(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<(usize, Endpoint), CyphalError>;

    /// The local node identifier configured for this transport instance.
    fn local_node_id(&self) -> u8;
}

/// Abstracts a monotonic clock (§6 "Time source"). Every timed component
/// (the Priority Queue's bounded waits, Beacon cadence, allocator timers,
/// peer liveness) takes the current time as an explicit argument rather than
/// calling a global clock, keeping the core testable without real time.
pub trait TimeSource {
    fn now_usec(&self) -> u64;
    fn now_millis(&self) -> u64 {
        self.now_usec() / 1000
    }
}

/// The line-oriented operator console (§1, §6) is an external collaborator;
/// only its interface contract is specified here. A concrete console
/// implementation (parser, transport, line editing) lives outside this
/// crate and drives the core purely through this trait.
pub trait ConsoleCommandSink {
    /// Handles one command line, writing any output to `out`.
    ///
    /// Returns `true` if the caller should invoke this method again to drain
    /// further pending output for the same command (e.g. a multi-page
    /// `list-peers`), `false` once the command is fully handled.
    fn handle_command(&mut self, command: &str, out: &mut dyn fmt::Write) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multicast_validity_checks_top_nibble() {
        assert!(Ipv4Address::new(239, 65, 65, 65).is_multicast());
        assert!(Ipv4Address::from_u32(0xEF00_0000).is_multicast());
        assert!(!Ipv4Address::new(10, 0, 0, 1).is_multicast());
    }

    #[test]
    fn round_trips_through_u32() {
        let addr = Ipv4Address::from_u32(0xEF01_002A);
        assert_eq!(addr.to_u32(), 0xEF01_002A);
    }
}
