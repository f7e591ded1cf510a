//! The core unit of traffic: [`MessageRecord`] (§3).

use alloc::vec::Vec;

use crate::error::{CyphalError, ErrorKind};
use crate::types::{is_valid_service_id, is_valid_source_node_id, is_valid_subject_id, MAX_PAYLOAD_LEN, NodeId};

/// The eight priority levels, highest urgency first. The discriminant is the
/// value that goes on the wire and is used directly as the priority-queue
/// level index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    Exceptional = 0,
    Immediate = 1,
    Fast = 2,
    High = 3,
    Nominal = 4,
    Low = 5,
    Slow = 6,
    Optional = 7,
}

impl Priority {
    pub const ALL: [Priority; 8] = [
        Priority::Exceptional,
        Priority::Immediate,
        Priority::Fast,
        Priority::High,
        Priority::Nominal,
        Priority::Low,
        Priority::Slow,
        Priority::Optional,
    ];

    pub const fn as_index(self) -> usize {
        self as u8 as usize
    }

    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Priority::Exceptional),
            1 => Some(Priority::Immediate),
            2 => Some(Priority::Fast),
            3 => Some(Priority::High),
            4 => Some(Priority::Nominal),
            5 => Some(Priority::Low),
            6 => Some(Priority::Slow),
            7 => Some(Priority::Optional),
            _ => None,
        }
    }
}

/// Distinguishes the three traffic kinds a [`MessageRecord`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Broadcast publish/subscribe traffic on a subject.
    Subject,
    /// A request directed at a specific node's service port.
    ServiceRequest,
    /// A response to a previously received service request.
    ServiceResponse,
}

impl MessageKind {
    pub const fn is_service(self) -> bool {
        matches!(self, MessageKind::ServiceRequest | MessageKind::ServiceResponse)
    }
}

/// Owns a frame header plus an opaque application payload (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Subject identifier (0..=8191) for [`MessageKind::Subject`], or service
    /// port identifier (0..=511) for the two service kinds.
    pub subject_id: u16,
    pub priority: Priority,
    /// `0` means anonymous / not yet allocated.
    pub source_node_id: NodeId,
    /// `0` for subject traffic (broadcast); `1..=127` for service traffic.
    pub destination_node_id: NodeId,
    /// Monotonic per (source, port) outbound; opaque on receive.
    pub transfer_id: u64,
    pub payload: Vec<u8>,
    pub kind: MessageKind,
    /// Microsecond reception or creation timestamp.
    pub timestamp_usec: u64,
}

impl MessageRecord {
    /// Checks every invariant in §3 without allocating.
    pub fn validate(&self) -> Result<(), CyphalError> {
        if self.priority as u8 >= 8 {
            return Err(crate::error::cyphal_err!(ErrorKind::InvalidParameter, "priority out of range"));
        }
        match self.kind {
            MessageKind::Subject => {
                if !is_valid_subject_id(self.subject_id) {
                    return Err(crate::error::cyphal_err!(ErrorKind::InvalidParameter, "subject_id out of range"));
                }
            }
            MessageKind::ServiceRequest | MessageKind::ServiceResponse => {
                if !is_valid_service_id(self.subject_id) {
                    return Err(crate::error::cyphal_err!(ErrorKind::InvalidParameter, "service_id out of range"));
                }
            }
        }
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(crate::error::cyphal_err!(ErrorKind::InvalidParameter, "payload exceeds max length"));
        }
        if !is_valid_source_node_id(self.source_node_id) {
            return Err(crate::error::cyphal_err!(ErrorKind::InvalidParameter, "source_node_id out of range"));
        }
        Ok(())
    }

    /// A record is anonymous iff its source is unset; by design note §9 this
    /// must agree with the wire-level anonymous flag (the codec enforces
    /// that agreement at (de)serialization time rather than storing a
    /// separate redundant bit here).
    pub const fn is_anonymous(&self) -> bool {
        self.source_node_id == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(priority: Priority) -> MessageRecord {
        MessageRecord {
            subject_id: 42,
            priority,
            source_node_id: 7,
            destination_node_id: 0,
            transfer_id: 1,
            payload: Vec::new(),
            kind: MessageKind::Subject,
            timestamp_usec: 0,
        }
    }

    #[test]
    fn priority_ordering_is_numeric() {
        assert!(Priority::Exceptional < Priority::Optional);
        assert_eq!(Priority::Exceptional.as_index(), 0);
        assert_eq!(Priority::Optional.as_index(), 7);
    }

    #[test]
    fn anonymous_iff_source_zero() {
        let mut record = sample(Priority::Nominal);
        assert!(!record.is_anonymous());
        record.source_node_id = 0;
        assert!(record.is_anonymous());
    }

    #[test]
    fn validate_rejects_oversized_payload() {
        let mut record = sample(Priority::Nominal);
        record.payload = alloc::vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(record.validate().unwrap_err().kind, ErrorKind::InvalidParameter);
    }

    #[test]
    fn validate_rejects_out_of_range_subject() {
        let mut record = sample(Priority::Nominal);
        record.subject_id = 8192;
        assert!(record.validate().is_err());
    }
}
