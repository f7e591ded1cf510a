//! Wire frame (de)serialization (§4.3).
//!
//! ```text
//! offset  size   field
//!   0      2     subject_or_service_id  (little-endian)
//!   2      1     priority               (0..=7)
//!   3      1     source_node_id
//!   4      1     destination_node_id    (0 for subject)
//!   5      1     flags                  (bit0 = service_request, bit1 = anonymous, bit2 = is_response)
//!   6      8     transfer_id            (little-endian)
//!  14      2     payload_length         (little-endian, <= 1024)
//!  16      N     payload bytes
//! ```

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::{cyphal_err, CyphalError, ErrorKind};
use crate::record::{MessageKind, MessageRecord, Priority};
use crate::types::{FRAME_HEADER_LEN, MAX_PAYLOAD_LEN};

const FLAG_SERVICE_REQUEST: u8 = 0b001;
const FLAG_ANONYMOUS: u8 = 0b010;
const FLAG_IS_RESPONSE: u8 = 0b100;

/// A trait for objects that can be rendered to and parsed from the wire
/// frame format above.
pub trait Codec: Sized {
    /// Serializes `self` into `buffer`, returning the number of bytes
    /// written. Fails with `InvalidParameter` if `buffer` is too small or
    /// any §3 invariant is violated.
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, CyphalError>;

    /// Parses `bytes` into `Self`, stamping `timestamp_usec` as the
    /// reception time.
    fn deserialize(bytes: &[u8], timestamp_usec: u64) -> Result<Self, CyphalError>;
}

fn flags_for(record: &MessageRecord) -> u8 {
    let mut flags = 0u8;
    if record.is_anonymous() {
        flags |= FLAG_ANONYMOUS;
    }
    match record.kind {
        MessageKind::Subject => {}
        MessageKind::ServiceRequest => flags |= FLAG_SERVICE_REQUEST,
        MessageKind::ServiceResponse => flags |= FLAG_IS_RESPONSE,
    }
    flags
}

fn kind_from_flags(flags: u8) -> MessageKind {
    if flags & FLAG_IS_RESPONSE != 0 {
        MessageKind::ServiceResponse
    } else if flags & FLAG_SERVICE_REQUEST != 0 {
        MessageKind::ServiceRequest
    } else {
        MessageKind::Subject
    }
}

impl Codec for MessageRecord {
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, CyphalError> {
        self.validate()?;
        let total_len = FRAME_HEADER_LEN + self.payload.len();
        if buffer.len() < total_len {
            return Err(cyphal_err!(ErrorKind::InvalidParameter, "buffer too small for frame"));
        }

        buffer[0..2].copy_from_slice(&self.subject_id.to_le_bytes());
        buffer[2] = self.priority as u8;
        buffer[3] = self.source_node_id;
        buffer[4] = self.destination_node_id;
        buffer[5] = flags_for(self);
        buffer[6..14].copy_from_slice(&self.transfer_id.to_le_bytes());
        buffer[14..16].copy_from_slice(&(self.payload.len() as u16).to_le_bytes());
        buffer[16..total_len].copy_from_slice(&self.payload);

        Ok(total_len)
    }

    fn deserialize(bytes: &[u8], timestamp_usec: u64) -> Result<Self, CyphalError> {
        if bytes.len() < FRAME_HEADER_LEN {
            return Err(cyphal_err!(ErrorKind::InvalidParameter, "frame shorter than header"));
        }

        let subject_id = u16::from_le_bytes([bytes[0], bytes[1]]);
        let priority = Priority::from_u8(bytes[2])
            .ok_or_else(|| cyphal_err!(ErrorKind::InvalidParameter, "invalid priority byte"))?;
        let source_node_id = bytes[3];
        let destination_node_id = bytes[4];
        let flags = bytes[5];
        let transfer_id = u64::from_le_bytes(bytes[6..14].try_into().unwrap());
        let payload_length = u16::from_le_bytes([bytes[14], bytes[15]]) as usize;

        if payload_length > MAX_PAYLOAD_LEN {
            return Err(cyphal_err!(ErrorKind::InvalidParameter, "payload_length exceeds max", payload_length));
        }
        if bytes.len() < FRAME_HEADER_LEN + payload_length {
            return Err(cyphal_err!(ErrorKind::InvalidParameter, "frame shorter than declared payload"));
        }

        // Design note §9: the anonymous flag is redundant with
        // source_node_id == 0 and must agree with it.
        let anonymous_flag = flags & FLAG_ANONYMOUS != 0;
        if anonymous_flag != (source_node_id == 0) {
            return Err(cyphal_err!(ErrorKind::InvalidParameter, "anonymous flag disagrees with source_node_id"));
        }

        let record = MessageRecord {
            subject_id,
            priority,
            source_node_id,
            destination_node_id,
            transfer_id,
            payload: bytes[FRAME_HEADER_LEN..FRAME_HEADER_LEN + payload_length].to_vec(),
            kind: kind_from_flags(flags),
            timestamp_usec,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Assigns monotonic, per-`(source_node_id, port)` transfer IDs for outbound
/// records, wrapping at `u64::MAX` (§4.3).
#[derive(Default)]
pub struct TransferIdAllocator {
    counters: BTreeMap<(u8, u16), u64>,
}

impl TransferIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next transfer ID for `(source_node_id, port)` and
    /// advances the counter.
    pub fn next(&mut self, source_node_id: u8, port: u16) -> u64 {
        let counter = self.counters.entry((source_node_id, port)).or_insert(0);
        let value = *counter;
        *counter = counter.wrapping_add(1);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MessageRecord {
        MessageRecord {
            subject_id: 1234,
            priority: Priority::Nominal,
            source_node_id: 7,
            destination_node_id: 0,
            transfer_id: 0x0102030405060708,
            payload: alloc::vec![0xAA, 0xBB],
            kind: MessageKind::Subject,
            timestamp_usec: 0,
        }
    }

    #[test]
    fn wire_format_matches_scenario_6() {
        // §8 scenario 6.
        let record = sample();
        let mut buffer = [0u8; 32];
        let len = record.serialize(&mut buffer).unwrap();
        let expected: [u8; 18] = [
            0xD2, 0x04, 0x04, 0x07, 0x00, 0x00, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01,
            0x02, 0x00, 0xAA, 0xBB,
        ];
        assert_eq!(&buffer[..len], &expected);
    }

    #[test]
    fn round_trip_preserves_fields() {
        let record = sample();
        let mut buffer = [0u8; 32];
        let len = record.serialize(&mut buffer).unwrap();
        let decoded = MessageRecord::deserialize(&buffer[..len], 999).unwrap();
        assert_eq!(decoded.subject_id, record.subject_id);
        assert_eq!(decoded.priority, record.priority);
        assert_eq!(decoded.source_node_id, record.source_node_id);
        assert_eq!(decoded.destination_node_id, record.destination_node_id);
        assert_eq!(decoded.transfer_id, record.transfer_id);
        assert_eq!(decoded.payload, record.payload);
        assert_eq!(decoded.timestamp_usec, 999);
    }

    #[test]
    fn rejects_oversized_payload_length() {
        let mut buffer = [0u8; FRAME_HEADER_LEN];
        buffer[14..16].copy_from_slice(&1025u16.to_le_bytes());
        let err = MessageRecord::deserialize(&buffer, 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
    }

    #[test]
    fn rejects_invalid_priority() {
        let mut buffer = [0u8; FRAME_HEADER_LEN];
        buffer[2] = 8;
        let err = MessageRecord::deserialize(&buffer, 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
    }

    #[test]
    fn rejects_anonymous_flag_mismatch() {
        let mut buffer = [0u8; FRAME_HEADER_LEN];
        buffer[3] = 7; // source_node_id = 7, not anonymous
        buffer[5] = FLAG_ANONYMOUS; // but flag claims anonymous
        let err = MessageRecord::deserialize(&buffer, 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidParameter);
    }

    #[test]
    fn transfer_id_allocator_is_monotonic_per_source_and_port() {
        let mut allocator = TransferIdAllocator::new();
        assert_eq!(allocator.next(7, 100), 0);
        assert_eq!(allocator.next(7, 100), 1);
        assert_eq!(allocator.next(8, 100), 0);
    }
}
