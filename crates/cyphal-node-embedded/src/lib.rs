//! `no_std` reference `Transport` for embedded targets.
//!
//! A real MCU port (lwIP, smoltcp, a vendor UDP/IPv4 stack) binds its own
//! socket primitive behind [`Transport`]; this crate supplies a minimal
//! in-memory loopback implementation for bring-up and host-side testing of
//! the core crate on targets without a wired network stack yet.

#![no_std]

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::time::Duration;

use cyphal_node::{CyphalError, Endpoint, ErrorKind, Ipv4Address, Transport};

const MAX_JOINED_GROUPS: usize = 16;

struct Datagram {
    bytes: Vec<u8>,
    source: Endpoint,
}

/// Loops every sent datagram back into its own receive queue. Multicast
/// joins are tracked but not enforced (every send is delivered
/// unconditionally), since there is no real network below this transport.
pub struct LoopbackTransport {
    local_node_id: u8,
    local_port: u16,
    joined_subjects: [Option<u16>; MAX_JOINED_GROUPS],
    joined_services: [Option<u8>; MAX_JOINED_GROUPS],
    inbox: VecDeque<Datagram>,
}

impl LoopbackTransport {
    fn insert_group<T: PartialEq + Copy>(slots: &mut [Option<T>; MAX_JOINED_GROUPS], value: T) -> Result<(), CyphalError> {
        if slots.iter().flatten().any(|existing| *existing == value) {
            return Ok(());
        }
        match slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(value);
                Ok(())
            }
            None => Err(CyphalError::new(ErrorKind::MemoryAllocation, "LoopbackTransport::insert_group", line!(), "multicast group table is full")),
        }
    }

    fn remove_group<T: PartialEq + Copy>(slots: &mut [Option<T>; MAX_JOINED_GROUPS], value: T) {
        if let Some(slot) = slots.iter_mut().find(|slot| **slot == Some(value)) {
            *slot = None;
        }
    }
}

impl Transport for LoopbackTransport {
    fn init(_interface: &str, port: u16, multicast_addr: Ipv4Address) -> Result<Self, CyphalError> {
        if !multicast_addr.is_multicast() {
            return Err(CyphalError::new(ErrorKind::InitFailed, "LoopbackTransport::init", line!(), "multicast_addr is not in 224.0.0.0/4"));
        }
        Ok(Self {
            local_node_id: 0,
            local_port: port,
            joined_subjects: [None; MAX_JOINED_GROUPS],
            joined_services: [None; MAX_JOINED_GROUPS],
            inbox: VecDeque::new(),
        })
    }

    fn join_subject(&mut self, subject_id: u16) -> Result<(), CyphalError> {
        Self::insert_group(&mut self.joined_subjects, subject_id)
    }

    fn leave_subject(&mut self, subject_id: u16) -> Result<(), CyphalError> {
        Self::remove_group(&mut self.joined_subjects, subject_id);
        Ok(())
    }

    fn join_service(&mut self, node_id: u8) -> Result<(), CyphalError> {
        Self::insert_group(&mut self.joined_services, node_id)
    }

    fn leave_service(&mut self, node_id: u8) -> Result<(), CyphalError> {
        Self::remove_group(&mut self.joined_services, node_id);
        Ok(())
    }

    fn send(&mut self, datagram: &[u8], destination: Endpoint) -> Result<(), CyphalError> {
        self.inbox.push_back(Datagram {
            bytes: datagram.to_vec(),
            source: Endpoint::new(destination.address, self.local_port),
        });
        Ok(())
    }

    fn recv(&mut self, buffer: &mut [u8], _timeout: Duration) -> Result<(usize, Endpoint), CyphalError> {
        match self.inbox.pop_front() {
            Some(datagram) if datagram.bytes.len() <= buffer.len() => {
                buffer[..datagram.bytes.len()].copy_from_slice(&datagram.bytes);
                Ok((datagram.bytes.len(), datagram.source))
            }
            Some(_) => Err(CyphalError::new(ErrorKind::ReceiveFailed, "LoopbackTransport::recv", line!(), "buffer too small for queued datagram")),
            None => Err(CyphalError::new(ErrorKind::Timeout, "LoopbackTransport::recv", line!(), "no datagram queued")),
        }
    }

    fn local_node_id(&self) -> u8 {
        self.local_node_id
    }
}
