//! In-memory multicast bus standing in for real UDP/IPv4 I/O, so the Task
//! Pipeline can be driven end to end without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cyphal_node::hal::{Endpoint, Ipv4Address, Transport};
use cyphal_node::{CyphalError, ErrorKind};

type Inbox = Arc<Mutex<VecDeque<Vec<u8>>>>;

/// A shared segment: every `send` from one attached transport is delivered
/// to every other attached transport's inbox, the way all nodes on a real
/// Cyphal/UDP network share one multicast group.
#[derive(Clone, Default)]
pub struct MockBus {
    inboxes: Arc<Mutex<Vec<Inbox>>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self) -> MockTransport {
        let inbox: Inbox = Arc::new(Mutex::new(VecDeque::new()));
        let own_index = {
            let mut inboxes = self.inboxes.lock().unwrap();
            inboxes.push(Arc::clone(&inbox));
            inboxes.len() - 1
        };
        MockTransport {
            bus: Arc::clone(&self.inboxes),
            own_index,
            own_inbox: inbox,
        }
    }
}

pub struct MockTransport {
    bus: Arc<Mutex<Vec<Inbox>>>,
    own_index: usize,
    own_inbox: Inbox,
}

impl Transport for MockTransport {
    fn init(_interface: &str, _port: u16, _multicast_addr: Ipv4Address) -> Result<Self, CyphalError> {
        // Exists only to satisfy the trait; harness transports are built via
        // `MockBus::attach` so they share a segment with their peers.
        Ok(MockBus::new().attach())
    }

    fn join_subject(&mut self, _subject_id: u16) -> Result<(), CyphalError> {
        Ok(())
    }

    fn leave_subject(&mut self, _subject_id: u16) -> Result<(), CyphalError> {
        Ok(())
    }

    fn join_service(&mut self, _node_id: u8) -> Result<(), CyphalError> {
        Ok(())
    }

    fn leave_service(&mut self, _node_id: u8) -> Result<(), CyphalError> {
        Ok(())
    }

    fn send(&mut self, datagram: &[u8], _destination: Endpoint) -> Result<(), CyphalError> {
        let inboxes = self.bus.lock().unwrap();
        for (index, inbox) in inboxes.iter().enumerate() {
            if index != self.own_index {
                inbox.lock().unwrap().push_back(datagram.to_vec());
            }
        }
        Ok(())
    }

    fn recv(&mut self, buffer: &mut [u8], _timeout: Duration) -> Result<(usize, Endpoint), CyphalError> {
        let mut inbox = self.own_inbox.lock().unwrap();
        match inbox.pop_front() {
            Some(datagram) if datagram.len() <= buffer.len() => {
                buffer[..datagram.len()].copy_from_slice(&datagram);
                Ok((datagram.len(), Endpoint::new(Ipv4Address::new(127, 0, 0, 1), 0)))
            }
            Some(_) => Err(CyphalError::new(ErrorKind::ReceiveFailed, "MockTransport::recv", line!(), "buffer too small for queued datagram")),
            None => Err(CyphalError::new(ErrorKind::Timeout, "MockTransport::recv", line!(), "no datagram queued")),
        }
    }

    fn local_node_id(&self) -> u8 {
        0
    }
}
