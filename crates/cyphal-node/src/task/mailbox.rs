//! Node task command mailbox (§4.8, §6).

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::config::ConfigSnapshot;
use crate::error::{cyphal_err, CyphalError, ErrorKind};

/// Commands accepted by the Node task's mailbox.
#[derive(Debug, Clone)]
pub enum Command {
    Start,
    Stop,
    Restart,
    UpdateConfig(ConfigSnapshot),
    HealthCheck,
}

/// The receiving half of a command mailbox. `recv_timeout` bounds the
/// Node task's mailbox-blocking cycle (§4.8).
pub struct Mailbox<T> {
    receiver: Receiver<T>,
}

impl<T> Mailbox<T> {
    pub fn new() -> (MailboxSender<T>, Self) {
        let (sender, receiver) = mpsc::channel();
        (MailboxSender { sender }, Self { receiver })
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, CyphalError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => Err(cyphal_err!(ErrorKind::Timeout, "mailbox recv timed out")),
            Err(RecvTimeoutError::Disconnected) => Err(cyphal_err!(ErrorKind::TransportError, "mailbox sender dropped")),
        }
    }
}

/// A cloneable handle used to post commands into a [`Mailbox`].
#[derive(Clone)]
pub struct MailboxSender<T> {
    sender: Sender<T>,
}

impl<T> MailboxSender<T> {
    pub fn send(&self, value: T) -> Result<(), CyphalError> {
        self.sender.send(value).map_err(|_| cyphal_err!(ErrorKind::TransportError, "mailbox receiver dropped"))
    }
}
