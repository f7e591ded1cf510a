//! Linux `Transport` implementation over UDP/IPv4 multicast sockets.

use std::io::ErrorKind as IoErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use cyphal_node::types::{SERVICE_MULTICAST_BASE, SUBJECT_MULTICAST_BASE};
use cyphal_node::{CyphalError, Endpoint, ErrorKind, Ipv4Address, Transport};

fn to_std_ipv4(addr: Ipv4Address) -> Ipv4Addr {
    let [a, b, c, d] = addr.0;
    Ipv4Addr::new(a, b, c, d)
}

fn from_std_ipv4(addr: Ipv4Addr) -> Ipv4Address {
    let octets = addr.octets();
    Ipv4Address::new(octets[0], octets[1], octets[2], octets[3])
}

/// A `Transport` backed by a single non-blocking `UdpSocket`, joined to
/// zero or more multicast groups on a given interface.
///
/// Concurrent `send`/`recv` from the TX and RX tasks are serialized by the
/// `BoundedMutex` the Task Pipeline wraps this type in, not by this type
/// itself (§4.2).
pub struct LinuxUdpTransport {
    socket: UdpSocket,
    interface_addr: Ipv4Addr,
    local_node_id: u8,
}

impl LinuxUdpTransport {
    fn bind(interface: &str, port: u16) -> Result<(UdpSocket, Ipv4Addr), CyphalError> {
        let interface_addr: Ipv4Addr = interface
            .parse()
            .map_err(|_| CyphalError::new(ErrorKind::InitFailed, "LinuxUdpTransport::bind", line!(), "interface is not a valid IPv4 literal"))?;

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|_| CyphalError::new(ErrorKind::InitFailed, "LinuxUdpTransport::bind", line!(), "failed to create socket"))?;
        socket
            .set_reuse_address(true)
            .map_err(|_| CyphalError::new(ErrorKind::InitFailed, "LinuxUdpTransport::bind", line!(), "failed to set SO_REUSEADDR"))?;
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket
            .bind(&bind_addr.into())
            .map_err(|_| CyphalError::new(ErrorKind::InitFailed, "LinuxUdpTransport::bind", line!(), "failed to bind socket"))?;
        socket
            .set_nonblocking(true)
            .map_err(|_| CyphalError::new(ErrorKind::InitFailed, "LinuxUdpTransport::bind", line!(), "failed to set non-blocking mode"))?;

        Ok((socket.into(), interface_addr))
    }

    fn join(&self, group: Ipv4Addr) -> Result<(), CyphalError> {
        self.socket
            .join_multicast_v4(&group, &self.interface_addr)
            .map_err(|_| CyphalError::new(ErrorKind::TransportError, "LinuxUdpTransport::join", line!(), "failed to join multicast group"))
    }

    fn leave(&self, group: Ipv4Addr) -> Result<(), CyphalError> {
        self.socket
            .leave_multicast_v4(&group, &self.interface_addr)
            .map_err(|_| CyphalError::new(ErrorKind::TransportError, "LinuxUdpTransport::leave", line!(), "failed to leave multicast group"))
    }
}

impl Transport for LinuxUdpTransport {
    fn init(interface: &str, port: u16, multicast_addr: Ipv4Address) -> Result<Self, CyphalError> {
        if !multicast_addr.is_multicast() {
            return Err(CyphalError::new(ErrorKind::InitFailed, "LinuxUdpTransport::init", line!(), "multicast_addr is not in 224.0.0.0/4"));
        }
        let (socket, interface_addr) = Self::bind(interface, port)?;
        Ok(Self {
            socket,
            interface_addr,
            local_node_id: 0,
        })
    }

    fn join_subject(&mut self, subject_id: u16) -> Result<(), CyphalError> {
        let addr = Ipv4Address::from_u32(SUBJECT_MULTICAST_BASE | subject_id as u32);
        self.join(to_std_ipv4(addr))
    }

    fn leave_subject(&mut self, subject_id: u16) -> Result<(), CyphalError> {
        let addr = Ipv4Address::from_u32(SUBJECT_MULTICAST_BASE | subject_id as u32);
        self.leave(to_std_ipv4(addr))
    }

    fn join_service(&mut self, node_id: u8) -> Result<(), CyphalError> {
        let addr = Ipv4Address::from_u32(SERVICE_MULTICAST_BASE | node_id as u32);
        self.join(to_std_ipv4(addr))
    }

    fn leave_service(&mut self, node_id: u8) -> Result<(), CyphalError> {
        let addr = Ipv4Address::from_u32(SERVICE_MULTICAST_BASE | node_id as u32);
        self.leave(to_std_ipv4(addr))
    }

    fn send(&mut self, datagram: &[u8], destination: Endpoint) -> Result<(), CyphalError> {
        let target = SocketAddr::V4(SocketAddrV4::new(to_std_ipv4(destination.address), destination.port));
        let sent = self
            .socket
            .send_to(datagram, target)
            .map_err(|_| CyphalError::new(ErrorKind::SendFailed, "LinuxUdpTransport::send", line!(), "send_to failed"))?;
        if sent != datagram.len() {
            return Err(CyphalError::new(ErrorKind::SendFailed, "LinuxUdpTransport::send", line!(), "short write"));
        }
        Ok(())
    }

    fn recv(&mut self, buffer: &mut [u8], timeout: Duration) -> Result<(usize, Endpoint), CyphalError> {
        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_micros(1))))
            .map_err(|_| CyphalError::new(ErrorKind::ReceiveFailed, "LinuxUdpTransport::recv", line!(), "failed to set read timeout"))?;

        match self.socket.recv_from(buffer) {
            Ok((len, SocketAddr::V4(source))) => Ok((len, Endpoint::new(from_std_ipv4(*source.ip()), source.port()))),
            Ok((_, SocketAddr::V6(_))) => Err(CyphalError::new(ErrorKind::ReceiveFailed, "LinuxUdpTransport::recv", line!(), "unexpected IPv6 source")),
            Err(err) if err.kind() == IoErrorKind::WouldBlock || err.kind() == IoErrorKind::TimedOut => {
                Err(CyphalError::new(ErrorKind::Timeout, "LinuxUdpTransport::recv", line!(), "no datagram within timeout"))
            }
            Err(_) => Err(CyphalError::new(ErrorKind::ReceiveFailed, "LinuxUdpTransport::recv", line!(), "recv_from failed")),
        }
    }

    fn local_node_id(&self) -> u8 {
        self.local_node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_round_trip() {
        let mut a = LinuxUdpTransport::init("127.0.0.1", 0, Ipv4Address::new(239, 65, 65, 65)).unwrap();
        let a_port = a.socket.local_addr().unwrap().port();
        let mut b = LinuxUdpTransport::init("127.0.0.1", 0, Ipv4Address::new(239, 65, 65, 65)).unwrap();

        let destination = Endpoint::new(Ipv4Address::new(127, 0, 0, 1), a_port);
        b.send(b"hello", destination).unwrap();

        let mut buffer = [0u8; 64];
        let (len, _source) = a.recv(&mut buffer, Duration::from_millis(500)).unwrap();
        assert_eq!(&buffer[..len], b"hello");
    }

    #[test]
    fn recv_times_out_with_nothing_pending() {
        let mut transport = LinuxUdpTransport::init("127.0.0.1", 0, Ipv4Address::new(239, 65, 65, 65)).unwrap();
        let mut buffer = [0u8; 64];
        let err = transport.recv(&mut buffer, Duration::from_millis(20)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[test]
    fn rejects_non_multicast_address() {
        let err = LinuxUdpTransport::init("127.0.0.1", 0, Ipv4Address::new(10, 0, 0, 1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InitFailed);
    }
}
