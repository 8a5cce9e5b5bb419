//! tokio UDP transports.
//!
//! [`UnicastUdpFactory`] binds an ephemeral socket for tunneling;
//! [`MulticastUdpFactory`] binds the routing port and joins the KNX multicast
//! group.

use crate::error::{KnxError, Result};
use crate::net::transport::{AsyncTransport, TransportFactory};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

/// A tokio `UdpSocket` that can be closed from another task.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    closed: CancellationToken,
}

impl UdpTransport {
    /// Wrap a bound socket
    pub fn new(socket: UdpSocket) -> Self {
        Self {
            socket,
            closed: CancellationToken::new(),
        }
    }
}

impl AsyncTransport for UdpTransport {
    async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(KnxError::transport_closed());
        }
        let sent = self
            .socket
            .send_to(data, addr)
            .await
            .map_err(KnxError::send_failed)?;
        knx_log!(trace, "sent {} bytes to {}", sent, addr);
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        tokio::select! {
            () = self.closed.cancelled() => Err(KnxError::transport_closed()),
            received = self.socket.recv_from(buf) => received.map_err(KnxError::receive_failed),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(KnxError::bind_failed)
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

/// Opens one unicast socket per tunnel connect.
#[derive(Debug, Clone, Copy)]
pub struct UnicastUdpFactory {
    local: SocketAddr,
}

impl UnicastUdpFactory {
    /// Bind new sockets to `local` (port 0 picks an ephemeral port)
    pub const fn new(local: SocketAddr) -> Self {
        Self { local }
    }
}

impl TransportFactory for UnicastUdpFactory {
    type Transport = UdpTransport;

    async fn open(&self) -> Result<UdpTransport> {
        let socket = UdpSocket::bind(self.local)
            .await
            .map_err(KnxError::bind_failed)?;
        knx_log!(debug, "bound tunneling socket {:?}", socket.local_addr());
        Ok(UdpTransport::new(socket))
    }
}

/// Opens a socket on the routing port joined to the multicast group.
#[derive(Debug, Clone, Copy)]
pub struct MulticastUdpFactory {
    group: Ipv4Addr,
    port: u16,
    interface: Ipv4Addr,
}

impl MulticastUdpFactory {
    /// Join `group` on `interface`, receiving on `port`
    pub const fn new(group: Ipv4Addr, port: u16, interface: Ipv4Addr) -> Self {
        Self {
            group,
            port,
            interface,
        }
    }
}

impl TransportFactory for MulticastUdpFactory {
    type Transport = UdpTransport;

    async fn open(&self) -> Result<UdpTransport> {
        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.port))
            .await
            .map_err(KnxError::bind_failed)?;
        socket
            .join_multicast_v4(self.group, self.interface)
            .map_err(KnxError::bind_failed)?;
        socket
            .set_multicast_loop_v4(false)
            .map_err(KnxError::bind_failed)?;
        knx_log!(debug, "joined {} on port {}", self.group, self.port);
        Ok(UdpTransport::new(socket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unicast_send_and_receive() {
        let factory = UnicastUdpFactory::new("127.0.0.1:0".parse().unwrap());
        let a = factory.open().await.unwrap();
        let b = factory.open().await.unwrap();

        a.send_to(&[0x06, 0x10], b.local_addr().unwrap()).await.unwrap();

        let mut buf = [0u8; 16];
        let (len, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[0x06, 0x10]);
        assert_eq!(from, a.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_receive() {
        let factory = UnicastUdpFactory::new("127.0.0.1:0".parse().unwrap());
        let transport = std::sync::Arc::new(factory.open().await.unwrap());

        let reader = {
            let transport = std::sync::Arc::clone(&transport);
            tokio::spawn(async move {
                let mut buf = [0u8; 16];
                transport.recv_from(&mut buf).await
            })
        };
        tokio::task::yield_now().await;
        transport.close();

        let err = reader.await.unwrap().unwrap_err();
        assert!(matches!(err, KnxError::Transport(ref e) if e.is_closed()));
        assert!(transport.send_to(&[0], "127.0.0.1:9".parse().unwrap()).await.is_err());
    }
}
