//! Mock transport for testing connections without a real network.
//!
//! A [`MockNetwork`] plays the role of the gateway side. It is a
//! [`TransportFactory`]: each `open()` hands out a new [`MockTransport`] and
//! makes it the "current" one. The test then:
//! - injects inbound datagrams with [`MockNetwork::inject`]
//! - simulates a socket failure with [`MockNetwork::fail_current`]
//! - drops one outbound datagram with [`MockNetwork::fail_next_send`]
//! - inspects everything any transport sent with [`MockNetwork::sent`]
//!
//! ## Example
//!
//! ```
//! use knx_netip::net::{AsyncTransport, MockNetwork, TransportFactory};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> knx_netip::Result<()> {
//! let network = MockNetwork::new();
//! let transport = network.open().await?;
//!
//! transport.send_to(&[0x06, 0x10], network.peer()).await?;
//! assert_eq!(network.sent(), vec![vec![0x06, 0x10]]);
//!
//! network.inject(&[0x06, 0x10, 0x02, 0x08, 0x00, 0x08, 0x01, 0x00]);
//! let mut buf = [0u8; 64];
//! let (len, _) = transport.recv_from(&mut buf).await?;
//! assert_eq!(len, 8);
//! # Ok(())
//! # }
//! ```

use crate::error::{KnxError, Result};
use crate::net::transport::{AsyncTransport, TransportFactory};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

/// What the current transport's `recv_from` yields next
#[derive(Debug)]
enum Inbound {
    Datagram(Vec<u8>),
    Failure,
}

#[derive(Debug)]
struct NetworkState {
    peer: SocketAddr,
    local: SocketAddr,
    sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    sent_notify: Notify,
    current: Mutex<Option<mpsc::UnboundedSender<Inbound>>>,
    opened: Mutex<usize>,
    fail_next_send: AtomicBool,
}

/// In-memory stand-in for a gateway or multicast group.
#[derive(Debug, Clone)]
pub struct MockNetwork {
    state: Arc<NetworkState>,
}

impl MockNetwork {
    /// Network whose peer is `192.168.1.10:3671`
    pub fn new() -> Self {
        Self::with_peer(SocketAddr::from(([192, 168, 1, 10], 3671)))
    }

    /// Network whose injected datagrams come from `peer`
    pub fn with_peer(peer: SocketAddr) -> Self {
        Self {
            state: Arc::new(NetworkState {
                peer,
                local: SocketAddr::from(([192, 168, 1, 100], 50000)),
                sent: Mutex::new(Vec::new()),
                sent_notify: Notify::new(),
                current: Mutex::new(None),
                opened: Mutex::new(0),
                fail_next_send: AtomicBool::new(false),
            }),
        }
    }

    /// Source address of injected datagrams
    pub fn peer(&self) -> SocketAddr {
        self.state.peer
    }

    /// Local address reported by every transport
    pub fn local(&self) -> SocketAddr {
        self.state.local
    }

    /// Deliver a datagram to the current transport.
    ///
    /// Returns `false` when no transport is open.
    pub fn inject(&self, datagram: &[u8]) -> bool {
        self.push(Inbound::Datagram(datagram.to_vec()))
    }

    /// Make the current transport's next receive fail like a dead socket.
    pub fn fail_current(&self) -> bool {
        self.push(Inbound::Failure)
    }

    /// Make the next `send_to` on any transport fail without recording it.
    pub fn fail_next_send(&self) {
        self.state.fail_next_send.store(true, Ordering::SeqCst);
    }

    fn push(&self, inbound: Inbound) -> bool {
        self.state
            .current
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(inbound).is_ok())
    }

    /// Every datagram sent so far, in order
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state
            .sent
            .lock()
            .iter()
            .map(|(data, _)| data.clone())
            .collect()
    }

    /// Every datagram sent so far, with its destination
    pub fn sent_with_destination(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.state.sent.lock().clone()
    }

    /// Forget recorded datagrams
    pub fn clear_sent(&self) {
        self.state.sent.lock().clear();
    }

    /// Wait until at least `count` datagrams have been sent.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<Vec<u8>> {
        loop {
            let notified = self.state.sent_notify.notified();
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            notified.await;
        }
    }

    /// Number of transports opened so far
    pub fn opened_count(&self) -> usize {
        *self.state.opened.lock()
    }
}

impl Default for MockNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for MockNetwork {
    type Transport = MockTransport;

    async fn open(&self) -> Result<MockTransport> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.current.lock() = Some(tx);
        *self.state.opened.lock() += 1;
        Ok(MockTransport {
            state: Arc::clone(&self.state),
            inbound: tokio::sync::Mutex::new(rx),
            closed: CancellationToken::new(),
        })
    }
}

/// One transport handed out by a [`MockNetwork`].
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<NetworkState>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>,
    closed: CancellationToken,
}

impl AsyncTransport for MockTransport {
    async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(KnxError::transport_closed());
        }
        if self.state.fail_next_send.swap(false, Ordering::SeqCst) {
            return Err(KnxError::send_failed(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock send failure",
            )));
        }
        self.state.sent.lock().push((data.to_vec(), addr));
        self.state.sent_notify.notify_waiters();
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let mut inbound = self.inbound.lock().await;
        let next = tokio::select! {
            () = self.closed.cancelled() => return Err(KnxError::transport_closed()),
            next = inbound.recv() => next,
        };

        match next {
            Some(Inbound::Datagram(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok((len, self.state.peer))
            }
            Some(Inbound::Failure) => Err(KnxError::receive_failed(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "mock socket failure",
            ))),
            None => Err(KnxError::transport_closed()),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.state.local)
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inject_reaches_current_transport() {
        let network = MockNetwork::new();
        assert!(!network.inject(&[1]));

        let first = network.open().await.unwrap();
        let second = network.open().await.unwrap();
        assert_eq!(network.opened_count(), 2);

        assert!(network.inject(&[1, 2, 3]));
        let mut buf = [0u8; 8];
        let (len, from) = second.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[1, 2, 3]);
        assert_eq!(from, network.peer());

        // the first transport lost its sender when the second was opened
        assert!(first.recv_from(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_and_close() {
        let network = MockNetwork::new();
        let transport = network.open().await.unwrap();

        network.fail_current();
        let err = transport.recv_from(&mut [0u8; 8]).await.unwrap_err();
        assert!(err.is_transport_lost());

        transport.close();
        assert!(transport.recv_from(&mut [0u8; 8]).await.is_err());
        assert!(transport.send_to(&[0], network.peer()).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_next_send_drops_one_datagram() {
        let network = MockNetwork::new();
        let transport = network.open().await.unwrap();

        network.fail_next_send();
        assert!(transport.send_to(&[1], network.peer()).await.is_err());
        transport.send_to(&[2], network.peer()).await.unwrap();
        assert_eq!(network.sent(), vec![vec![2]]);
    }

    #[tokio::test]
    async fn test_wait_for_sent() {
        let network = MockNetwork::new();
        let transport = network.open().await.unwrap();

        let waiter = {
            let network = network.clone();
            tokio::spawn(async move { network.wait_for_sent(2).await })
        };
        transport.send_to(&[1], network.peer()).await.unwrap();
        transport.send_to(&[2], network.peer()).await.unwrap();

        assert_eq!(waiter.await.unwrap(), vec![vec![1], vec![2]]);
    }
}
