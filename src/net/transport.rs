//! Network transport abstraction for KNXnet/IP communication.
//!
//! High-level code (the receive pipeline, tunnel and routing connections)
//! depends on [`AsyncTransport`] only; UDP sockets and the test mock both
//! implement it.
//!
//! A transport is shared between the reader task, which sits in
//! [`AsyncTransport::recv_from`], and senders on other tasks, so every method
//! takes `&self`. [`AsyncTransport::close`] must wake a pending receive so the
//! reader can observe cancellation deterministically.
//!
//! ## Example
//!
//! ```rust,no_run
//! use knx_netip::net::{AsyncTransport, TransportFactory, UnicastUdpFactory};
//!
//! # async fn demo() -> knx_netip::Result<()> {
//! let factory = UnicastUdpFactory::new("0.0.0.0:0".parse().unwrap());
//! let transport = factory.open().await?;
//! transport.send_to(&[0x06, 0x10], "192.168.1.10:3671".parse().unwrap()).await?;
//! transport.close();
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use core::future::Future;
use std::net::SocketAddr;

/// Asynchronous datagram transport.
pub trait AsyncTransport: Send + Sync + 'static {
    /// Send one datagram to `addr`.
    ///
    /// # Errors
    ///
    /// Transport error if the socket rejects the datagram or was closed.
    fn send_to(&self, data: &[u8], addr: SocketAddr) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next datagram, returning its length and source.
    ///
    /// # Errors
    ///
    /// Transport error if the socket fails or [`AsyncTransport::close`] was
    /// called, including while this call was pending.
    fn recv_from(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(usize, SocketAddr)>> + Send;

    /// Local endpoint, advertised to tunneling gateways in HPAIs.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Close the transport, failing any pending and future receive.
    fn close(&self);
}

/// Source of fresh transports, one per connect attempt.
pub trait TransportFactory: Send + Sync + 'static {
    /// Transport produced by this factory
    type Transport: AsyncTransport;

    /// Open a new transport.
    fn open(&self) -> impl Future<Output = Result<Self::Transport>> + Send;
}
