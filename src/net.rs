//! Datagram transports used by connections.
//!
//! Connections never touch sockets directly: they ask a [`TransportFactory`]
//! for a fresh [`AsyncTransport`] on every connect and close it on teardown.
//! [`udp`] provides the tokio implementations, [`mock_transport`] an
//! in-memory one for tests.

pub mod mock_transport;
pub mod transport;
pub mod udp;

pub use mock_transport::{MockNetwork, MockTransport};
pub use transport::{AsyncTransport, TransportFactory};
pub use udp::{MulticastUdpFactory, UdpTransport, UnicastUdpFactory};
