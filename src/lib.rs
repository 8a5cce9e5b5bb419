#![doc = include_str!("../README.md")]

//! ## Crate layout
//!
//! - [`protocol`] - KNXnet/IP frames, service bodies and cEMI encoding
//! - [`connection`] - tunnel and routing connections, send gate, handlers
//! - [`net`] - datagram transports (tokio UDP and an in-memory mock)
//! - [`dpt`] - datapoint codecs and the codec registry
//! - [`addressing`] - individual and group addresses
//! - [`configuration`] - connection settings
//! - [`error`] - the crate error type

// Macro modules (must be declared before use)
#[macro_use]
pub mod logging;

pub mod addressing;
pub mod configuration;
pub mod connection;
pub mod dpt;
pub mod error;
pub mod net;
pub mod protocol;

// Re-export commonly used types
#[doc(inline)]
pub use addressing::{AddressingMode, GroupAddress, IndividualAddress, KnxAddress};
#[doc(inline)]
pub use configuration::ConnectionConfig;
#[doc(inline)]
pub use connection::{
    ActionValue, ConnectionBuilder, ConnectionHandler, Handlers, RoutingConnection,
    TunnelConnection, TunnelState,
};
#[doc(inline)]
pub use dpt::{CodecRegistry, DptValue};
#[doc(inline)]
pub use error::{KnxError, Result};
