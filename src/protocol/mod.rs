//! KNXnet/IP protocol implementation.
//!
//! Pure encoding and decoding of KNXnet/IP frames, service bodies and cEMI
//! messages. Nothing in here performs I/O or holds state, so every function
//! can be called concurrently without synchronization.

pub mod cemi;
pub mod constants;
pub mod frame;
pub mod services;

pub use cemi::*;
pub use constants::*;
pub use frame::*;
pub use services::*;
