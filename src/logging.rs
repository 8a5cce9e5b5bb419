//! Logging macro and helpers.
//!
//! All crate logging goes through `knx_log!`, which forwards to the `log`
//! facade. The application picks the backend (`env_logger`, `tracing-log`, ...).
//!
//! # Usage
//!
//! ```rust,ignore
//! knx_log!(info, "Connected, channel {}", channel_id);
//! knx_log!(debug, "Received {} bytes", n);
//! knx_log!(warn, "Dropping datagram: {}", err);
//! ```

use core::fmt;

/// Crate logging macro
///
/// Accepts a level keyword followed by the usual format arguments. The log
/// target is the calling module path, as with the `log` macros.
#[macro_export]
#[doc(hidden)]
macro_rules! knx_log {
    (info, $($arg:tt)*) => { ::log::info!($($arg)*) };
    (debug, $($arg:tt)*) => { ::log::debug!($($arg)*) };
    (warn, $($arg:tt)*) => { ::log::warn!($($arg)*) };
    (error, $($arg:tt)*) => { ::log::error!($($arg)*) };
    (trace, $($arg:tt)*) => { ::log::trace!($($arg)*) };
}

/// Displays a byte slice as uppercase hex pairs separated by spaces.
///
/// ```
/// use knx_netip::logging::Hex;
///
/// assert_eq!(Hex(&[0x06, 0x10, 0x04, 0x20]).to_string(), "06 10 04 20");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_empty() {
        assert_eq!(Hex(&[]).to_string(), "");
    }

    #[test]
    fn test_hex_single() {
        assert_eq!(Hex(&[0x0A]).to_string(), "0A");
    }
}
