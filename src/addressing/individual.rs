//! Individual (physical) device addresses.
//!
//! Wire layout, 16 bits big-endian: area (4 bits), line (4 bits),
//! device (8 bits). Rendered as `area.line.device`, e.g. `1.1.5`.

use crate::error::{KnxError, Result};
use core::fmt;

/// KNX individual address (area.line.device)
///
/// ```
/// use knx_netip::IndividualAddress;
///
/// let addr: IndividualAddress = "1.1.5".parse().unwrap();
/// assert_eq!(addr.raw(), 0x1105);
/// assert_eq!(addr.to_string(), "1.1.5");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndividualAddress {
    raw: u16,
}

impl IndividualAddress {
    /// Maximum area value (4 bits)
    pub const MAX_AREA: u8 = 15;
    /// Maximum line value (4 bits)
    pub const MAX_LINE: u8 = 15;

    /// Build an address from its components.
    ///
    /// Fails with an addressing error when `area` or `line` exceed 15.
    pub fn new(area: u8, line: u8, device: u8) -> Result<Self> {
        if area > Self::MAX_AREA || line > Self::MAX_LINE {
            return Err(KnxError::address_out_of_range());
        }
        let raw = (u16::from(area) << 12) | (u16::from(line) << 8) | u16::from(device);
        Ok(Self { raw })
    }

    /// Raw 16-bit value as carried on the wire.
    #[inline]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Area component (0-15).
    #[inline]
    pub const fn area(self) -> u8 {
        ((self.raw >> 12) & 0x0F) as u8
    }

    /// Line component (0-15).
    #[inline]
    pub const fn line(self) -> u8 {
        ((self.raw >> 8) & 0x0F) as u8
    }

    /// Device component (0-255).
    #[inline]
    pub const fn device(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Big-endian wire bytes.
    #[inline]
    pub const fn to_bytes(self) -> [u8; 2] {
        self.raw.to_be_bytes()
    }

    /// Address from big-endian wire bytes.
    #[inline]
    pub const fn from_bytes(bytes: [u8; 2]) -> Self {
        Self {
            raw: u16::from_be_bytes(bytes),
        }
    }
}

impl fmt::Display for IndividualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.area(), self.line(), self.device())
    }
}

impl From<u16> for IndividualAddress {
    #[inline]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<IndividualAddress> for u16 {
    #[inline]
    fn from(addr: IndividualAddress) -> u16 {
        addr.raw
    }
}

impl core::str::FromStr for IndividualAddress {
    type Err = KnxError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('.').map(|p| p.trim().parse::<u8>());

        let mut next = || {
            parts
                .next()
                .and_then(|p| p.ok())
                .ok_or_else(KnxError::invalid_individual_address)
        };
        let area = next()?;
        let line = next()?;
        let device = next()?;

        if parts.next().is_some() {
            return Err(KnxError::invalid_individual_address());
        }

        Self::new(area, line, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components() {
        let addr = IndividualAddress::new(1, 2, 3).unwrap();
        assert_eq!(addr.area(), 1);
        assert_eq!(addr.line(), 2);
        assert_eq!(addr.device(), 3);
        assert_eq!(u16::from(addr), 0x1203);
    }

    #[test]
    fn test_out_of_range() {
        assert!(IndividualAddress::new(16, 0, 0).is_err());
        assert!(IndividualAddress::new(0, 16, 0).is_err());
    }

    #[test]
    fn test_bytes() {
        let addr = IndividualAddress::from_bytes([0x11, 0x05]);
        assert_eq!(addr.to_string(), "1.1.5");
        assert_eq!(addr.to_bytes(), [0x11, 0x05]);
    }

    #[test]
    fn test_from_str() {
        let addr: IndividualAddress = "15.15.255".parse().unwrap();
        assert_eq!(addr.raw(), 0xFFFF);
    }

    #[test]
    fn test_from_str_invalid() {
        for input in ["1.2", "16.0.0", "1.2.3.4", "a.b.c", "", "1/2/3"] {
            assert!(input.parse::<IndividualAddress>().is_err(), "{input}");
        }
    }
}
