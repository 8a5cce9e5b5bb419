//! KNX addressing.
//!
//! KNX uses two types of addresses:
//! - Individual addresses for physical devices (Area.Line.Device)
//! - Group addresses for logical grouping (Main/Middle/Sub or Main/Sub)
//!
//! A destination on the wire is just 16 bits; bit 7 of control field 2 tells
//! which kind it is, and the connection's [`AddressingMode`] decides how a
//! group address is rendered. [`KnxAddress`] carries both pieces.

pub mod group;
pub mod individual;

pub use group::GroupAddress;
pub use individual::IndividualAddress;

use crate::error::{KnxError, Result};
use core::fmt;

/// Group address rendering used by an installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressingMode {
    /// `main/sub`, 5/11 bits
    TwoLevel,
    /// `main/middle/sub`, 5/3/8 bits
    #[default]
    ThreeLevel,
}

/// A decoded destination (or outbound target) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KnxAddress {
    /// Physical device address
    Individual(IndividualAddress),
    /// Group address plus the mode it is rendered in
    Group(GroupAddress, AddressingMode),
}

impl KnxAddress {
    /// Interpret a raw wire value.
    pub fn from_raw(raw: u16, is_group: bool, mode: AddressingMode) -> Self {
        if is_group {
            Self::Group(GroupAddress::from(raw), mode)
        } else {
            Self::Individual(IndividualAddress::from(raw))
        }
    }

    /// Parse a dotted individual address (`1.1.5`) or a group address
    /// (`1/2/3`, `1/234`).
    ///
    /// Group addresses keep `mode` for rendering; the text itself is accepted
    /// in either format.
    pub fn parse(text: &str, mode: AddressingMode) -> Result<Self> {
        let text = text.trim();
        if text.contains('/') {
            Ok(Self::Group(text.parse()?, mode))
        } else if text.contains('.') {
            Ok(Self::Individual(text.parse()?))
        } else {
            Err(KnxError::invalid_group_address())
        }
    }

    /// Raw 16-bit value as carried on the wire.
    pub const fn raw(&self) -> u16 {
        match self {
            Self::Individual(addr) => addr.raw(),
            Self::Group(addr, _) => addr.raw(),
        }
    }

    /// Check if this is a group address.
    pub const fn is_group(&self) -> bool {
        matches!(self, Self::Group(..))
    }
}

impl fmt::Display for KnxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Individual(addr) => write!(f, "{addr}"),
            Self::Group(addr, mode) => f.write_str(&addr.render(*mode)),
        }
    }
}

impl From<IndividualAddress> for KnxAddress {
    fn from(addr: IndividualAddress) -> Self {
        Self::Individual(addr)
    }
}

impl From<GroupAddress> for KnxAddress {
    fn from(addr: GroupAddress) -> Self {
        Self::Group(addr, AddressingMode::ThreeLevel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_raw_differs_by_mode() {
        let three = KnxAddress::from_raw(0x0A03, true, AddressingMode::ThreeLevel);
        let two = KnxAddress::from_raw(0x0A03, true, AddressingMode::TwoLevel);
        assert_eq!(three.to_string(), "1/2/3");
        assert_eq!(two.to_string(), "1/515");
        assert_eq!(three.raw(), two.raw());
    }

    #[test]
    fn test_individual_ignores_mode() {
        let addr = KnxAddress::from_raw(0x1105, false, AddressingMode::TwoLevel);
        assert_eq!(addr.to_string(), "1.1.5");
        assert!(!addr.is_group());
    }

    #[test]
    fn test_parse() {
        let group = KnxAddress::parse("1/2/3", AddressingMode::ThreeLevel).unwrap();
        assert!(group.is_group());
        assert_eq!(group.raw(), 0x0A03);

        let individual = KnxAddress::parse(" 1.1.5 ", AddressingMode::ThreeLevel).unwrap();
        assert_eq!(individual.raw(), 0x1105);

        assert!(KnxAddress::parse("12", AddressingMode::ThreeLevel).is_err());
    }
}
