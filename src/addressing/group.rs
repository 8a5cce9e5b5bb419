//! Group addresses.
//!
//! A group address is a raw 16-bit value. How it is rendered depends on the
//! installation's addressing mode:
//! - 3-level `main/middle/sub` with 5/3/8 bits (e.g. `1/2/3`)
//! - 2-level `main/sub` with 5/11 bits (e.g. `1/515`)
//!
//! The same wire value `0x0A03` reads as `1/2/3` or `1/515`.

use crate::addressing::AddressingMode;
use crate::error::{KnxError, Result};
use core::fmt;

/// KNX group address
///
/// ```
/// use knx_netip::GroupAddress;
///
/// let addr = GroupAddress::new(1, 2, 3).unwrap();
/// assert_eq!(addr.raw(), 0x0A03);
/// assert_eq!(addr.to_string_2level(), "1/515");
///
/// let parsed: GroupAddress = "1/515".parse().unwrap();
/// assert_eq!(parsed, addr);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupAddress {
    raw: u16,
}

impl GroupAddress {
    /// Maximum main group value (5 bits)
    pub const MAX_MAIN: u8 = 31;
    /// Maximum middle group value (3 bits)
    pub const MAX_MIDDLE: u8 = 7;
    /// Maximum sub value for 2-level format (11 bits)
    pub const MAX_SUB_2LEVEL: u16 = 2047;

    /// Build a 3-level address (main/middle/sub).
    pub fn new(main: u8, middle: u8, sub: u8) -> Result<Self> {
        if main > Self::MAX_MAIN || middle > Self::MAX_MIDDLE {
            return Err(KnxError::address_out_of_range());
        }
        let raw = (u16::from(main) << 11) | (u16::from(middle) << 8) | u16::from(sub);
        Ok(Self { raw })
    }

    /// Build a 2-level address (main/sub).
    pub fn new_2level(main: u8, sub: u16) -> Result<Self> {
        if main > Self::MAX_MAIN || sub > Self::MAX_SUB_2LEVEL {
            return Err(KnxError::address_out_of_range());
        }
        Ok(Self {
            raw: (u16::from(main) << 11) | sub,
        })
    }

    /// Raw 16-bit value as carried on the wire.
    #[inline]
    pub const fn raw(self) -> u16 {
        self.raw
    }

    /// Main group (0-31), shared by both formats.
    #[inline]
    pub const fn main(self) -> u8 {
        ((self.raw >> 11) & 0x1F) as u8
    }

    /// Middle group of the 3-level format (0-7).
    #[inline]
    pub const fn middle(self) -> u8 {
        ((self.raw >> 8) & 0x07) as u8
    }

    /// Sub group of the 3-level format (0-255).
    #[inline]
    pub const fn sub(self) -> u8 {
        (self.raw & 0xFF) as u8
    }

    /// Sub group of the 2-level format (0-2047).
    #[inline]
    pub const fn sub_2level(self) -> u16 {
        self.raw & 0x07FF
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

    /// Render as `main/middle/sub`.
    pub fn to_string_3level(&self) -> heapless::String<16> {
        self.render(AddressingMode::ThreeLevel)
    }

    /// Render as `main/sub`.
    pub fn to_string_2level(&self) -> heapless::String<16> {
        self.render(AddressingMode::TwoLevel)
    }

    /// Render in the given addressing mode.
    pub fn render(&self, mode: AddressingMode) -> heapless::String<16> {
        use core::fmt::Write;
        let mut s = heapless::String::new();
        // "31/7/255" and "31/2047" both fit in 16 bytes
        let _ = match mode {
            AddressingMode::ThreeLevel => {
                write!(s, "{}/{}/{}", self.main(), self.middle(), self.sub())
            }
            AddressingMode::TwoLevel => write!(s, "{}/{}", self.main(), self.sub_2level()),
        };
        s
    }
}

impl From<u16> for GroupAddress {
    #[inline]
    fn from(raw: u16) -> Self {
        Self { raw }
    }
}

impl From<GroupAddress> for u16 {
    #[inline]
    fn from(addr: GroupAddress) -> u16 {
        addr.raw
    }
}

impl fmt::Display for GroupAddress {
    /// 3-level rendering; use [`GroupAddress::render`] for 2-level installations.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_3level())
    }
}

impl core::str::FromStr for GroupAddress {
    type Err = KnxError;

    /// Accepts both `main/middle/sub` and `main/sub`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('/').map(str::trim);
        let fields = (parts.next(), parts.next(), parts.next());
        if parts.next().is_some() {
            return Err(KnxError::invalid_group_address());
        }

        let number = |p: &str| {
            p.parse::<u16>()
                .ok()
                .ok_or_else(KnxError::invalid_group_address)
        };

        match fields {
            (Some(main), Some(middle), Some(sub)) => {
                let (main, middle, sub) = (number(main)?, number(middle)?, number(sub)?);
                if main > u16::from(Self::MAX_MAIN)
                    || middle > u16::from(Self::MAX_MIDDLE)
                    || sub > 255
                {
                    return Err(KnxError::address_out_of_range());
                }
                Self::new(main as u8, middle as u8, sub as u8)
            }
            (Some(main), Some(sub), None) => {
                let main = number(main)?;
                if main > u16::from(Self::MAX_MAIN) {
                    return Err(KnxError::address_out_of_range());
                }
                Self::new_2level(main as u8, number(sub)?)
            }
            _ => Err(KnxError::invalid_group_address()),
        }
    }
}
