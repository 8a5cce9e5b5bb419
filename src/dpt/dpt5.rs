//! DPT 5.xxx - 8-bit Unsigned Value
//!
//! One byte, either used raw (0-255) or scaled to a range:
//!
//! - **5.001** - Percentage (0-100%)
//! - **5.003** - Angle (0-360°)
//! - **5.004** - Percentage 0-255
//! - **5.010** - Counter pulses (0-255)
//!
//! Scaled values are rounded to the nearest step in both directions.
//!
//! ## Example
//!
//! ```
//! use knx_netip::dpt::{Dpt5, DptDecode, DptEncode};
//!
//! assert_eq!(Dpt5::Percentage.encode(100).unwrap(), vec![0xFF]);
//! assert_eq!(Dpt5::Angle.decode(&[0x80]).unwrap(), 181);
//! ```

use crate::dpt::{first_byte, unsigned_in_range, DptDecode, DptEncode, DptFamily, DptValue};
use crate::error::{KnxError, Result};

/// DPT 5.xxx 8-bit unsigned types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt5 {
    /// DPT 5.001 - Percentage (0-100%)
    Percentage,
    /// DPT 5.003 - Angle (0-360°)
    Angle,
    /// DPT 5.004 - Percentage 0-255
    PercentU8,
    /// DPT 5.010 - Counter pulses (0-255)
    Counter,
}

impl Dpt5 {
    /// Get the unit string
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt5::Percentage | Dpt5::PercentU8 => "%",
            Dpt5::Angle => "°",
            Dpt5::Counter => "pulses",
        }
    }

    /// Largest value in the type's unit
    pub const fn max(&self) -> u16 {
        match self {
            Dpt5::Percentage => 100,
            Dpt5::Angle => 360,
            Dpt5::PercentU8 | Dpt5::Counter => 255,
        }
    }

    fn scaled(&self) -> bool {
        matches!(self, Dpt5::Percentage | Dpt5::Angle)
    }
}

impl DptEncode<u16> for Dpt5 {
    fn encode(&self, value: u16) -> Result<Vec<u8>> {
        let max = u32::from(self.max());
        let value = u32::from(value);
        if value > max {
            return Err(KnxError::dpt_value_out_of_range());
        }
        let raw = if self.scaled() {
            (value * 255 + max / 2) / max
        } else {
            value
        };
        Ok(vec![raw as u8])
    }
}

impl DptDecode<u16> for Dpt5 {
    fn decode(&self, data: &[u8]) -> Result<u16> {
        let raw = u32::from(first_byte(data)?);
        let value = if self.scaled() {
            (raw * u32::from(self.max()) + 127) / 255
        } else {
            raw
        };
        Ok(value as u16)
    }
}

impl DptFamily for Dpt5 {
    const ALL: &'static [Self] = &[Dpt5::Percentage, Dpt5::Angle, Dpt5::PercentU8, Dpt5::Counter];

    fn identifier(&self) -> &'static str {
        match self {
            Dpt5::Percentage => "5.001",
            Dpt5::Angle => "5.003",
            Dpt5::PercentU8 => "5.004",
            Dpt5::Counter => "5.010",
        }
    }

    fn decode_value(&self, data: &[u8]) -> Result<DptValue> {
        self.decode(data).map(|v| DptValue::Unsigned(u32::from(v)))
    }

    fn encode_value(&self, value: &DptValue) -> Result<Vec<u8>> {
        self.encode(unsigned_in_range(value, u32::from(self.max()))? as u16)
    }
}
