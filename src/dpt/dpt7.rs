//! DPT 7.xxx - 2-byte Unsigned Value
//!
//! A big-endian `u16` in the type's unit (0-65535).
//!
//! - **7.001** - Pulses
//! - **7.002** - Time period (ms)
//! - **7.005** - Time period (s)
//! - **7.012** - Current (mA)
//! - **7.013** - Brightness (lux)
//! - **7.600** - Color temperature (K)

use crate::dpt::{unsigned_in_range, DptDecode, DptEncode, DptFamily, DptValue};
use crate::error::{KnxError, Result};

/// DPT 7.xxx 16-bit unsigned types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt7 {
    /// DPT 7.001 - Pulses
    Pulses,
    /// DPT 7.002 - Time period in milliseconds
    TimePeriodMs,
    /// DPT 7.005 - Time period in seconds
    TimePeriodSec,
    /// DPT 7.012 - Current in mA
    CurrentMa,
    /// DPT 7.013 - Brightness in lux
    Brightness,
    /// DPT 7.600 - Color temperature in Kelvin
    ColorTemperature,
}

impl Dpt7 {
    /// Get the unit string
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt7::Pulses => "pulses",
            Dpt7::TimePeriodMs => "ms",
            Dpt7::TimePeriodSec => "s",
            Dpt7::CurrentMa => "mA",
            Dpt7::Brightness => "lux",
            Dpt7::ColorTemperature => "K",
        }
    }
}

impl DptEncode<u16> for Dpt7 {
    fn encode(&self, value: u16) -> Result<Vec<u8>> {
        Ok(value.to_be_bytes().to_vec())
    }
}

impl DptDecode<u16> for Dpt7 {
    fn decode(&self, data: &[u8]) -> Result<u16> {
        match data {
            [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(KnxError::invalid_dpt_data()),
        }
    }
}

impl DptFamily for Dpt7 {
    const ALL: &'static [Self] = &[
        Dpt7::Pulses,
        Dpt7::TimePeriodMs,
        Dpt7::TimePeriodSec,
        Dpt7::CurrentMa,
        Dpt7::Brightness,
        Dpt7::ColorTemperature,
    ];

    fn identifier(&self) -> &'static str {
        match self {
            Dpt7::Pulses => "7.001",
            Dpt7::TimePeriodMs => "7.002",
            Dpt7::TimePeriodSec => "7.005",
            Dpt7::CurrentMa => "7.012",
            Dpt7::Brightness => "7.013",
            Dpt7::ColorTemperature => "7.600",
        }
    }

    fn decode_value(&self, data: &[u8]) -> Result<DptValue> {
        self.decode(data).map(|v| DptValue::Unsigned(u32::from(v)))
    }

    fn encode_value(&self, value: &DptValue) -> Result<Vec<u8>> {
        self.encode(unsigned_in_range(value, u32::from(u16::MAX))? as u16)
    }
}
