//! DPT 9.xxx - 2-byte Float (16-bit floating point)
//!
//! ## Format
//!
//! ```text
//! Byte 0: SEEE EMMM
//! Byte 1: MMMM MMMM
//!
//! S = Sign bit (bit 15: 0 = positive, 1 = negative)
//! E = Exponent (bits 14-11: 4 bits, unsigned, range 0-15)
//! M = Mantissa (bits 10-0, two's complement together with S)
//!
//! Value = (0.01 * M) * 2^E
//! ```
//!
//! ## Range
//!
//! - Min: -671088.64
//! - Max: +670760.96
//! - Resolution: 0.01 at exponent 0
//!
//! ## Example
//!
//! ```
//! use knx_netip::dpt::{Dpt9, DptDecode, DptEncode};
//!
//! let bytes = Dpt9::Temperature.encode(21.5).unwrap();
//! assert_eq!(bytes, vec![0x0C, 0x33]);
//! let temp = Dpt9::Temperature.decode(&bytes).unwrap();
//! assert!((temp - 21.5).abs() < 0.01);
//! ```

use crate::dpt::{DptDecode, DptEncode, DptFamily, DptValue};
use crate::error::{KnxError, Result};

/// DPT 9.xxx 2-byte float types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt9 {
    /// DPT 9.001 - Temperature (°C)
    Temperature,
    /// DPT 9.002 - Temperature difference (K)
    TemperatureDifference,
    /// DPT 9.004 - Illuminance (lux)
    Illuminance,
    /// DPT 9.005 - Wind speed (m/s)
    WindSpeed,
    /// DPT 9.006 - Pressure (Pa)
    Pressure,
    /// DPT 9.007 - Humidity (%)
    Humidity,
    /// DPT 9.008 - Air quality (ppm)
    AirQuality,
    /// DPT 9.020 - Voltage (mV)
    Voltage,
    /// DPT 9.024 - Power (kW)
    Power,
}

impl Dpt9 {
    /// Get the unit string
    pub const fn unit(&self) -> &'static str {
        match self {
            Dpt9::Temperature => "°C",
            Dpt9::TemperatureDifference => "K",
            Dpt9::Illuminance => "lux",
            Dpt9::WindSpeed => "m/s",
            Dpt9::Pressure => "Pa",
            Dpt9::Humidity => "%",
            Dpt9::AirQuality => "ppm",
            Dpt9::Voltage => "mV",
            Dpt9::Power => "kW",
        }
    }
}

impl DptEncode<f32> for Dpt9 {
    fn encode(&self, value: f32) -> Result<Vec<u8>> {
        if !value.is_finite() {
            return Err(KnxError::invalid_value());
        }

        // Smallest exponent whose mantissa fits the 11-bit signed range
        let mut exponent = 0u8;
        let mut mantissa = (value * 100.0).round();
        while !(-2048.0..=2047.0).contains(&mantissa) {
            if exponent == 15 {
                return Err(KnxError::dpt_value_out_of_range());
            }
            exponent += 1;
            mantissa = (value * 100.0 / f32::from(1u16 << exponent)).round();
        }

        let mantissa = mantissa as i16;
        let sign_bit = u16::from(mantissa < 0);
        let mantissa_bits = (mantissa as u16) & 0x07FF;
        let raw = (sign_bit << 15) | (u16::from(exponent) << 11) | mantissa_bits;

        Ok(raw.to_be_bytes().to_vec())
    }
}

impl DptDecode<f32> for Dpt9 {
    fn decode(&self, data: &[u8]) -> Result<f32> {
        let [hi, lo, ..] = data else {
            return Err(KnxError::invalid_dpt_data());
        };
        let raw = u16::from_be_bytes([*hi, *lo]);

        let exponent = (raw >> 11) & 0x0F;
        let mantissa_raw = (raw & 0x07FF) as i16;
        let mantissa = if raw & 0x8000 != 0 {
            mantissa_raw - 2048
        } else {
            mantissa_raw
        };

        Ok(0.01 * f32::from(mantissa) * f32::from(1u16 << exponent))
    }
}

impl DptFamily for Dpt9 {
    const ALL: &'static [Self] = &[
        Dpt9::Temperature,
        Dpt9::TemperatureDifference,
        Dpt9::Illuminance,
        Dpt9::WindSpeed,
        Dpt9::Pressure,
        Dpt9::Humidity,
        Dpt9::AirQuality,
        Dpt9::Voltage,
        Dpt9::Power,
    ];

    fn identifier(&self) -> &'static str {
        match self {
            Dpt9::Temperature => "9.001",
            Dpt9::TemperatureDifference => "9.002",
            Dpt9::Illuminance => "9.004",
            Dpt9::WindSpeed => "9.005",
            Dpt9::Pressure => "9.006",
            Dpt9::Humidity => "9.007",
            Dpt9::AirQuality => "9.008",
            Dpt9::Voltage => "9.020",
            Dpt9::Power => "9.024",
        }
    }

    fn decode_value(&self, data: &[u8]) -> Result<DptValue> {
        self.decode(data).map(DptValue::Float)
    }

    fn encode_value(&self, value: &DptValue) -> Result<Vec<u8>> {
        match *value {
            DptValue::Float(v) => self.encode(v),
            DptValue::Unsigned(v) => self.encode(v as f32),
            DptValue::Bool(_) => Err(KnxError::invalid_value()),
        }
    }
}
