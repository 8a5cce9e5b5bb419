//! DPT 1.xxx - Boolean (1-bit)
//!
//! ## Format
//!
//! - 6 bits: unused (always 0)
//! - 2 bits: data (only LSB used)
//!
//! On the bus the value travels in the low bits of the APCI byte, so
//! connections send it in the short form.
//!
//! ## Example
//!
//! ```
//! use knx_netip::dpt::{Dpt1, DptDecode, DptEncode};
//!
//! assert_eq!(Dpt1::Switch.encode(true).unwrap(), vec![0x01]);
//! assert!(Dpt1::Switch.decode(&[0x01]).unwrap());
//! ```

use crate::dpt::{first_byte, unsigned_in_range, DptDecode, DptEncode, DptFamily, DptValue};
use crate::error::Result;

/// DPT 1.xxx Boolean types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dpt1 {
    /// DPT 1.001 - Switch (off/on)
    Switch,
    /// DPT 1.002 - Bool (false/true)
    Bool,
    /// DPT 1.003 - Enable (disable/enable)
    Enable,
    /// DPT 1.005 - Alarm (no alarm/alarm)
    Alarm,
    /// DPT 1.007 - Step (decrease/increase)
    Step,
    /// DPT 1.008 - UpDown (up/down)
    UpDown,
    /// DPT 1.009 - OpenClose (open/close)
    OpenClose,
    /// DPT 1.010 - Start (stop/start)
    Start,
    /// DPT 1.011 - State (inactive/active)
    State,
}

impl Dpt1 {
    /// Semantic labels for (false, true)
    pub const fn labels(&self) -> (&'static str, &'static str) {
        match self {
            Dpt1::Switch => ("off", "on"),
            Dpt1::Bool => ("false", "true"),
            Dpt1::Enable => ("disable", "enable"),
            Dpt1::Alarm => ("no alarm", "alarm"),
            Dpt1::Step => ("decrease", "increase"),
            Dpt1::UpDown => ("up", "down"),
            Dpt1::OpenClose => ("open", "close"),
            Dpt1::Start => ("stop", "start"),
            Dpt1::State => ("inactive", "active"),
        }
    }
}

impl DptEncode<bool> for Dpt1 {
    fn encode(&self, value: bool) -> Result<Vec<u8>> {
        Ok(vec![u8::from(value)])
    }
}

impl DptDecode<bool> for Dpt1 {
    fn decode(&self, data: &[u8]) -> Result<bool> {
        Ok(first_byte(data)? & 0x01 != 0)
    }
}

impl DptFamily for Dpt1 {
    const ALL: &'static [Self] = &[
        Dpt1::Switch,
        Dpt1::Bool,
        Dpt1::Enable,
        Dpt1::Alarm,
        Dpt1::Step,
        Dpt1::UpDown,
        Dpt1::OpenClose,
        Dpt1::Start,
        Dpt1::State,
    ];
    const SHORT: bool = true;

    fn identifier(&self) -> &'static str {
        match self {
            Dpt1::Switch => "1.001",
            Dpt1::Bool => "1.002",
            Dpt1::Enable => "1.003",
            Dpt1::Alarm => "1.005",
            Dpt1::Step => "1.007",
            Dpt1::UpDown => "1.008",
            Dpt1::OpenClose => "1.009",
            Dpt1::Start => "1.010",
            Dpt1::State => "1.011",
        }
    }

    fn decode_value(&self, data: &[u8]) -> Result<DptValue> {
        self.decode(data).map(DptValue::Bool)
    }

    fn encode_value(&self, value: &DptValue) -> Result<Vec<u8>> {
        self.encode(unsigned_in_range(value, 1)? == 1)
    }
}
