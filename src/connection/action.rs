//! Values accepted by `action`.

use crate::addressing::KnxAddress;
use crate::error::{KnxError, Result};
use crate::protocol::cemi::{encode_action, ApduPayload, CemiBuffer};

/// A value to write to a group address.
///
/// | Variant | On the wire |
/// |---------|-------------|
/// | `Bool` | 6-bit value in the APCI byte |
/// | `Byte` | one byte after the APCI byte |
/// | `Int` | one byte up to 255, two big-endian bytes up to 65535 |
/// | `Text` | ASCII bytes after the APCI byte |
/// | `Bytes` | verbatim after the APCI byte |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionValue {
    /// Switch-style 1-bit value
    Bool(bool),
    /// Single byte
    Byte(u8),
    /// Unsigned integer up to 65535
    Int(u32),
    /// ASCII text
    Text(String),
    /// Raw bytes
    Bytes(Vec<u8>),
}

impl ActionValue {
    /// Build the outbound cEMI frame for this value.
    ///
    /// # Errors
    ///
    /// Invalid-value error for an `Int` above 65535 or non-ASCII text.
    pub(crate) fn encode(&self, destination: &KnxAddress, message_code: u8) -> Result<CemiBuffer> {
        match self {
            Self::Bool(v) => encode_action(destination, ApduPayload::Short(u8::from(*v)), message_code),
            Self::Byte(v) => encode_action(destination, ApduPayload::Long(&[*v]), message_code),
            Self::Int(v) => {
                if let Ok(byte) = u8::try_from(*v) {
                    encode_action(destination, ApduPayload::Long(&[byte]), message_code)
                } else if let Ok(word) = u16::try_from(*v) {
                    encode_action(destination, ApduPayload::Long(&word.to_be_bytes()), message_code)
                } else {
                    Err(KnxError::invalid_value())
                }
            }
            Self::Text(text) => {
                if !text.is_ascii() {
                    return Err(KnxError::invalid_value());
                }
                encode_action(destination, ApduPayload::Long(text.as_bytes()), message_code)
            }
            Self::Bytes(bytes) => encode_action(destination, ApduPayload::Long(bytes), message_code),
        }
    }
}

impl From<bool> for ActionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u8> for ActionValue {
    fn from(value: u8) -> Self {
        Self::Byte(value)
    }
}

impl From<u32> for ActionValue {
    fn from(value: u32) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ActionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for ActionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for ActionValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}
