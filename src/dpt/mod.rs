//! KNX Datapoint Types (DPT) and the codec registry.
//!
//! DPTs define how to interpret the value bytes of a group telegram. A
//! connection never guesses a type: the integrator registers codecs in a
//! [`CodecRegistry`] and asks for a translation by type identifier
//! (`"9.001"`).
//!
//! ## Supported DPT Families
//!
//! - **DPT 1.xxx** - Boolean (1 bit): switches, buttons, binary sensors
//! - **DPT 5.xxx** - 8-bit unsigned: percentages, angles, counters
//! - **DPT 7.xxx** - 16-bit unsigned: pulses, brightness, color temperature
//! - **DPT 9.xxx** - 2-byte float: temperature, illuminance, pressure
//!
//! ## Usage
//!
//! ```
//! use knx_netip::dpt::{CodecRegistry, DptValue};
//!
//! let registry = CodecRegistry::with_standard();
//! let bytes = registry.encode("9.001", &DptValue::Float(21.5)).unwrap();
//! assert_eq!(bytes, vec![0x0C, 0x33]);
//!
//! let value = registry.decode("5.001", &[0xFF]).unwrap();
//! assert_eq!(value, DptValue::Unsigned(100));
//! ```

use crate::error::{KnxError, Result};
use core::fmt;
use core::marker::PhantomData;
use std::collections::HashMap;
use std::sync::Arc;

pub mod dpt1;
pub mod dpt5;
pub mod dpt7;
pub mod dpt9;

#[doc(inline)]
pub use dpt1::Dpt1;
#[doc(inline)]
pub use dpt5::Dpt5;
#[doc(inline)]
pub use dpt7::Dpt7;
#[doc(inline)]
pub use dpt9::Dpt9;

/// A decoded datapoint value
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DptValue {
    /// DPT 1.xxx
    Bool(bool),
    /// DPT 5.xxx and 7.xxx, in the type's unit
    Unsigned(u32),
    /// DPT 9.xxx
    Float(f32),
}

impl fmt::Display for DptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:.2}"),
        }
    }
}

/// Trait for encoding values to KNX data format
pub trait DptEncode<T> {
    /// Encode a value to its KNX byte representation
    fn encode(&self, value: T) -> Result<Vec<u8>>;
}

/// Trait for decoding KNX data to values
pub trait DptDecode<T> {
    /// Decode KNX byte representation to a value
    fn decode(&self, data: &[u8]) -> Result<T>;
}

/// Translates between raw value bytes and [`DptValue`] for a set of type
/// identifiers.
pub trait ValueCodec: Send + Sync + fmt::Debug {
    /// Type identifiers this codec handles
    fn ids(&self) -> Vec<&'static str>;

    /// Decode `data` as `type_id`
    fn decode(&self, type_id: &str, data: &[u8]) -> Result<DptValue>;

    /// Encode `value` as `type_id`
    fn encode(&self, type_id: &str, value: &DptValue) -> Result<Vec<u8>>;

    /// Whether `type_id` fits in the 6 bits of the APCI byte
    fn is_short(&self, _type_id: &str) -> bool {
        false
    }
}

/// One DPT family: an enum of subtypes sharing a wire format.
pub trait DptFamily: Copy + fmt::Debug + Send + Sync + 'static {
    /// Every subtype of the family
    const ALL: &'static [Self];

    /// Values fit in the 6 bits of the APCI byte
    const SHORT: bool = false;

    /// DPT identifier string (e.g., "1.001")
    fn identifier(&self) -> &'static str;

    /// Decode raw bytes
    fn decode_value(&self, data: &[u8]) -> Result<DptValue>;

    /// Encode a value
    fn encode_value(&self, value: &DptValue) -> Result<Vec<u8>>;

    /// Subtype for an identifier
    fn from_identifier(id: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.identifier() == id)
    }
}

/// [`ValueCodec`] covering every subtype of a [`DptFamily`]
pub struct FamilyCodec<D>(PhantomData<D>);

impl<D> FamilyCodec<D> {
    /// Codec for family `D`
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<D> Default for FamilyCodec<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for FamilyCodec<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FamilyCodec<{}>", core::any::type_name::<D>())
    }
}

impl<D: DptFamily> FamilyCodec<D> {
    fn subtype(type_id: &str) -> Result<D> {
        D::from_identifier(type_id).ok_or_else(KnxError::unknown_dpt)
    }
}

impl<D: DptFamily> ValueCodec for FamilyCodec<D> {
    fn ids(&self) -> Vec<&'static str> {
        D::ALL.iter().map(DptFamily::identifier).collect()
    }

    fn decode(&self, type_id: &str, data: &[u8]) -> Result<DptValue> {
        Self::subtype(type_id)?.decode_value(data)
    }

    fn encode(&self, type_id: &str, value: &DptValue) -> Result<Vec<u8>> {
        Self::subtype(type_id)?.encode_value(value)
    }

    fn is_short(&self, _type_id: &str) -> bool {
        D::SHORT
    }
}

/// Explicit table from type identifier to codec.
///
/// Built at start-up and handed to a connection; there is no global
/// instance.
#[derive(Debug, Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<&'static str, Arc<dyn ValueCodec>>,
}

impl CodecRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with DPT 1, 5, 7 and 9
    pub fn with_standard() -> Self {
        let mut registry = Self::new();
        registry.register(FamilyCodec::<Dpt1>::new());
        registry.register(FamilyCodec::<Dpt5>::new());
        registry.register(FamilyCodec::<Dpt7>::new());
        registry.register(FamilyCodec::<Dpt9>::new());
        registry
    }

    /// Register `codec` for every identifier it reports, replacing any
    /// earlier registration.
    pub fn register(&mut self, codec: impl ValueCodec + 'static) -> &mut Self {
        let codec: Arc<dyn ValueCodec> = Arc::new(codec);
        for id in codec.ids() {
            self.codecs.insert(id, Arc::clone(&codec));
        }
        self
    }

    /// Check whether `type_id` has a codec
    pub fn contains(&self, type_id: &str) -> bool {
        self.codecs.contains_key(type_id)
    }

    fn codec(&self, type_id: &str) -> Result<&Arc<dyn ValueCodec>> {
        self.codecs.get(type_id).ok_or_else(KnxError::unknown_dpt)
    }

    /// Decode `data` as `type_id`
    pub fn decode(&self, type_id: &str, data: &[u8]) -> Result<DptValue> {
        self.codec(type_id)?.decode(type_id, data)
    }

    /// Encode `value` as `type_id`
    pub fn encode(&self, type_id: &str, value: &DptValue) -> Result<Vec<u8>> {
        self.codec(type_id)?.encode(type_id, value)
    }

    /// Whether `type_id` is sent packed into the APCI byte
    pub fn is_short(&self, type_id: &str) -> Result<bool> {
        Ok(self.codec(type_id)?.is_short(type_id))
    }
}

/// First byte of `data`, or an invalid-data error
pub(crate) fn first_byte(data: &[u8]) -> Result<u8> {
    data.first().copied().ok_or_else(KnxError::invalid_dpt_data)
}

/// Value as an unsigned integer no larger than `max`
pub(crate) fn unsigned_in_range(value: &DptValue, max: u32) -> Result<u32> {
    let raw = match *value {
        DptValue::Unsigned(v) => v,
        DptValue::Bool(v) => u32::from(v),
        DptValue::Float(_) => return Err(KnxError::invalid_value()),
    };
    if raw > max {
        return Err(KnxError::dpt_value_out_of_range());
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_ids() {
        let registry = CodecRegistry::with_standard();
        for id in ["1.001", "1.008", "5.001", "5.010", "7.013", "9.001", "9.004"] {
            assert!(registry.contains(id), "{id}");
        }
        assert!(!registry.contains("13.010"));
    }

    #[test]
    fn test_unknown_type() {
        let registry = CodecRegistry::with_standard();
        match registry.decode("13.010", &[0, 0, 0, 0]) {
            Err(KnxError::Value(e)) => assert!(e.is_unknown_type()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(CodecRegistry::new().encode("1.001", &DptValue::Bool(true)).is_err());
    }

    #[test]
    fn test_short_flag() {
        let registry = CodecRegistry::with_standard();
        assert!(registry.is_short("1.001").unwrap());
        assert!(!registry.is_short("9.001").unwrap());
    }

    #[derive(Debug)]
    struct Scene;

    impl ValueCodec for Scene {
        fn ids(&self) -> Vec<&'static str> {
            vec!["17.001"]
        }

        fn decode(&self, _type_id: &str, data: &[u8]) -> Result<DptValue> {
            Ok(DptValue::Unsigned(u32::from(first_byte(data)? & 0x3F)))
        }

        fn encode(&self, _type_id: &str, value: &DptValue) -> Result<Vec<u8>> {
            Ok(vec![unsigned_in_range(value, 63)? as u8])
        }
    }

    #[test]
    fn test_register_custom_codec() {
        let mut registry = CodecRegistry::new();
        registry.register(Scene);
        assert_eq!(registry.decode("17.001", &[0x85]).unwrap(), DptValue::Unsigned(5));
        assert!(registry.encode("17.001", &DptValue::Unsigned(64)).is_err());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(DptValue::Float(21.456).to_string(), "21.46");
        assert_eq!(DptValue::Bool(true).to_string(), "true");
    }
}
