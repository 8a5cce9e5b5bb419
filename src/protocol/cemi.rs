//! Common External Message Interface (cEMI) decoding and encoding.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Message Code (1 byte)                    │
//! ├──────────────────────────────────────────┤
//! │ Additional Info Length (1 byte)          │
//! ├──────────────────────────────────────────┤
//! │ Additional Info (variable)               │
//! ├──────────────────────────────────────────┤
//! │ Control Field 1 (1 byte)                 │
//! │ Control Field 2 (1 byte)                 │
//! │ Source Address (2 bytes)                 │
//! │ Destination Address (2 bytes)            │
//! │ Data Length (1 byte)                     │
//! │ APDU (data length + 1 bytes)             │
//! │  ├─ TPCI / APCI high bits                │
//! │  ├─ APCI low bits / 6-bit value          │
//! │  └─ Data (variable)                      │
//! └──────────────────────────────────────────┘
//! ```
//!
//! All offsets after the additional info block are relative to its declared
//! length. The destination is interpreted as a group address when bit 7 of
//! control field 2 is set, rendered in the caller's [`AddressingMode`].
//!
//! ## Example
//!
//! ```
//! use knx_netip::protocol::cemi::{CemiMessage, Classification};
//! use knx_netip::AddressingMode;
//!
//! let bytes = [0x29, 0x00, 0xBC, 0xE0, 0x11, 0x01, 0x0A, 0x03, 0x01, 0x00, 0x81];
//! let msg = CemiMessage::decode(&bytes, AddressingMode::ThreeLevel).unwrap();
//! assert_eq!(msg.destination.to_string(), "1/2/3");
//! assert_eq!(msg.classify(), Classification::Event);
//! assert_eq!(msg.data(), &[0x01]);
//! ```

use crate::addressing::{AddressingMode, IndividualAddress, KnxAddress};
use crate::error::{KnxError, Result};
use crate::logging::Hex;
use crate::protocol::constants::{CEMIMessageCode, Priority, MAX_CEMI_SIZE};

/// Fixed-capacity buffer holding one outbound cEMI frame
pub type CemiBuffer = heapless::Vec<u8, MAX_CEMI_SIZE>;

/// Control Field 1 of `L_Data` frame
///
/// ```text
/// Bit 7: Frame Type (0=extended, 1=standard)
/// Bit 6: Reserved
/// Bit 5: Repeat (0=repeat, 1=do not repeat)
/// Bit 4: System Broadcast (0=system, 1=broadcast)
/// Bit 3-2: Priority (00=system, 01=normal, 10=urgent, 11=low)
/// Bit 1: Acknowledge Request (0=no ack, 1=ack requested)
/// Bit 0: Confirm (0=no error, 1=error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField1 {
    raw: u8,
}

impl From<u8> for ControlField1 {
    #[inline]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField1> for u8 {
    #[inline]
    fn from(ctrl: ControlField1) -> u8 {
        ctrl.raw
    }
}

impl ControlField1 {
    /// Get raw byte value
    #[inline]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Check if frame is standard (true) or extended (false)
    #[inline]
    pub const fn is_standard_frame(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Check if repeat flag is set (do not repeat if true)
    #[inline]
    pub const fn do_not_repeat(self) -> bool {
        (self.raw & 0x20) != 0
    }

    /// Check if this is a system broadcast
    #[inline]
    pub const fn is_broadcast(self) -> bool {
        (self.raw & 0x10) != 0
    }

    /// Get priority
    #[inline]
    pub const fn priority(self) -> Priority {
        Priority::from_u8((self.raw >> 2) & 0x03)
    }

    /// Check if acknowledge is requested
    #[inline]
    pub const fn ack_requested(self) -> bool {
        (self.raw & 0x02) != 0
    }

    /// Check if confirm error flag is set
    #[inline]
    pub const fn has_error(self) -> bool {
        (self.raw & 0x01) != 0
    }
}

impl Default for ControlField1 {
    /// Standard frame, repeat allowed, broadcast, normal priority: `0x94`
    #[inline]
    fn default() -> Self {
        Self { raw: 0x94 }
    }
}

/// Control Field 2 of `L_Data` frame
///
/// ```text
/// Bit 7: Destination Address Type (0=individual, 1=group)
/// Bit 6-4: Hop Count (0-7)
/// Bit 3-0: Extended Frame Format (0000=standard)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlField2 {
    raw: u8,
}

impl From<u8> for ControlField2 {
    #[inline]
    fn from(raw: u8) -> Self {
        Self { raw }
    }
}

impl From<ControlField2> for u8 {
    #[inline]
    fn from(ctrl: ControlField2) -> u8 {
        ctrl.raw
    }
}

impl ControlField2 {
    /// Hop count used for outbound frames
    pub const DEFAULT_HOP_COUNT: u8 = 6;

    /// Get raw byte value
    #[inline]
    pub const fn raw(self) -> u8 {
        self.raw
    }

    /// Check if destination is group address (true) or individual (false)
    #[inline]
    pub const fn is_group_address(self) -> bool {
        (self.raw & 0x80) != 0
    }

    /// Get hop count (0-7)
    #[inline]
    pub const fn hop_count(self) -> u8 {
        (self.raw >> 4) & 0x07
    }

    /// Get extended frame format
    #[inline]
    pub const fn extended_format(self) -> u8 {
        self.raw & 0x0F
    }

    /// Create a new Control Field 2
    pub const fn new(is_group: bool, hop_count: u8, extended_format: u8) -> Self {
        let mut raw = 0u8;

        if is_group {
            raw |= 0x80;
        }
        raw |= (hop_count & 0x07) << 4;
        raw |= extended_format & 0x0F;

        Self { raw }
    }

    /// Control field for an outbound frame to `destination`
    pub const fn for_destination(destination: &KnxAddress) -> Self {
        Self::new(destination.is_group(), Self::DEFAULT_HOP_COUNT, 0)
    }
}

impl Default for ControlField2 {
    /// Group address, hop count 6, standard format: `0xE0`
    #[inline]
    fn default() -> Self {
        Self { raw: 0xE0 }
    }
}

/// Application-layer service carried by the first two APDU bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Apci {
    /// `A_GroupValue_Read`
    GroupValueRead,
    /// `A_GroupValue_Response`
    GroupValueResponse,
    /// `A_GroupValue_Write`
    GroupValueWrite,
    /// Anything else, as the raw 10-bit value
    Other(u16),
}

impl Apci {
    /// Decode from the TPCI byte and the APCI byte.
    ///
    /// Only bits 1-0 of `byte1` and bits 7-6 of `byte2` select the service;
    /// bits 5-0 of `byte2` carry a 6-bit value for short payloads.
    pub const fn from_bytes(byte1: u8, byte2: u8) -> Self {
        let apci = ((byte1 as u16 & 0x03) << 8) | (byte2 as u16 & 0xC0);
        match apci {
            0x000 => Self::GroupValueRead,
            0x040 => Self::GroupValueResponse,
            0x080 => Self::GroupValueWrite,
            _ => Self::Other(apci),
        }
    }
}

/// How a decoded message is routed by a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Unsolicited write; queued to the event consumer
    Event,
    /// Answer to a status request; dispatched directly
    Status,
    /// Not application-relevant
    Ignored,
}

/// A decoded cEMI `L_Data` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CemiMessage {
    /// Raw message code (`0x29` = `L_Data.ind`)
    pub message_code: u8,
    /// Additional information block, usually empty
    pub additional_info: Vec<u8>,
    /// Control field 1
    pub ctrl1: ControlField1,
    /// Control field 2
    pub ctrl2: ControlField2,
    /// Source, always an individual address
    pub source: IndividualAddress,
    /// Destination, individual or group depending on control field 2
    pub destination: KnxAddress,
    /// NPDU length: APDU length minus one
    pub data_length: u8,
    /// Application data unit, `data_length + 1` bytes
    pub apdu: Vec<u8>,
}

impl CemiMessage {
    /// Bytes before the additional info block
    const PREFIX_SIZE: usize = 2;
    /// Control fields, addresses, data length
    const SERVICE_HEADER_SIZE: usize = 7;

    /// Decode a cEMI message.
    ///
    /// # Errors
    ///
    /// Malformed-frame error when the buffer is shorter than the declared
    /// additional info length or data length require.
    pub fn decode(bytes: &[u8], mode: AddressingMode) -> Result<Self> {
        let [message_code, info_len, rest @ ..] = bytes else {
            return Err(KnxError::malformed_frame());
        };

        let info_len = usize::from(*info_len);
        if rest.len() < info_len + Self::SERVICE_HEADER_SIZE {
            return Err(KnxError::malformed_frame());
        }
        let (additional_info, service) = rest.split_at(info_len);

        let ctrl1 = ControlField1::from(service[0]);
        let ctrl2 = ControlField2::from(service[1]);
        let source = IndividualAddress::from_bytes([service[2], service[3]]);
        let destination = KnxAddress::from_raw(
            u16::from_be_bytes([service[4], service[5]]),
            ctrl2.is_group_address(),
            mode,
        );
        let data_length = service[6];

        let apdu_len = usize::from(data_length) + 1;
        let apdu = service
            .get(Self::SERVICE_HEADER_SIZE..Self::SERVICE_HEADER_SIZE + apdu_len)
            .ok_or_else(KnxError::malformed_frame)?;

        Ok(Self {
            message_code: *message_code,
            additional_info: additional_info.to_vec(),
            ctrl1,
            ctrl2,
            source,
            destination,
            data_length,
            apdu: apdu.to_vec(),
        })
    }

    /// Known message code, if any
    pub const fn code(&self) -> Option<CEMIMessageCode> {
        CEMIMessageCode::from_u8(self.message_code)
    }

    /// Application service, when the APDU carries one
    pub fn apci(&self) -> Option<Apci> {
        match self.apdu.as_slice() {
            [tpci, apci, ..] => Some(Apci::from_bytes(*tpci, *apci)),
            _ => None,
        }
    }

    /// Value bytes of the APDU.
    ///
    /// Data length 0 has no value, data length 1 carries a 6-bit value in
    /// the APCI byte, anything longer carries the value after the APCI byte.
    pub fn data(&self) -> Vec<u8> {
        match (self.data_length, self.apdu.as_slice()) {
            (0, _) => Vec::new(),
            (1, [_, apci, ..]) => vec![apci & 0x3F],
            (_, [_, _, data @ ..]) => data.to_vec(),
            _ => Vec::new(),
        }
    }

    /// Route this message: only `L_Data.ind` frames whose APCI high nibble
    /// is 8 (write) or 4 (response) are application-relevant.
    pub fn classify(&self) -> Classification {
        if self.message_code != CEMIMessageCode::LDataInd.to_u8() {
            return Classification::Ignored;
        }
        match self.apdu.get(1).map(|b| b >> 4) {
            Some(0x8) => Classification::Event,
            Some(0x4) => Classification::Status,
            _ => Classification::Ignored,
        }
    }

    /// Dump every field at debug level
    pub(crate) fn log_fields(&self) {
        knx_log!(debug, "cEMI message code: 0x{:02X}", self.message_code);
        knx_log!(debug, "cEMI additional info: [{}]", Hex(&self.additional_info));
        knx_log!(debug, "cEMI control field 1: {:08b}", self.ctrl1.raw());
        knx_log!(debug, "cEMI control field 2: {:08b}", self.ctrl2.raw());
        knx_log!(debug, "cEMI source: {}", self.source);
        knx_log!(debug, "cEMI destination: {}", self.destination);
        knx_log!(debug, "cEMI data length: {}", self.data_length);
        knx_log!(debug, "cEMI APDU: [{}]", Hex(&self.apdu));
        knx_log!(debug, "cEMI data: [{}]", Hex(&self.data()));
    }
}

/// Decode a cEMI message; see [`CemiMessage::decode`].
pub fn decode_cemi(bytes: &[u8], mode: AddressingMode) -> Result<CemiMessage> {
    CemiMessage::decode(bytes, mode)
}

/// Value carried by an outbound group write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApduPayload<'a> {
    /// 6-bit value packed into the APCI byte (data length 1)
    Short(u8),
    /// Bytes appended after the APCI byte (data length 1 + n)
    Long(&'a [u8]),
}

/// APCI byte of `A_GroupValue_Write`
const APCI_WRITE: u8 = 0x80;
/// APCI byte of `A_GroupValue_Read`
const APCI_READ: u8 = 0x00;

fn encode_frame(
    destination: &KnxAddress,
    message_code: u8,
    apci: u8,
    payload: ApduPayload<'_>,
) -> Result<CemiBuffer> {
    let (apci, data) = match payload {
        ApduPayload::Short(value) => {
            if value > 0x3F {
                return Err(KnxError::invalid_value());
            }
            (apci | value, &[][..])
        }
        ApduPayload::Long(data) => (apci, data),
    };
    let data_length = u8::try_from(data.len() + 1).map_err(|_| KnxError::payload_too_large())?;

    let mut frame = CemiBuffer::new();
    let mut push = |bytes: &[u8]| {
        frame
            .extend_from_slice(bytes)
            .map_err(|_| KnxError::payload_too_large())
    };
    push(&[
        message_code,
        0x00,
        ControlField1::default().raw(),
        ControlField2::for_destination(destination).raw(),
    ])?;
    push(&IndividualAddress::default().to_bytes())?;
    push(&destination.raw().to_be_bytes())?;
    push(&[data_length, 0x00, apci])?;
    push(data)?;

    Ok(frame)
}

/// Build an outbound group write to `destination`.
///
/// The source address is left at `0.0.0` for the gateway to fill in.
pub fn encode_action(
    destination: &KnxAddress,
    payload: ApduPayload<'_>,
    message_code: u8,
) -> Result<CemiBuffer> {
    encode_frame(destination, message_code, APCI_WRITE, payload)
}

/// Build an outbound group read of `destination`.
pub fn encode_status_request(destination: &KnxAddress, message_code: u8) -> Result<CemiBuffer> {
    encode_frame(destination, message_code, APCI_READ, ApduPayload::Short(0))
}
