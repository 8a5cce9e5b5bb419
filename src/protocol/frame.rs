//! KNXnet/IP frame header parsing and encoding.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌─────────────────────────────┐
//! │  Header (6 bytes)           │
//! │  - Header Length: 0x06      │
//! │  - Protocol Version: 0x10   │
//! │  - Service Type: 2 bytes    │
//! │  - Total Length: 2 bytes    │
//! ├─────────────────────────────┤
//! │  Body (variable)            │
//! │  - Service-specific data    │
//! └─────────────────────────────┘
//! ```
//!
//! The header is validated before anything looks at the body: a datagram
//! whose declared total length differs from the number of bytes received
//! is rejected as malformed.
//!
//! ## Example
//!
//! ```
//! use knx_netip::protocol::frame::KnxnetIpFrame;
//! use knx_netip::protocol::constants::ServiceType;
//!
//! let datagram = [0x06, 0x10, 0x02, 0x08, 0x00, 0x08, 0x15, 0x00];
//! let frame = KnxnetIpFrame::parse(&datagram).unwrap();
//! assert_eq!(frame.service_type(), Some(ServiceType::ConnectionstateResponse));
//! assert_eq!(frame.body(), &[0x15, 0x00]);
//! ```

use crate::error::{KnxError, Result};
use crate::protocol::constants::{
    ServiceType, HEADER_SIZE_10, IPV4_UDP, KNXNETIP_VERSION_10, MAX_FRAME_SIZE,
};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// KNXnet/IP frame header (6 bytes)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Header Len   │ Protocol Ver │  Service Type ID    │
/// │   (1 byte)   │   (1 byte)   │     (2 bytes)       │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │           Total Length (2 bytes)                   │
/// └────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnxnetIpHeader {
    /// Header length (0x06)
    pub header_length: u8,
    /// Protocol version (0x10 for v1.0)
    pub protocol_version: u8,
    /// Raw service type identifier
    pub service_code: u16,
    /// Total length of frame (header + body)
    pub total_length: u16,
}

impl KnxnetIpHeader {
    /// Size of the header in bytes
    pub const SIZE: usize = 6;

    /// Create a new header for a body of `body_length` bytes
    pub const fn new(service_type: ServiceType, body_length: u16) -> Self {
        Self {
            header_length: HEADER_SIZE_10,
            protocol_version: KNXNETIP_VERSION_10,
            service_code: service_type.to_u16(),
            total_length: Self::SIZE as u16 + body_length,
        }
    }

    /// Parse and validate a header.
    ///
    /// Fails with a malformed-frame error if fewer than 6 bytes are
    /// available, the header length is not 6, or the version is not 1.0.
    /// Unknown service types are not an error here; see
    /// [`KnxnetIpHeader::service_type`].
    #[inline]
    pub fn parse(data: &[u8]) -> Result<Self> {
        let Some(raw) = data.first_chunk::<{ Self::SIZE }>() else {
            return Err(KnxError::malformed_frame());
        };

        let header = Self {
            header_length: raw[0],
            protocol_version: raw[1],
            service_code: u16::from_be_bytes([raw[2], raw[3]]),
            total_length: u16::from_be_bytes([raw[4], raw[5]]),
        };

        if header.header_length != HEADER_SIZE_10 {
            return Err(KnxError::malformed_frame());
        }
        if header.protocol_version != KNXNETIP_VERSION_10 {
            return Err(KnxError::unsupported_version());
        }
        if usize::from(header.total_length) < Self::SIZE {
            return Err(KnxError::malformed_frame());
        }

        Ok(header)
    }

    /// Encode the header into the first 6 bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        let Some(out) = buf.first_chunk_mut::<{ Self::SIZE }>() else {
            return Err(KnxError::payload_too_large());
        };
        out[0] = self.header_length;
        out[1] = self.protocol_version;
        out[2..4].copy_from_slice(&self.service_code.to_be_bytes());
        out[4..6].copy_from_slice(&self.total_length.to_be_bytes());
        Ok(Self::SIZE)
    }

    /// Known service type, or `None` for identifiers this crate does not handle
    pub const fn service_type(&self) -> Option<ServiceType> {
        ServiceType::from_u16(self.service_code)
    }

    /// Get the expected body length from the header
    pub const fn body_length(&self) -> u16 {
        self.total_length.saturating_sub(Self::SIZE as u16)
    }
}

/// Split a datagram into its validated header and the remaining bytes.
///
/// The remainder is everything after the 6 header bytes; use
/// [`KnxnetIpFrame::parse`] to also enforce the total-length invariant.
pub fn decode_header(data: &[u8]) -> Result<(KnxnetIpHeader, &[u8])> {
    let header = KnxnetIpHeader::parse(data)?;
    Ok((header, &data[KnxnetIpHeader::SIZE..]))
}

/// Zero-copy view of a complete KNXnet/IP datagram
#[derive(Debug, Clone, Copy)]
pub struct KnxnetIpFrame<'a> {
    data: &'a [u8],
    header: KnxnetIpHeader,
}

impl<'a> KnxnetIpFrame<'a> {
    /// Parse a datagram, requiring `total_length == data.len()`.
    #[inline]
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = KnxnetIpHeader::parse(data)?;

        if usize::from(header.total_length) != data.len() {
            return Err(KnxError::malformed_frame());
        }

        Ok(Self { data, header })
    }

    /// Get the frame header
    #[inline]
    pub const fn header(&self) -> &KnxnetIpHeader {
        &self.header
    }

    /// Known service type, if any
    #[inline]
    pub const fn service_type(&self) -> Option<ServiceType> {
        self.header.service_type()
    }

    /// Payload after the header
    #[inline]
    pub fn body(&self) -> &'a [u8] {
        &self.data[KnxnetIpHeader::SIZE..]
    }

    /// The complete datagram including the header
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

/// Builder for outbound KNXnet/IP frames
#[derive(Debug)]
pub struct FrameBuilder<'a> {
    service_type: ServiceType,
    parts: [&'a [u8]; 3],
}

impl<'a> FrameBuilder<'a> {
    /// Frame with a single body slice
    pub const fn new(service_type: ServiceType, body: &'a [u8]) -> Self {
        Self {
            service_type,
            parts: [body, &[], &[]],
        }
    }

    /// Frame whose body is the concatenation of up to three slices
    pub const fn from_parts(service_type: ServiceType, parts: [&'a [u8]; 3]) -> Self {
        Self {
            service_type,
            parts,
        }
    }

    /// Calculate the total frame size
    pub fn size(&self) -> usize {
        KnxnetIpHeader::SIZE + self.parts.iter().map(|p| p.len()).sum::<usize>()
    }

    /// Build the frame into `buf`, returning the number of bytes written.
    pub fn build(&self, buf: &mut [u8]) -> Result<usize> {
        let total_size = self.size();
        if total_size > MAX_FRAME_SIZE || buf.len() < total_size {
            return Err(KnxError::payload_too_large());
        }

        let header = KnxnetIpHeader::new(self.service_type, (total_size - KnxnetIpHeader::SIZE) as u16);
        let mut offset = header.encode(buf)?;
        for part in self.parts {
            buf[offset..offset + part.len()].copy_from_slice(part);
            offset += part.len();
        }

        Ok(offset)
    }

    /// Build the frame into a freshly allocated datagram.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.size()];
        self.build(&mut out)?;
        Ok(out)
    }
}

/// Host Protocol Address Information (HPAI)
///
/// ```text
/// ┌──────────────┬──────────────┬─────────────────────┐
/// │ Structure Len│ Host Protocol│   IP Address        │
/// │   (1 byte)   │   (1 byte)   │   (4 bytes IPv4)    │
/// ├──────────────┴──────────────┴─────────────────────┤
/// │                Port (2 bytes)                      │
/// └────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hpai {
    /// Host protocol code
    pub host_protocol: u8,
    /// IPv4 address
    pub ip_address: Ipv4Addr,
    /// UDP port
    pub port: u16,
}

impl Hpai {
    /// Size of HPAI structure for IPv4
    pub const SIZE: usize = 8;

    /// Create a new HPAI for IPv4 UDP
    pub const fn new(ip_address: Ipv4Addr, port: u16) -> Self {
        Self {
            host_protocol: IPV4_UDP,
            ip_address,
            port,
        }
    }

    /// HPAI describing a local socket address.
    ///
    /// IPv6 endpoints cannot be expressed; they map to the NAT form
    /// `0.0.0.0:0`, asking the gateway to answer to the datagram's source.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::new(*v4.ip(), v4.port()),
            SocketAddr::V6(_) => Self::new(Ipv4Addr::UNSPECIFIED, 0),
        }
    }

    /// Parse HPAI from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        let Some(raw) = data.first_chunk::<{ Self::SIZE }>() else {
            return Err(KnxError::malformed_frame());
        };
        if usize::from(raw[0]) != Self::SIZE {
            return Err(KnxError::malformed_frame());
        }

        Ok(Self {
            host_protocol: raw[1],
            ip_address: Ipv4Addr::new(raw[2], raw[3], raw[4], raw[5]),
            port: u16::from_be_bytes([raw[6], raw[7]]),
        })
    }

    /// Wire representation
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let ip = self.ip_address.octets();
        let port = self.port.to_be_bytes();
        [
            Self::SIZE as u8,
            self.host_protocol,
            ip[0],
            ip[1],
            ip[2],
            ip[3],
            port[0],
            port[1],
        ]
    }

    /// Endpoint as a socket address
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parse() {
        let data = [
            0x06, // header length
            0x10, // protocol version
            0x02, 0x06, // CONNECT_RESPONSE
            0x00, 0x14, // total length (20 bytes)
        ];

        let header = KnxnetIpHeader::parse(&data).unwrap();
        assert_eq!(header.header_length, 0x06);
        assert_eq!(header.protocol_version, 0x10);
        assert_eq!(header.service_type(), Some(ServiceType::ConnectResponse));
        assert_eq!(header.total_length, 20);
        assert_eq!(header.body_length(), 14);
    }

    #[test]
    fn test_header_too_short() {
        let err = KnxnetIpHeader::parse(&[0x06, 0x10, 0x02, 0x06, 0x00]).unwrap_err();
        assert!(err.is_malformed_frame());
    }

    #[test]
    fn test_header_bad_length_and_version() {
        assert!(KnxnetIpHeader::parse(&[0x07, 0x10, 0x02, 0x06, 0x00, 0x08])
            .unwrap_err()
            .is_malformed_frame());
        assert!(KnxnetIpHeader::parse(&[0x06, 0x20, 0x02, 0x06, 0x00, 0x08])
            .unwrap_err()
            .is_malformed_frame());
    }

    #[test]
    fn test_unknown_service_is_not_an_error() {
        let header = KnxnetIpHeader::parse(&[0x06, 0x10, 0x09, 0x50, 0x00, 0x06]).unwrap();
        assert_eq!(header.service_type(), None);
        assert_eq!(header.service_code, 0x0950);
    }

    #[test]
    fn test_decode_header_remainder() {
        let data = [0x06, 0x10, 0x02, 0x06, 0x00, 0x08, 0x00, 0x24];
        let (header, rest) = decode_header(&data).unwrap();
        assert_eq!(header.service_type(), Some(ServiceType::ConnectResponse));
        assert_eq!(rest, &[0x00, 0x24]);
    }

    #[test]
    fn test_frame_total_length_must_match() {
        let short = [0x06, 0x10, 0x04, 0x20, 0x00, 0x0A, 0x04, 0x01];
        assert!(KnxnetIpFrame::parse(&short).unwrap_err().is_malformed_frame());

        let long = [0x06, 0x10, 0x02, 0x08, 0x00, 0x08, 0x01, 0x00, 0xFF];
        assert!(KnxnetIpFrame::parse(&long).unwrap_err().is_malformed_frame());
    }

    #[test]
    fn test_header_encode() {
        let header = KnxnetIpHeader::new(ServiceType::TunnellingAck, 4);
        let mut buf = [0u8; 6];
        assert_eq!(header.encode(&mut buf).unwrap(), 6);
        assert_eq!(buf, [0x06, 0x10, 0x04, 0x21, 0x00, 0x0A]);
    }

    #[test]
    fn test_frame_builder_parts() {
        let builder = FrameBuilder::from_parts(
            ServiceType::TunnellingRequest,
            [&[0x04, 0x01, 0x00, 0x00], &[0x11, 0x00], &[]],
        );
        let frame = builder.to_vec().unwrap();
        assert_eq!(frame.len(), 12);
        assert_eq!(&frame[..6], &[0x06, 0x10, 0x04, 0x20, 0x00, 0x0C]);
        assert_eq!(&frame[6..], &[0x04, 0x01, 0x00, 0x00, 0x11, 0x00]);
    }

    #[test]
    fn test_hpai_roundtrip_bytes() {
        let data = [0x08, 0x01, 192, 168, 1, 100, 0x0E, 0x57];
        let hpai = Hpai::parse(&data).unwrap();
        assert_eq!(hpai.ip_address, Ipv4Addr::new(192, 168, 1, 100));
        assert_eq!(hpai.port, 3671);
        assert_eq!(hpai.to_bytes(), data);
    }

    #[test]
    fn test_hpai_from_ipv6_is_nat() {
        let hpai = Hpai::from_socket_addr("[::1]:3671".parse().unwrap());
        assert_eq!(hpai.ip_address, Ipv4Addr::UNSPECIFIED);
        assert_eq!(hpai.port, 0);
    }
}
