//! KNXnet/IP service request and response frames.
//!
//! ## Supported Services
//!
//! - **CONNECT** - Establish tunnel connection with gateway
//! - **CONNECTIONSTATE** - Heartbeat/keep-alive checks
//! - **DISCONNECT** - Connection shutdown, from either side
//! - **TUNNELLING** - Send/receive cEMI messages through the tunnel
//! - **ROUTING** - Multicast cEMI indications
//!
//! ## Protocol Flow
//!
//! ```text
//! Client                          Gateway
//!   |                                |
//!   |------- CONNECT_REQUEST ------->|
//!   |<------ CONNECT_RESPONSE -------|
//!   |                                |
//!   |------ TUNNELLING_REQUEST ----->|
//!   |<------ TUNNELLING_ACK ---------|
//!   |<----- TUNNELLING_REQUEST ------|
//!   |------- TUNNELLING_ACK -------->|
//!   |                                |
//!   |--- CONNECTIONSTATE_REQUEST --->|  (every 60s)
//!   |<-- CONNECTIONSTATE_RESPONSE ---|
//!   |                                |
//!   |------ DISCONNECT_REQUEST ----->|
//!   |<----- DISCONNECT_RESPONSE -----|
//! ```
//!
//! Outbound frames are built into freshly allocated datagrams; inbound
//! bodies are parsed without copying.

use crate::error::{KnxError, Result};
use crate::protocol::constants::{ServiceType, E_NO_ERROR, TUNNEL_CONNECTION, TUNNEL_LINKLAYER};
use crate::protocol::frame::{FrameBuilder, Hpai};

/// Connection Request Information (CRI) for tunneling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequestInfo {
    /// Connection type (`TUNNEL_CONNECTION` = 0x04)
    pub connection_type: u8,
    /// KNX layer (`TUNNEL_LINKLAYER` = 0x02)
    pub knx_layer: u8,
}

impl ConnectionRequestInfo {
    /// Size of the CRI structure
    pub const SIZE: usize = 4;

    /// CRI for a tunnel link layer connection
    pub const fn tunnel_link_layer() -> Self {
        Self {
            connection_type: TUNNEL_CONNECTION,
            knx_layer: TUNNEL_LINKLAYER,
        }
    }

    /// Wire representation
    pub const fn to_bytes(&self) -> [u8; Self::SIZE] {
        [Self::SIZE as u8, self.connection_type, self.knx_layer, 0x00]
    }
}

/// `CONNECT_REQUEST` service (0x0205)
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest {
    /// Control endpoint (for connection management)
    pub control_endpoint: Hpai,
    /// Data endpoint (for tunneling data)
    pub data_endpoint: Hpai,
    /// Connection request information
    pub cri: ConnectionRequestInfo,
}

impl ConnectRequest {
    /// Create a link-layer tunnel request
    pub const fn new(control_endpoint: Hpai, data_endpoint: Hpai) -> Self {
        Self {
            control_endpoint,
            data_endpoint,
            cri: ConnectionRequestInfo::tunnel_link_layer(),
        }
    }

    /// Build the complete 26-byte frame
    pub fn build(&self) -> Result<Vec<u8>> {
        FrameBuilder::from_parts(
            ServiceType::ConnectRequest,
            [
                &self.control_endpoint.to_bytes(),
                &self.data_endpoint.to_bytes(),
                &self.cri.to_bytes(),
            ],
        )
        .to_vec()
    }
}

/// `CONNECT_RESPONSE` service (0x0206)
///
/// A refusing gateway may send only the channel id and status bytes, so the
/// data endpoint is present only on success.
#[derive(Debug, Clone, Copy)]
pub struct ConnectResponse {
    /// Communication channel ID
    pub channel_id: u8,
    /// Status code (0 = OK)
    pub status: u8,
    /// Data endpoint assigned by the gateway
    pub data_endpoint: Option<Hpai>,
}

impl ConnectResponse {
    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let [channel_id, status, rest @ ..] = body else {
            return Err(KnxError::malformed_frame());
        };

        let data_endpoint = if *status == E_NO_ERROR {
            Some(Hpai::parse(rest)?)
        } else {
            None
        };

        Ok(Self {
            channel_id: *channel_id,
            status: *status,
            data_endpoint,
        })
    }

    /// Check if connection was successful
    pub const fn is_ok(&self) -> bool {
        self.status == E_NO_ERROR
    }
}

/// `CONNECTIONSTATE_REQUEST` service (0x0207)
#[derive(Debug, Clone, Copy)]
pub struct ConnectionStateRequest {
    /// Channel being probed
    pub channel_id: u8,
    /// Control endpoint
    pub control_endpoint: Hpai,
}

impl ConnectionStateRequest {
    /// Create a new request
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    /// Build the complete 16-byte frame
    pub fn build(&self) -> Result<Vec<u8>> {
        FrameBuilder::from_parts(
            ServiceType::ConnectionstateRequest,
            [&[self.channel_id, 0x00], &self.control_endpoint.to_bytes(), &[]],
        )
        .to_vec()
    }
}

/// Body of `CONNECTIONSTATE_RESPONSE`, `DISCONNECT_RESPONSE`, and the
/// channel part of `DISCONNECT_REQUEST`: channel id then status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Communication channel ID
    pub channel_id: u8,
    /// Status code (0 = OK)
    pub status: u8,
}

impl ChannelStatus {
    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        match body {
            [channel_id, status, ..] => Ok(Self {
                channel_id: *channel_id,
                status: *status,
            }),
            _ => Err(KnxError::malformed_frame()),
        }
    }

    /// Check if the status reports success
    pub const fn is_ok(&self) -> bool {
        self.status == E_NO_ERROR
    }
}

/// `CONNECTIONSTATE_RESPONSE` service (0x0208)
pub type ConnectionStateResponse = ChannelStatus;

/// `DISCONNECT_RESPONSE` service (0x020A)
pub type DisconnectResponse = ChannelStatus;

/// `DISCONNECT_REQUEST` service (0x0209)
#[derive(Debug, Clone, Copy)]
pub struct DisconnectRequest {
    /// Channel being closed
    pub channel_id: u8,
    /// Control endpoint of the sender
    pub control_endpoint: Hpai,
}

impl DisconnectRequest {
    /// Create a new request
    pub const fn new(channel_id: u8, control_endpoint: Hpai) -> Self {
        Self {
            channel_id,
            control_endpoint,
        }
    }

    /// Parse a gateway-initiated request; the endpoint is not needed to
    /// answer it, so only the channel id is required.
    pub fn parse_channel(body: &[u8]) -> Result<u8> {
        body.first().copied().ok_or_else(KnxError::malformed_frame)
    }

    /// Build the complete 16-byte frame
    pub fn build(&self) -> Result<Vec<u8>> {
        FrameBuilder::from_parts(
            ServiceType::DisconnectRequest,
            [&[self.channel_id, 0x00], &self.control_endpoint.to_bytes(), &[]],
        )
        .to_vec()
    }
}

/// Build a `DISCONNECT_RESPONSE` for `channel_id` with status OK.
pub fn disconnect_response(channel_id: u8) -> Result<Vec<u8>> {
    FrameBuilder::new(ServiceType::DisconnectResponse, &[channel_id, E_NO_ERROR]).to_vec()
}

/// Connection header shared by tunnelling requests and acks
///
/// ```text
/// ┌──────────┬────────────┬──────────┬─────────────────┐
/// │ Len (04) │ Channel ID │ Sequence │ Reserved/Status │
/// └──────────┴────────────┴──────────┴─────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionHeader {
    /// Communication channel ID
    pub channel_id: u8,
    /// Sequence counter
    pub sequence_counter: u8,
}

impl ConnectionHeader {
    /// Size of connection header
    pub const SIZE: usize = 4;

    /// Create a new connection header
    pub const fn new(channel_id: u8, sequence_counter: u8) -> Self {
        Self {
            channel_id,
            sequence_counter,
        }
    }

    /// Wire representation with the given trailing byte
    pub const fn to_bytes(&self, trailer: u8) -> [u8; Self::SIZE] {
        [Self::SIZE as u8, self.channel_id, self.sequence_counter, trailer]
    }

    /// Parse from bytes, returning the header and the trailing byte
    pub fn parse(data: &[u8]) -> Result<(Self, u8)> {
        match data {
            [len, channel_id, sequence_counter, trailer, ..] if usize::from(*len) == Self::SIZE => {
                Ok((Self::new(*channel_id, *sequence_counter), *trailer))
            }
            _ => Err(KnxError::malformed_frame()),
        }
    }
}

/// `TUNNELLING_REQUEST` service (0x0420)
#[derive(Debug, Clone, Copy)]
pub struct TunnelingRequest<'a> {
    /// Connection header
    pub connection_header: ConnectionHeader,
    /// cEMI message bytes
    pub cemi: &'a [u8],
}

impl<'a> TunnelingRequest<'a> {
    /// Create a new tunneling request
    pub const fn new(connection_header: ConnectionHeader, cemi: &'a [u8]) -> Self {
        Self {
            connection_header,
            cemi,
        }
    }

    /// Build the complete frame
    pub fn build(&self) -> Result<Vec<u8>> {
        FrameBuilder::from_parts(
            ServiceType::TunnellingRequest,
            [&self.connection_header.to_bytes(0x00), self.cemi, &[]],
        )
        .to_vec()
    }

    /// Parse from frame body; the cEMI starts right after the 4-byte header.
    pub fn parse(body: &'a [u8]) -> Result<Self> {
        let (connection_header, _) = ConnectionHeader::parse(body)?;
        Ok(Self {
            connection_header,
            cemi: &body[ConnectionHeader::SIZE..],
        })
    }
}

/// `TUNNELLING_ACK` service (0x0421)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelingAck {
    /// Connection header
    pub connection_header: ConnectionHeader,
    /// Status code
    pub status: u8,
}

impl TunnelingAck {
    /// Ack for `sequence_counter` on `channel_id` with status OK
    pub const fn new(channel_id: u8, sequence_counter: u8) -> Self {
        Self {
            connection_header: ConnectionHeader::new(channel_id, sequence_counter),
            status: E_NO_ERROR,
        }
    }

    /// Build the complete 10-byte frame
    pub fn build(&self) -> Result<Vec<u8>> {
        FrameBuilder::new(
            ServiceType::TunnellingAck,
            &self.connection_header.to_bytes(self.status),
        )
        .to_vec()
    }

    /// Parse from frame body
    pub fn parse(body: &[u8]) -> Result<Self> {
        let (connection_header, status) = ConnectionHeader::parse(body)?;
        Ok(Self {
            connection_header,
            status,
        })
    }

    /// Check if ack indicates success
    pub const fn is_ok(&self) -> bool {
        self.status == E_NO_ERROR
    }
}

/// Build a `ROUTING_INDICATION` carrying `cemi`.
pub fn routing_indication(cemi: &[u8]) -> Result<Vec<u8>> {
    FrameBuilder::new(ServiceType::RoutingIndication, cemi).to_vec()
}
