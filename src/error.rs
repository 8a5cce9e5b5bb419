//! Error types for KNXnet/IP operations.
//!
//! Every fallible operation in the crate returns [`KnxError`]. Each category
//! wraps a small struct holding a private kind and a captured backtrace; the
//! predicates on [`KnxError`] (`is_malformed_frame`, `is_rejected`, ...) are
//! the supported way to branch on a failure.
//!
//! Only some categories leave the receive pipeline: malformed frames and
//! protocol violations are logged and dropped there, while transport loss and
//! rejected connects reach the caller.

use core::fmt;
use std::backtrace::Backtrace;
use std::io;

/// Result type alias for KNX operations.
pub type Result<T> = core::result::Result<T, KnxError>;

// =============================================================================
// Error Kind Enums (Internal)
// =============================================================================

/// Protocol error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProtocolErrorKind {
    MalformedFrame,
    UnsupportedVersion,
    PayloadTooLarge,
    ChannelMismatch,
    UnexpectedService,
    UnknownMessageCode,
}

/// Connection error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionErrorKind {
    Rejected,
    Failed,
    Lost,
    NotConnected,
    AlreadyConnected,
    Closed,
}

/// Transport error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransportErrorKind {
    Bind,
    SendFailed,
    ReceiveFailed,
    Closed,
}

/// Addressing error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AddressingErrorKind {
    InvalidIndividualAddress,
    InvalidGroupAddress,
    OutOfRange,
}

/// Value error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValueErrorKind {
    InvalidValue,
    InvalidData,
    OutOfRange,
    UnknownType,
}

/// Configuration error variants (internal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConfigurationErrorKind {
    MissingEndpoint,
    InvalidEntry,
}

// =============================================================================
// Main Error Type
// =============================================================================

/// KNXnet/IP error types.
///
/// This is the main error type returned by all operations of the crate.
#[derive(Debug)]
pub enum KnxError {
    /// Frame structure or protocol-state errors
    Protocol(ProtocolError),
    /// Session errors (rejected connect, lost transport, ...)
    Connection(ConnectionError),
    /// Socket-level errors
    Transport(TransportError),
    /// Address parsing and range errors
    Addressing(AddressingError),
    /// Values that cannot be encoded or decoded
    Value(ValueError),
    /// Invalid configuration input
    Configuration(ConfigurationError),
    /// Operation timed out
    Timeout,
}

// =============================================================================
// Structured Error Types
// =============================================================================

/// Protocol error with backtrace
#[derive(Debug)]
pub struct ProtocolError {
    kind: ProtocolErrorKind,
    backtrace: Backtrace,
}

impl ProtocolError {
    pub(crate) fn new(kind: ProtocolErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the frame failed structural validation
    pub fn is_malformed(&self) -> bool {
        matches!(
            self.kind,
            ProtocolErrorKind::MalformedFrame
                | ProtocolErrorKind::UnsupportedVersion
                | ProtocolErrorKind::PayloadTooLarge
        )
    }

    /// Check if the frame was well-formed but not acceptable in the current state
    pub fn is_violation(&self) -> bool {
        !self.is_malformed()
    }

    /// Backtrace captured when the error was created
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

/// Connection error with backtrace
#[derive(Debug)]
pub struct ConnectionError {
    kind: ConnectionErrorKind,
    status: Option<u8>,
    backtrace: Backtrace,
}

impl ConnectionError {
    pub(crate) fn new(kind: ConnectionErrorKind) -> Self {
        Self {
            kind,
            status: None,
            backtrace: Backtrace::capture(),
        }
    }

    pub(crate) fn with_status(kind: ConnectionErrorKind, status: u8) -> Self {
        Self {
            status: Some(status),
            ..Self::new(kind)
        }
    }

    /// Check if the gateway refused the connection
    pub fn is_rejected(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Rejected)
    }

    /// Check if the transport was lost
    pub fn is_lost(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::Lost)
    }

    /// Check if the operation required a connected session
    pub fn is_not_connected(&self) -> bool {
        matches!(self.kind, ConnectionErrorKind::NotConnected)
    }

    /// Status byte reported by the gateway, if any
    pub fn status(&self) -> Option<u8> {
        self.status
    }
}

/// Transport error with backtrace and the underlying I/O error
#[derive(Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    source: Option<io::Error>,
    backtrace: Backtrace,
}

impl TransportError {
    pub(crate) fn new(kind: TransportErrorKind, source: Option<io::Error>) -> Self {
        Self {
            kind,
            source,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the transport was closed locally
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, TransportErrorKind::Closed)
    }
}

/// Addressing error with backtrace
#[derive(Debug)]
pub struct AddressingError {
    kind: AddressingErrorKind,
    backtrace: Backtrace,
}

impl AddressingError {
    pub(crate) fn new(kind: AddressingErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if address is out of range
    pub fn is_out_of_range(&self) -> bool {
        matches!(self.kind, AddressingErrorKind::OutOfRange)
    }
}

/// Value error with backtrace
#[derive(Debug)]
pub struct ValueError {
    kind: ValueErrorKind,
    backtrace: Backtrace,
}

impl ValueError {
    pub(crate) fn new(kind: ValueErrorKind) -> Self {
        Self {
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Check if the value cannot be represented on the wire
    pub fn is_invalid_value(&self) -> bool {
        matches!(self.kind, ValueErrorKind::InvalidValue)
    }

    /// Check if value is out of range for its datapoint type
    pub fn is_out_of_range(&self) -> bool {
        matches!(self.kind, ValueErrorKind::OutOfRange)
    }

    /// Check if no codec is registered for the type identifier
    pub fn is_unknown_type(&self) -> bool {
        matches!(self.kind, ValueErrorKind::UnknownType)
    }
}

/// Configuration error naming the offending key
#[derive(Debug)]
pub struct ConfigurationError {
    kind: ConfigurationErrorKind,
    key: String,
}

impl ConfigurationError {
    pub(crate) fn new(kind: ConfigurationErrorKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }

    /// Configuration key the error refers to
    pub fn key(&self) -> &str {
        &self.key
    }
}

// =============================================================================
// Convenience Constructors for KnxError
// =============================================================================

impl KnxError {
    // Protocol errors
    pub(crate) fn malformed_frame() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::MalformedFrame))
    }

    pub(crate) fn unsupported_version() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::UnsupportedVersion))
    }

    pub(crate) fn payload_too_large() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::PayloadTooLarge))
    }

    pub(crate) fn channel_mismatch() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::ChannelMismatch))
    }

    pub(crate) fn unexpected_service() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::UnexpectedService))
    }

    pub(crate) fn unknown_message_code() -> Self {
        Self::Protocol(ProtocolError::new(ProtocolErrorKind::UnknownMessageCode))
    }

    // Connection errors
    pub(crate) fn connection_rejected(status: u8) -> Self {
        Self::Connection(ConnectionError::with_status(
            ConnectionErrorKind::Rejected,
            status,
        ))
    }

    pub(crate) fn connection_failed(status: u8) -> Self {
        Self::Connection(ConnectionError::with_status(
            ConnectionErrorKind::Failed,
            status,
        ))
    }

    pub(crate) fn transport_lost() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Lost))
    }

    pub(crate) fn not_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::NotConnected))
    }

    pub(crate) fn already_connected() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::AlreadyConnected))
    }

    pub(crate) fn connection_closed() -> Self {
        Self::Connection(ConnectionError::new(ConnectionErrorKind::Closed))
    }

    // Transport errors
    pub(crate) fn bind_failed(source: io::Error) -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::Bind, Some(source)))
    }

    pub(crate) fn send_failed(source: io::Error) -> Self {
        Self::Transport(TransportError::new(
            TransportErrorKind::SendFailed,
            Some(source),
        ))
    }

    pub(crate) fn receive_failed(source: io::Error) -> Self {
        Self::Transport(TransportError::new(
            TransportErrorKind::ReceiveFailed,
            Some(source),
        ))
    }

    pub(crate) fn transport_closed() -> Self {
        Self::Transport(TransportError::new(TransportErrorKind::Closed, None))
    }

    // Addressing errors
    pub(crate) fn invalid_group_address() -> Self {
        Self::Addressing(AddressingError::new(
            AddressingErrorKind::InvalidGroupAddress,
        ))
    }

    pub(crate) fn invalid_individual_address() -> Self {
        Self::Addressing(AddressingError::new(
            AddressingErrorKind::InvalidIndividualAddress,
        ))
    }

    pub(crate) fn address_out_of_range() -> Self {
        Self::Addressing(AddressingError::new(AddressingErrorKind::OutOfRange))
    }

    // Value errors
    pub(crate) fn invalid_value() -> Self {
        Self::Value(ValueError::new(ValueErrorKind::InvalidValue))
    }

    pub(crate) fn invalid_dpt_data() -> Self {
        Self::Value(ValueError::new(ValueErrorKind::InvalidData))
    }

    pub(crate) fn dpt_value_out_of_range() -> Self {
        Self::Value(ValueError::new(ValueErrorKind::OutOfRange))
    }

    pub(crate) fn unknown_dpt() -> Self {
        Self::Value(ValueError::new(ValueErrorKind::UnknownType))
    }

    // Configuration errors
    pub(crate) fn missing_endpoint(key: &str) -> Self {
        Self::Configuration(ConfigurationError::new(
            ConfigurationErrorKind::MissingEndpoint,
            key,
        ))
    }

    pub(crate) fn invalid_config_entry(key: &str) -> Self {
        Self::Configuration(ConfigurationError::new(
            ConfigurationErrorKind::InvalidEntry,
            key,
        ))
    }
}

// =============================================================================
// Classification
// =============================================================================

impl KnxError {
    /// Header or body failed structural validation.
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_malformed())
    }

    /// Well-formed frame that is not acceptable in the current state.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_violation())
    }

    /// The gateway reported it has no capacity for another connection.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_rejected())
    }

    /// The transport failed underneath an open connection.
    pub fn is_transport_lost(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_lost()) || matches!(self, Self::Transport(_))
    }

    /// A caller-supplied value cannot be encoded.
    pub fn is_invalid_value(&self) -> bool {
        matches!(self, Self::Value(e) if e.is_invalid_value())
    }

    /// The operation needs a connected session.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::Connection(e) if e.is_not_connected())
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

impl fmt::Display for KnxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KnxError::Protocol(e) => write!(f, "Protocol error: {:?}", e.kind),
            KnxError::Connection(e) => match e.status {
                Some(status) => {
                    write!(f, "Connection error: {:?} (status 0x{status:02X})", e.kind)
                }
                None => write!(f, "Connection error: {:?}", e.kind),
            },
            KnxError::Transport(e) => match &e.source {
                Some(source) => write!(f, "Transport error: {:?}: {source}", e.kind),
                None => write!(f, "Transport error: {:?}", e.kind),
            },
            KnxError::Addressing(e) => write!(f, "Addressing error: {:?}", e.kind),
            KnxError::Value(e) => write!(f, "Value error: {:?}", e.kind),
            KnxError::Configuration(e) => {
                write!(f, "Configuration error: {:?} for {}", e.kind, e.key)
            }
            KnxError::Timeout => write!(f, "Operation timeout"),
        }
    }
}

impl std::error::Error for KnxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KnxError::Transport(e) => e
                .source
                .as_ref()
                .map(|s| s as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_and_violation_are_disjoint() {
        let malformed = KnxError::malformed_frame();
        assert!(malformed.is_malformed_frame());
        assert!(!malformed.is_protocol_violation());

        let violation = KnxError::channel_mismatch();
        assert!(violation.is_protocol_violation());
        assert!(!violation.is_malformed_frame());
    }

    #[test]
    fn test_rejected_carries_status() {
        let err = KnxError::connection_rejected(0x24);
        assert!(err.is_rejected());
        match &err {
            KnxError::Connection(e) => assert_eq!(e.status(), Some(0x24)),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(err.to_string().contains("0x24"));
    }

    #[test]
    fn test_transport_error_exposes_source() {
        use std::error::Error as _;

        let err = KnxError::receive_failed(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(err.is_transport_lost());
        assert!(err.source().is_some());
    }

    #[test]
    fn test_invalid_value() {
        assert!(KnxError::invalid_value().is_invalid_value());
        assert!(!KnxError::dpt_value_out_of_range().is_invalid_value());
    }
}
