//! Connection configuration.
//!
//! A [`ConnectionConfig`] is built in code with the `with_*` setters, or
//! parsed from `KEY=VALUE` text:
//!
//! ```
//! use knx_netip::{AddressingMode, ConnectionConfig};
//!
//! let config = ConnectionConfig::from_kv_str(
//!     r#"
//!     # office gateway
//!     KNX_GATEWAY_IP=192.168.1.10
//!     KNX_ADDRESSING=2
//!     KNX_SEND_INTERVAL_MS=100
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.gateway.unwrap().port(), 3671);
//! assert_eq!(config.addressing, AddressingMode::TwoLevel);
//! ```

use crate::addressing::AddressingMode;
use crate::error::{KnxError, Result};
use crate::protocol::constants::{
    CEMIMessageCode, CONNECT_TIMEOUT, DEFAULT_SEND_INTERVAL, HEARTBEAT_INTERVAL,
    KNXNETIP_DEFAULT_PORT, KNXNETIP_MULTICAST_ADDR,
};
use core::str::FromStr;
use core::time::Duration;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

/// Settings consumed by tunnel and routing connections.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConnectionConfig {
    /// Tunneling gateway endpoint
    pub gateway: Option<SocketAddr>,
    /// Routing multicast group and port
    pub multicast: SocketAddrV4,
    /// Local bind address for tunneling sockets, and the multicast interface
    pub local_addr: SocketAddr,
    /// How group addresses are rendered
    pub addressing: AddressingMode,
    /// Settle time after each outbound request; zero releases immediately
    pub send_interval: Duration,
    /// Dump every decoded cEMI message at debug level
    pub debug: bool,
    /// Message code for outbound frames; `0` means `L_Data.req`
    pub action_message_code: u8,
    /// Wait for a `CONNECT_RESPONSE`
    pub connect_timeout: Duration,
    /// Interval between `CONNECTIONSTATE_REQUEST`s
    pub heartbeat_interval: Duration,
    /// Reconnect tries after a lost tunnel
    pub reconnect_attempts: u32,
    /// Pause before each reconnect try
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            gateway: None,
            multicast: SocketAddrV4::new(KNXNETIP_MULTICAST_ADDR, KNXNETIP_DEFAULT_PORT),
            local_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            addressing: AddressingMode::default(),
            send_interval: DEFAULT_SEND_INTERVAL,
            debug: false,
            action_message_code: 0x00,
            connect_timeout: CONNECT_TIMEOUT,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

impl ConnectionConfig {
    /// Tunneling to `gateway`
    pub fn tunneling(gateway: SocketAddr) -> Self {
        Self {
            gateway: Some(gateway),
            ..Self::default()
        }
    }

    /// Routing on the standard multicast group
    pub fn routing() -> Self {
        Self::default()
    }

    /// Set the group address rendering
    #[must_use]
    pub const fn with_addressing(mut self, addressing: AddressingMode) -> Self {
        self.addressing = addressing;
        self
    }

    /// Set the settle time between requests
    #[must_use]
    pub const fn with_send_interval(mut self, interval: Duration) -> Self {
        self.send_interval = interval;
        self
    }

    /// Toggle per-message debug dumps
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the outbound message code (e.g. `0x29` for some routers)
    #[must_use]
    pub const fn with_action_message_code(mut self, code: u8) -> Self {
        self.action_message_code = code;
        self
    }

    /// Set the local bind address
    #[must_use]
    pub const fn with_local_addr(mut self, local_addr: SocketAddr) -> Self {
        self.local_addr = local_addr;
        self
    }

    /// Set the routing multicast group
    #[must_use]
    pub const fn with_multicast(mut self, multicast: SocketAddrV4) -> Self {
        self.multicast = multicast;
        self
    }

    /// Set the connect timeout
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the heartbeat interval
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the reconnect policy
    #[must_use]
    pub const fn with_reconnect(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = delay;
        self
    }

    /// Message code written into outbound cEMI frames
    pub const fn message_code(&self) -> u8 {
        if self.action_message_code == 0 {
            CEMIMessageCode::LDataReq.to_u8()
        } else {
            self.action_message_code
        }
    }

    /// Interface used to join the multicast group
    pub fn multicast_interface(&self) -> Ipv4Addr {
        match self.local_addr.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        }
    }

    /// Parse `KEY=VALUE` lines.
    ///
    /// Blank lines and `#` comments are skipped. Unknown keys are logged and
    /// ignored; a malformed value fails with a configuration error naming
    /// the key.
    pub fn from_kv_str(text: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut gateway_ip: Option<IpAddr> = None;
        let mut gateway_port = KNXNETIP_DEFAULT_PORT;

        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(KnxError::invalid_config_entry(line));
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "KNX_GATEWAY_IP" => gateway_ip = Some(parse_value(key, value)?),
                "KNX_GATEWAY_PORT" => gateway_port = parse_value(key, value)?,
                "KNX_MULTICAST_GROUP" => config.multicast.set_ip(parse_value(key, value)?),
                "KNX_MULTICAST_PORT" => config.multicast.set_port(parse_value(key, value)?),
                "KNX_LOCAL_ADDR" => config.local_addr = parse_value(key, value)?,
                "KNX_ADDRESSING" => {
                    config.addressing = match value {
                        "2" => AddressingMode::TwoLevel,
                        "3" => AddressingMode::ThreeLevel,
                        _ => return Err(KnxError::invalid_config_entry(key)),
                    }
                }
                "KNX_SEND_INTERVAL_MS" => {
                    config.send_interval = Duration::from_millis(parse_value(key, value)?);
                }
                "KNX_DEBUG" => config.debug = parse_flag(key, value)?,
                "KNX_ACTION_MESSAGE_CODE" => config.action_message_code = parse_byte(key, value)?,
                "KNX_CONNECT_TIMEOUT_MS" => {
                    config.connect_timeout = Duration::from_millis(parse_value(key, value)?);
                }
                "KNX_HEARTBEAT_SECS" => {
                    config.heartbeat_interval = Duration::from_secs(parse_value(key, value)?);
                }
                "KNX_RECONNECT_ATTEMPTS" => config.reconnect_attempts = parse_value(key, value)?,
                "KNX_RECONNECT_DELAY_MS" => {
                    config.reconnect_delay = Duration::from_millis(parse_value(key, value)?);
                }
                _ => knx_log!(warn, "ignoring unknown configuration key {}", key),
            }
        }

        config.gateway = gateway_ip.map(|ip| SocketAddr::new(ip, gateway_port));
        Ok(config)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .ok()
        .ok_or_else(|| KnxError::invalid_config_entry(key))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(KnxError::invalid_config_entry(key)),
    }
}

fn parse_byte(key: &str, value: &str) -> Result<u8> {
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.ok().ok_or_else(|| KnxError::invalid_config_entry(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::routing();
        assert_eq!(config.multicast.to_string(), "224.0.23.12:3671");
        assert_eq!(config.send_interval, Duration::from_millis(200));
        assert_eq!(config.addressing, AddressingMode::ThreeLevel);
        assert_eq!(config.message_code(), 0x11);
        assert_eq!(config.reconnect_attempts, 3);
        assert!(config.gateway.is_none());
    }

    #[test]
    fn test_builder() {
        let config = ConnectionConfig::tunneling("10.0.0.5:3671".parse().unwrap())
            .with_action_message_code(0x29)
            .with_send_interval(Duration::ZERO)
            .with_reconnect(1, Duration::from_secs(1));
        assert_eq!(config.message_code(), 0x29);
        assert!(config.send_interval.is_zero());
        assert_eq!(config.reconnect_attempts, 1);
    }

    #[test]
    fn test_from_kv_str_full() {
        let config = ConnectionConfig::from_kv_str(
            "KNX_GATEWAY_IP=10.0.0.5\n\
             KNX_GATEWAY_PORT=3700\n\
             KNX_MULTICAST_GROUP=224.0.23.13\n\
             KNX_LOCAL_ADDR=10.0.0.2:0\n\
             KNX_DEBUG=true\n\
             KNX_ACTION_MESSAGE_CODE=0x29\n\
             KNX_CONNECT_TIMEOUT_MS=1500\n\
             KNX_HEARTBEAT_SECS=30\n\
             KNX_RECONNECT_ATTEMPTS=5\n\
             KNX_RECONNECT_DELAY_MS=250\n\
             WIFI_NETWORK=ignored\n",
        )
        .unwrap();

        assert_eq!(config.gateway, Some("10.0.0.5:3700".parse().unwrap()));
        assert_eq!(*config.multicast.ip(), Ipv4Addr::new(224, 0, 23, 13));
        assert_eq!(config.multicast_interface(), Ipv4Addr::new(10, 0, 0, 2));
        assert!(config.debug);
        assert_eq!(config.action_message_code, 0x29);
        assert_eq!(config.connect_timeout, Duration::from_millis(1500));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_from_kv_str_decimal_message_code() {
        let config = ConnectionConfig::from_kv_str("KNX_ACTION_MESSAGE_CODE=41").unwrap();
        assert_eq!(config.message_code(), 0x29);
    }

    #[test]
    fn test_from_kv_str_errors_name_the_key() {
        for (text, key) in [
            ("KNX_GATEWAY_IP=not-an-ip", "KNX_GATEWAY_IP"),
            ("KNX_ADDRESSING=4", "KNX_ADDRESSING"),
            ("KNX_DEBUG=maybe", "KNX_DEBUG"),
            ("KNX_ACTION_MESSAGE_CODE=0x1FF", "KNX_ACTION_MESSAGE_CODE"),
            ("KNX_SEND_INTERVAL_MS=-1", "KNX_SEND_INTERVAL_MS"),
        ] {
            match ConnectionConfig::from_kv_str(text) {
                Err(KnxError::Configuration(e)) => assert_eq!(e.key(), key),
                other => panic!("{text}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_from_kv_str_line_without_equals() {
        assert!(ConnectionConfig::from_kv_str("KNX_DEBUG").is_err());
    }
}
