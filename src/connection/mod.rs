//! Tunnel and routing connections.
//!
//! Both connection kinds share a [`ConnectionCore`]: the configuration, the
//! [`SendGate`], the application handler and the codec registry. The core
//! turns decoded cEMI messages into handler callbacks and application
//! values into outbound frames; the connection types only add how frames
//! travel (unicast tunnel with a session, or multicast routing).
//!
//! ```no_run
//! use knx_netip::{ConnectionBuilder, ConnectionConfig, Handlers};
//!
//! # #[tokio::main]
//! # async fn main() -> knx_netip::Result<()> {
//! let config = ConnectionConfig::tunneling("192.168.1.10:3671".parse().unwrap());
//! let tunnel = ConnectionBuilder::new(config)
//!     .handler(Handlers::new().event(|address, data| println!("{address}: {data:02X?}")))
//!     .tunnel()?;
//!
//! tunnel.connect().await?;
//! tunnel.action("1/2/3", true).await?;
//! tunnel.request_status("1/2/4").await?;
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod gate;
pub mod handler;
pub(crate) mod pipeline;
pub mod routing;
pub mod tunnel;

pub use action::ActionValue;
pub use gate::SendGate;
pub use handler::{ConnectionHandler, Handlers};
pub use routing::RoutingConnection;
pub use tunnel::{TunnelConnection, TunnelState};

use crate::addressing::KnxAddress;
use crate::configuration::ConnectionConfig;
use crate::dpt::{CodecRegistry, DptValue};
use crate::error::{KnxError, Result};
use crate::net::{MulticastUdpFactory, TransportFactory, UnicastUdpFactory};
use crate::protocol::cemi::{
    decode_cemi, encode_action, encode_status_request, ApduPayload, CemiMessage, Classification,
};
use core::future::Future;
use handler::guarded;
use pipeline::{BusEvent, EventQueue};
use std::sync::Arc;

/// Puts one outbound cEMI frame on the wire.
///
/// Implemented by the connection's shared state; called inside
/// [`SendGate::run_exclusive`].
pub(crate) trait CemiSender: Send + Sync {
    fn send_cemi(&self, cemi: &[u8]) -> impl Future<Output = Result<()>> + Send;
}

/// State and behavior common to every connection kind
#[derive(Debug)]
pub(crate) struct ConnectionCore {
    pub config: ConnectionConfig,
    pub gate: SendGate,
    handler: Arc<dyn ConnectionHandler>,
    codecs: Arc<CodecRegistry>,
}

impl ConnectionCore {
    pub fn new(
        config: ConnectionConfig,
        handler: Arc<dyn ConnectionHandler>,
        codecs: Arc<CodecRegistry>,
    ) -> Self {
        let gate = SendGate::new(config.send_interval);
        Self {
            config,
            gate,
            handler,
            codecs,
        }
    }

    pub fn connected(&self) {
        guarded("connected", || self.handler.on_connected());
    }

    pub fn disconnected(&self) {
        guarded("disconnected", || self.handler.on_disconnected());
    }

    pub fn event(&self, event: &BusEvent) {
        guarded("event", || {
            self.handler.on_event(&event.destination, &event.data);
        });
    }

    fn status(&self, destination: &KnxAddress, data: &[u8]) {
        guarded("status", || self.handler.on_status(destination, data));
    }

    /// Decode an inbound cEMI frame and route it
    pub fn receive_cemi(&self, cemi: &[u8], queue: &EventQueue) -> Result<()> {
        let message = decode_cemi(cemi, self.config.addressing)?;
        self.dispatch(&message, queue);
        Ok(())
    }

    /// Events go through the queue, status responses straight to the
    /// handler.
    pub fn dispatch(&self, message: &CemiMessage, queue: &EventQueue) {
        if self.config.debug {
            message.log_fields();
        }

        match message.classify() {
            Classification::Event => {
                let event = BusEvent {
                    destination: message.destination,
                    data: message.data(),
                };
                if queue.send(event).is_err() {
                    knx_log!(debug, "Event queue closed, dropping event for {}", message.destination);
                }
            }
            Classification::Status => self.status(&message.destination, &message.data()),
            Classification::Ignored => {
                knx_log!(
                    trace,
                    "Ignoring cEMI 0x{:02X} for {}",
                    message.message_code,
                    message.destination
                );
            }
        }
    }

    fn destination(&self, address: &str) -> Result<KnxAddress> {
        KnxAddress::parse(address, self.config.addressing)
    }

    async fn send<S: CemiSender>(&self, sender: &S, cemi: &[u8]) -> Result<()> {
        self.gate.run_exclusive(|| sender.send_cemi(cemi)).await?
    }

    pub async fn action<S: CemiSender>(
        &self,
        sender: &S,
        address: &str,
        value: &ActionValue,
    ) -> Result<()> {
        let destination = self.destination(address)?;
        let cemi = value.encode(&destination, self.config.message_code())?;
        self.send(sender, &cemi).await
    }

    pub async fn action_raw<S: CemiSender>(&self, sender: &S, address: &str, data: &[u8]) -> Result<()> {
        let destination = self.destination(address)?;
        let cemi = encode_action(&destination, ApduPayload::Long(data), self.config.message_code())?;
        self.send(sender, &cemi).await
    }

    pub async fn action_datapoint<S: CemiSender>(
        &self,
        sender: &S,
        address: &str,
        type_id: &str,
        value: &DptValue,
    ) -> Result<()> {
        let destination = self.destination(address)?;
        let bytes = self.codecs.encode(type_id, value)?;
        let payload = if self.codecs.is_short(type_id)? {
            ApduPayload::Short(bytes.first().copied().ok_or_else(KnxError::invalid_value)?)
        } else {
            ApduPayload::Long(&bytes)
        };
        let cemi = encode_action(&destination, payload, self.config.message_code())?;
        self.send(sender, &cemi).await
    }

    pub async fn request_status<S: CemiSender>(&self, sender: &S, address: &str) -> Result<()> {
        let destination = self.destination(address)?;
        let cemi = encode_status_request(&destination, self.config.message_code())?;
        self.send(sender, &cemi).await
    }

    pub fn to_datapoint(&self, type_id: &str, value: &DptValue) -> Result<Vec<u8>> {
        self.codecs.encode(type_id, value)
    }

    pub fn from_datapoint(&self, type_id: &str, data: &[u8]) -> Result<DptValue> {
        self.codecs.decode(type_id, data)
    }
}

/// Assembles a connection from a configuration, a handler and a codec
/// registry.
///
/// Defaults: a handler that ignores everything and
/// [`CodecRegistry::with_standard`].
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
    handler: Arc<dyn ConnectionHandler>,
    codecs: Arc<CodecRegistry>,
}

impl ConnectionBuilder {
    /// Start from `config`
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            handler: Arc::new(()),
            codecs: Arc::new(CodecRegistry::with_standard()),
        }
    }

    /// Set the application handler
    #[must_use]
    pub fn handler(mut self, handler: impl ConnectionHandler) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Set the codec registry
    #[must_use]
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = Arc::new(codecs);
        self
    }

    fn core(self) -> ConnectionCore {
        ConnectionCore::new(self.config, self.handler, self.codecs)
    }

    /// Tunnel over UDP to the configured gateway.
    ///
    /// # Errors
    ///
    /// Configuration error when no gateway is set.
    pub fn tunnel(self) -> Result<TunnelConnection> {
        let factory = UnicastUdpFactory::new(self.config.local_addr);
        self.tunnel_with(factory)
    }

    /// Tunnel over transports opened by `factory`
    pub fn tunnel_with<F: TransportFactory>(self, factory: F) -> Result<TunnelConnection<F>> {
        let gateway = self
            .config
            .gateway
            .ok_or_else(|| KnxError::missing_endpoint("KNX_GATEWAY_IP"))?;
        Ok(TunnelConnection::new(self.core(), factory, gateway))
    }

    /// Route over the configured multicast group
    pub fn routing(self) -> RoutingConnection {
        let factory = MulticastUdpFactory::new(
            *self.config.multicast.ip(),
            self.config.multicast.port(),
            self.config.multicast_interface(),
        );
        self.routing_with(factory)
    }

    /// Route over transports opened by `factory`
    pub fn routing_with<F: TransportFactory>(self, factory: F) -> RoutingConnection<F> {
        RoutingConnection::new(self.core(), factory)
    }
}

impl core::fmt::Debug for dyn ConnectionHandler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("ConnectionHandler")
    }
}
