//! KNXnet/IP routing connection.
//!
//! Routing has no handshake, no channel and no sequence numbers: every
//! ROUTING_INDICATION received on the multicast group is decoded and
//! dispatched, and every outbound frame is one ROUTING_INDICATION sent to the
//! group. A lost socket ends the connection; there is no reconnect.

use crate::connection::pipeline::{BusEvent, EventQueue, PipelineHandler, ReceivePipeline};
use crate::connection::{ActionValue, CemiSender, ConnectionCore};
use crate::dpt::DptValue;
use crate::error::{KnxError, Result};
use crate::logging::Hex;
use crate::net::{AsyncTransport, MulticastUdpFactory, TransportFactory};
use crate::protocol::constants::ServiceType;
use crate::protocol::frame::KnxnetIpFrame;
use crate::protocol::services::routing_indication;
use core::fmt;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct RoutingShared<F: TransportFactory> {
    core: ConnectionCore,
    factory: F,
    transport: Mutex<Option<Arc<F::Transport>>>,
    pipeline: Mutex<Option<ReceivePipeline<F::Transport>>>,
    lifecycle: tokio::sync::Mutex<()>,
    /// Bumped on every connect; loss reports from older sockets are stale
    epoch: AtomicU64,
}

/// A routing connection on one multicast group.
///
/// Built with [`ConnectionBuilder::routing`](crate::ConnectionBuilder::routing)
/// or [`ConnectionBuilder::routing_with`](crate::ConnectionBuilder::routing_with).
pub struct RoutingConnection<F: TransportFactory = MulticastUdpFactory> {
    shared: Arc<RoutingShared<F>>,
}

impl<F: TransportFactory> RoutingConnection<F> {
    pub(crate) fn new(core: ConnectionCore, factory: F) -> Self {
        Self {
            shared: Arc::new(RoutingShared {
                core,
                factory,
                transport: Mutex::new(None),
                pipeline: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Join the multicast group and start receiving.
    pub async fn connect(&self) -> Result<()> {
        let shared = &self.shared;
        let _lifecycle = shared.lifecycle.lock().await;
        if shared.transport.lock().is_some() {
            return Err(KnxError::already_connected());
        }

        let transport = Arc::new(shared.factory.open().await?);
        let epoch = shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let link = GroupLink {
            shared: Arc::clone(shared),
            epoch,
        };
        let pipeline = ReceivePipeline::start(Arc::clone(&transport), Arc::new(link));
        *shared.transport.lock() = Some(transport);
        *shared.pipeline.lock() = Some(pipeline);

        shared.core.gate.mark_connected().await;
        knx_log!(info, "Routing on {}", shared.core.config.multicast);
        shared.core.connected();
        Ok(())
    }

    /// Leave the multicast group. Does nothing when not connected.
    pub async fn disconnect(&self) -> Result<()> {
        let _lifecycle = self.shared.lifecycle.lock().await;
        self.shared.teardown().await;
        Ok(())
    }

    /// Check whether the connection is receiving
    pub fn is_connected(&self) -> bool {
        self.shared.transport.lock().is_some()
    }

    /// Write `value` to the group address `address`
    pub async fn action(&self, address: &str, value: impl Into<ActionValue>) -> Result<()> {
        let value = value.into();
        self.shared.core.action(&*self.shared, address, &value).await
    }

    /// Write raw value bytes after the APCI byte
    pub async fn action_raw(&self, address: &str, data: &[u8]) -> Result<()> {
        self.shared.core.action_raw(&*self.shared, address, data).await
    }

    /// Write `value` encoded as datapoint type `type_id`
    pub async fn action_datapoint(&self, address: &str, type_id: &str, value: &DptValue) -> Result<()> {
        self.shared
            .core
            .action_datapoint(&*self.shared, address, type_id, value)
            .await
    }

    /// Send a group read; the answer arrives through `on_status`.
    pub async fn request_status(&self, address: &str) -> Result<()> {
        self.shared.core.request_status(&*self.shared, address).await
    }

    /// Encode `value` with the connection's codec registry
    pub fn to_datapoint(&self, type_id: &str, value: &DptValue) -> Result<Vec<u8>> {
        self.shared.core.to_datapoint(type_id, value)
    }

    /// Decode status or event bytes with the connection's codec registry
    pub fn from_datapoint(&self, type_id: &str, data: &[u8]) -> Result<DptValue> {
        self.shared.core.from_datapoint(type_id, data)
    }
}

impl<F: TransportFactory> fmt::Debug for RoutingConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingConnection")
            .field("multicast", &self.shared.core.config.multicast)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl<F: TransportFactory> Drop for RoutingConnection<F> {
    fn drop(&mut self) {
        self.shared.core.gate.close();
        if let Some(pipeline) = self.shared.pipeline.lock().take() {
            pipeline.cancel();
        }
    }
}

impl<F: TransportFactory> RoutingShared<F> {
    fn target(&self) -> SocketAddr {
        SocketAddr::V4(self.core.config.multicast)
    }

    async fn teardown(&self) {
        if self.transport.lock().is_none() {
            return;
        }
        // Let an in-flight send finish on the socket before it goes away
        self.core.gate.mark_disconnected().await;
        self.transport.lock().take();
        let pipeline = self.pipeline.lock().take();
        if let Some(pipeline) = pipeline {
            pipeline.stop().await;
        }
        knx_log!(info, "Left {}", self.core.config.multicast);
        self.core.disconnected();
    }

    async fn handle_loss(self: Arc<Self>, epoch: u64) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            knx_log!(debug, "Ignoring loss of an earlier routing socket");
            return;
        }
        self.teardown().await;
    }

    fn on_datagram(&self, datagram: &[u8], queue: &EventQueue) -> Result<()> {
        let frame = KnxnetIpFrame::parse(datagram)?;
        match frame.service_type() {
            Some(ServiceType::RoutingIndication) => self.core.receive_cemi(frame.body(), queue),
            Some(ServiceType::RoutingLostMessage | ServiceType::RoutingBusy) => {
                knx_log!(warn, "Router reports {:?}: [{}]", frame.service_type(), Hex(frame.body()));
                Ok(())
            }
            _ => {
                knx_log!(
                    trace,
                    "Ignoring service 0x{:04X} on routing connection",
                    frame.header().service_code
                );
                Ok(())
            }
        }
    }
}

/// Pipeline handler bound to one multicast socket
struct GroupLink<F: TransportFactory> {
    shared: Arc<RoutingShared<F>>,
    epoch: u64,
}

impl<F: TransportFactory> PipelineHandler<F::Transport> for GroupLink<F> {
    async fn on_datagram(
        &self,
        _transport: &F::Transport,
        datagram: &[u8],
        queue: &EventQueue,
    ) -> Result<()> {
        self.shared.on_datagram(datagram, queue)
    }

    fn on_event(&self, event: BusEvent) {
        self.shared.core.event(&event);
    }

    fn on_transport_lost(self: Arc<Self>, _error: KnxError) {
        tokio::spawn(Arc::clone(&self.shared).handle_loss(self.epoch));
    }
}

impl<F: TransportFactory> CemiSender for RoutingShared<F> {
    async fn send_cemi(&self, cemi: &[u8]) -> Result<()> {
        let transport = self
            .transport
            .lock()
            .clone()
            .ok_or_else(KnxError::not_connected)?;
        let frame = routing_indication(cemi)?;
        transport.send_to(&frame, self.target()).await
    }
}
