//! KNXnet/IP tunneling connection.
//!
//! ## State machine
//!
//! ```text
//! Disconnected ──connect()──> Connecting ──CONNECT_RESPONSE ok──> Connected
//!      ^                          │                                  │
//!      │                          └── timeout / rejected ────────────┤
//!      │                                                             v
//!      └──────────────────────────────────────────────────── Disconnecting
//! ```
//!
//! While connected the reader task acknowledges every TUNNELLING_REQUEST
//! with matching channel, delivering only frames with a fresh sequence
//! number, and a heartbeat task sends CONNECTIONSTATE_REQUESTs.
//!
//! A lost session (socket failure, refused heartbeat, gateway disconnect)
//! is torn down and then re-established up to
//! [`ConnectionConfig::reconnect_attempts`](crate::ConnectionConfig) times.
//! [`TunnelConnection::disconnect`] never reconnects.

use crate::connection::pipeline::{BusEvent, EventQueue, PipelineHandler, ReceivePipeline};
use crate::connection::{ActionValue, CemiSender, ConnectionCore};
use crate::dpt::DptValue;
use crate::error::{KnxError, Result};
use crate::net::{AsyncTransport, TransportFactory, UnicastUdpFactory};
use crate::protocol::constants::{ServiceType, E_NO_ERROR, E_NO_MORE_CONNECTIONS};
use crate::protocol::frame::{Hpai, KnxnetIpFrame};
use crate::protocol::services::{
    disconnect_response, ChannelStatus, ConnectRequest, ConnectResponse, ConnectionHeader,
    ConnectionStateRequest, DisconnectRequest, TunnelingAck, TunnelingRequest,
};
use core::fmt;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Tunnel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TunnelState {
    /// No session
    #[default]
    Disconnected,
    /// CONNECT_REQUEST sent, waiting for the response
    Connecting,
    /// Session established
    Connected,
    /// Tearing down
    Disconnecting,
}

/// Channel and sequence counters of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TunnelSession {
    channel_id: u8,
    last_seen: Option<u8>,
    /// The receive counter has rolled over from the top of the range
    wrapped: bool,
    send_sequence: u8,
}

/// Distance from either end of the counter range treated as a rollover
const ROLLOVER_WINDOW: u8 = 0x10;

impl TunnelSession {
    fn new(channel_id: u8) -> Self {
        Self {
            channel_id,
            ..Self::default()
        }
    }

    /// Check a received sequence number and record it when fresh.
    ///
    /// A frame is fresh when its sequence number is strictly greater than
    /// the last one seen. The first frame of a session is always fresh, and
    /// a low number right after a high one (`0xF0..` to `..0x10`) is the
    /// counter rolling over. After a rollover, a high number following a
    /// low one is a late retransmit from before it.
    fn accept(&mut self, seq: u8) -> bool {
        let fresh = match self.last_seen {
            None => true,
            Some(last) if last > u8::MAX - ROLLOVER_WINDOW && seq < ROLLOVER_WINDOW => {
                self.wrapped = true;
                true
            }
            Some(last)
                if self.wrapped && last < ROLLOVER_WINDOW && seq > u8::MAX - ROLLOVER_WINDOW =>
            {
                false
            }
            Some(last) => seq > last,
        };
        if fresh {
            self.last_seen = Some(seq);
        }
        fresh
    }

    fn next_send_sequence(&mut self) -> u8 {
        let seq = self.send_sequence;
        self.send_sequence = seq.wrapping_add(1);
        seq
    }
}

/// Background tasks of the current session
struct Link<T: AsyncTransport> {
    pipeline: ReceivePipeline<T>,
    keepalive: CancellationToken,
    heartbeat: JoinHandle<()>,
}

struct TunnelShared<F: TransportFactory> {
    core: ConnectionCore,
    factory: F,
    gateway: SocketAddr,
    state: Mutex<TunnelState>,
    session: Mutex<TunnelSession>,
    transport: Mutex<Option<Arc<F::Transport>>>,
    link: Mutex<Option<Link<F::Transport>>>,
    pending_connect: Mutex<Option<oneshot::Sender<ConnectResponse>>>,
    pending_disconnect: Mutex<Option<oneshot::Sender<ChannelStatus>>>,
    /// Serializes connect, disconnect and loss handling
    lifecycle: tokio::sync::Mutex<()>,
    /// Set by `disconnect()`; stops the reconnect loop
    closing: AtomicBool,
    /// Incremented per connect attempt; stale loss reports are ignored
    epoch: AtomicU64,
}

/// A tunneling connection to one gateway.
///
/// Built with [`ConnectionBuilder::tunnel`](crate::ConnectionBuilder::tunnel)
/// or [`ConnectionBuilder::tunnel_with`](crate::ConnectionBuilder::tunnel_with).
pub struct TunnelConnection<F: TransportFactory = UnicastUdpFactory> {
    shared: Arc<TunnelShared<F>>,
}

impl<F: TransportFactory> TunnelConnection<F> {
    pub(crate) fn new(core: ConnectionCore, factory: F, gateway: SocketAddr) -> Self {
        Self {
            shared: Arc::new(TunnelShared {
                core,
                factory,
                gateway,
                state: Mutex::new(TunnelState::Disconnected),
                session: Mutex::new(TunnelSession::default()),
                transport: Mutex::new(None),
                link: Mutex::new(None),
                pending_connect: Mutex::new(None),
                pending_disconnect: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
                closing: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Open a transport and establish a session.
    ///
    /// # Errors
    ///
    /// - `Connection` rejected when the gateway has no free channel (status `0x24`)
    /// - `Connection` failed for any other refusing status
    /// - [`KnxError::Timeout`] when no response arrives within the connect timeout
    /// - already-connected when a session exists
    pub async fn connect(&self) -> Result<()> {
        let shared = &self.shared;
        let _lifecycle = shared.lifecycle.lock().await;
        if *shared.state.lock() != TunnelState::Disconnected {
            return Err(KnxError::already_connected());
        }
        shared.closing.store(false, Ordering::SeqCst);
        shared.establish().await
    }

    /// Close the session with a DISCONNECT handshake. No reconnect follows.
    ///
    /// A missing DISCONNECT_RESPONSE is logged; the local teardown happens
    /// regardless. Does nothing when not connected.
    pub async fn disconnect(&self) -> Result<()> {
        let shared = &self.shared;
        shared.closing.store(true, Ordering::SeqCst);
        let _lifecycle = shared.lifecycle.lock().await;
        if *shared.state.lock() != TunnelState::Connected {
            return Ok(());
        }

        *shared.state.lock() = TunnelState::Disconnecting;
        shared.core.gate.mark_disconnected().await;
        if let Err(err) = shared.request_disconnect().await {
            knx_log!(warn, "Disconnect handshake with {} failed: {}", shared.gateway, err);
        }
        shared.teardown().await;
        Ok(())
    }

    /// Current lifecycle state
    pub fn state(&self) -> TunnelState {
        *self.shared.state.lock()
    }

    /// Gateway-assigned channel, while connected
    pub fn channel_id(&self) -> Option<u8> {
        (self.state() == TunnelState::Connected).then(|| self.shared.session.lock().channel_id)
    }

    /// Gateway endpoint
    pub fn gateway(&self) -> SocketAddr {
        self.shared.gateway
    }

    /// Write `value` to the group address `address`.
    ///
    /// Waits while disconnected; see [`SendGate`](crate::connection::SendGate).
    ///
    /// # Errors
    ///
    /// Address parse errors and unrepresentable values fail before anything
    /// is sent.
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

impl<F: TransportFactory> fmt::Debug for TunnelConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelConnection")
            .field("gateway", &self.shared.gateway)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<F: TransportFactory> Drop for TunnelConnection<F> {
    fn drop(&mut self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.core.gate.close();
        if let Some(link) = self.shared.link.lock().take() {
            link.keepalive.cancel();
            link.pipeline.cancel();
        }
    }
}

impl<F: TransportFactory> TunnelShared<F> {
    fn current_transport(&self) -> Result<Arc<F::Transport>> {
        self.transport.lock().clone().ok_or_else(KnxError::not_connected)
    }

    fn channel_id(&self) -> u8 {
        self.session.lock().channel_id
    }

    /// One connect attempt. Caller holds the lifecycle lock.
    async fn establish(self: &Arc<Self>) -> Result<()> {
        *self.state.lock() = TunnelState::Connecting;
        let result = self.try_establish().await;
        if let Err(err) = &result {
            *self.state.lock() = TunnelState::Disconnected;
            knx_log!(warn, "Connect to {} failed: {}", self.gateway, err);
        }
        result
    }

    async fn try_establish(self: &Arc<Self>) -> Result<()> {
        knx_log!(info, "Connecting to {}", self.gateway);
        let transport = Arc::new(self.factory.open().await?);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        let (tx, rx) = oneshot::channel();
        *self.pending_connect.lock() = Some(tx);
        let link = Arc::new(SessionLink {
            shared: Arc::clone(self),
            epoch,
        });
        let pipeline = ReceivePipeline::start(Arc::clone(&transport), link);

        let response = match self.handshake(&transport, rx).await {
            Ok(response) => response,
            Err(err) => {
                self.pending_connect.lock().take();
                pipeline.stop().await;
                return Err(err);
            }
        };

        *self.session.lock() = TunnelSession::new(response.channel_id);
        *self.transport.lock() = Some(transport);
        *self.state.lock() = TunnelState::Connected;

        let keepalive = CancellationToken::new();
        let heartbeat = tokio::spawn(Arc::clone(self).heartbeat(epoch, keepalive.clone()));
        *self.link.lock() = Some(Link {
            pipeline,
            keepalive,
            heartbeat,
        });

        self.core.gate.mark_connected().await;
        knx_log!(
            info,
            "Connected to {}, channel {}",
            self.gateway,
            response.channel_id
        );
        self.core.connected();
        Ok(())
    }

    async fn handshake(
        &self,
        transport: &F::Transport,
        response: oneshot::Receiver<ConnectResponse>,
    ) -> Result<ConnectResponse> {
        let local = Hpai::from_socket_addr(transport.local_addr()?);
        let request = ConnectRequest::new(local, local).build()?;
        transport.send_to(&request, self.gateway).await?;

        let response = tokio::time::timeout(self.core.config.connect_timeout, response)
            .await
            .map_err(|_elapsed| KnxError::Timeout)?
            .map_err(|_dropped| KnxError::connection_closed())?;

        match response.status {
            E_NO_ERROR => Ok(response),
            E_NO_MORE_CONNECTIONS => Err(KnxError::connection_rejected(response.status)),
            status => Err(KnxError::connection_failed(status)),
        }
    }

    async fn request_disconnect(&self) -> Result<()> {
        let transport = self.current_transport()?;
        let local = Hpai::from_socket_addr(transport.local_addr()?);
        let request = DisconnectRequest::new(self.channel_id(), local).build()?;

        let (tx, rx) = oneshot::channel();
        *self.pending_disconnect.lock() = Some(tx);
        let result = async {
            transport.send_to(&request, self.gateway).await?;
            tokio::time::timeout(self.core.config.connect_timeout, rx)
                .await
                .map_err(|_elapsed| KnxError::Timeout)?
                .map_err(|_dropped| KnxError::connection_closed())
        }
        .await;
        self.pending_disconnect.lock().take();

        let status = result?;
        knx_log!(debug, "DISCONNECT_RESPONSE status 0x{:02X}", status.status);
        Ok(())
    }

    /// Stop every task of the session and notify the handler.
    async fn teardown(&self) {
        *self.state.lock() = TunnelState::Disconnecting;
        self.core.gate.mark_disconnected().await;

        let link = self.link.lock().take();
        if let Some(link) = link {
            link.keepalive.cancel();
            if let Err(err) = link.heartbeat.await {
                if err.is_panic() {
                    knx_log!(error, "Heartbeat task panicked");
                }
            }
            link.pipeline.stop().await;
        }
        self.transport.lock().take();

        *self.state.lock() = TunnelState::Disconnected;
        knx_log!(info, "Disconnected from {}", self.gateway);
        self.core.disconnected();
    }

    /// Tear down the session of `epoch`, then try to get it back.
    async fn handle_loss(self: Arc<Self>, epoch: u64, reconnect: bool) {
        let _lifecycle = self.lifecycle.lock().await;
        if self.epoch.load(Ordering::SeqCst) != epoch || *self.state.lock() != TunnelState::Connected {
            knx_log!(debug, "Ignoring loss of a finished session");
            return;
        }

        knx_log!(warn, "Tunnel to {} lost", self.gateway);
        self.teardown().await;
        if reconnect {
            self.reconnect().await;
        }
    }

    fn spawn_loss(self: &Arc<Self>, epoch: u64, reconnect: bool) {
        tokio::spawn(Arc::clone(self).handle_loss(epoch, reconnect));
    }

    async fn reconnect(self: &Arc<Self>) {
        let attempts = self.core.config.reconnect_attempts;
        for attempt in 1..=attempts {
            tokio::time::sleep(self.core.config.reconnect_delay).await;
            if self.closing.load(Ordering::SeqCst) {
                knx_log!(info, "Reconnect to {} cancelled", self.gateway);
                return;
            }

            knx_log!(info, "Reconnect attempt {}/{} to {}", attempt, attempts, self.gateway);
            if self.establish().await.is_ok() {
                return;
            }
        }

        if attempts > 0 {
            knx_log!(
                error,
                "Giving up on {} after {} reconnect attempts",
                self.gateway,
                attempts
            );
        }
    }

    async fn heartbeat(self: Arc<Self>, epoch: u64, cancel: CancellationToken) {
        let period = self.core.config.heartbeat_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(err) = self.send_heartbeat().await {
                knx_log!(error, "Heartbeat to {} failed: {}", self.gateway, err);
                self.spawn_loss(epoch, true);
                break;
            }
        }
    }

    async fn send_heartbeat(&self) -> Result<()> {
        let transport = self.current_transport()?;
        let local = Hpai::from_socket_addr(transport.local_addr()?);
        let request = ConnectionStateRequest::new(self.channel_id(), local).build()?;
        knx_log!(trace, "CONNECTIONSTATE_REQUEST to {}", self.gateway);
        transport.send_to(&request, self.gateway).await
    }

    async fn handle_datagram(
        self: &Arc<Self>,
        epoch: u64,
        transport: &F::Transport,
        datagram: &[u8],
        queue: &EventQueue,
    ) -> Result<()> {
        let frame = KnxnetIpFrame::parse(datagram)?;
        let body = frame.body();
        let Some(service) = frame.service_type() else {
            knx_log!(
                debug,
                "Ignoring service 0x{:04X}",
                frame.header().service_code
            );
            return Ok(());
        };

        match service {
            ServiceType::ConnectResponse => self.on_connect_response(body),
            ServiceType::TunnellingRequest => self.on_tunnelling_request(transport, body, queue).await,
            ServiceType::TunnellingAck => {
                let ack = TunnelingAck::parse(body)?;
                knx_log!(
                    trace,
                    "TUNNELLING_ACK channel {} seq {} status 0x{:02X}",
                    ack.connection_header.channel_id,
                    ack.connection_header.sequence_counter,
                    ack.status
                );
                Ok(())
            }
            ServiceType::ConnectionstateResponse => {
                let response = self.channel_status(body)?;
                if !response.is_ok() {
                    knx_log!(
                        warn,
                        "Gateway {} refused heartbeat, status 0x{:02X}",
                        self.gateway,
                        response.status
                    );
                    self.spawn_loss(epoch, true);
                }
                Ok(())
            }
            ServiceType::DisconnectRequest => {
                let channel = DisconnectRequest::parse_channel(body)?;
                if channel != self.channel_id() {
                    return Err(KnxError::channel_mismatch());
                }
                transport
                    .send_to(&disconnect_response(channel)?, self.gateway)
                    .await?;
                knx_log!(info, "Gateway {} closed channel {}", self.gateway, channel);
                self.spawn_loss(epoch, true);
                Ok(())
            }
            ServiceType::DisconnectResponse => {
                let response = self.channel_status(body)?;
                let pending = self.pending_disconnect.lock().take();
                match pending {
                    Some(tx) => {
                        if tx.send(response).is_err() {
                            knx_log!(debug, "Disconnect waiter already gone");
                        }
                    }
                    None => self.spawn_loss(epoch, false),
                }
                Ok(())
            }
            _ => Err(KnxError::unexpected_service()),
        }
    }

    fn channel_status(&self, body: &[u8]) -> Result<ChannelStatus> {
        let status = ChannelStatus::parse(body)?;
        if status.channel_id != self.channel_id() {
            return Err(KnxError::channel_mismatch());
        }
        Ok(status)
    }

    fn on_connect_response(&self, body: &[u8]) -> Result<()> {
        let response = ConnectResponse::parse(body)?;
        let pending = self.pending_connect.lock().take();
        let Some(tx) = pending else {
            return Err(KnxError::unexpected_service());
        };
        if tx.send(response).is_err() {
            knx_log!(debug, "Connect waiter already gone");
        }
        Ok(())
    }

    async fn on_tunnelling_request(
        &self,
        transport: &F::Transport,
        body: &[u8],
        queue: &EventQueue,
    ) -> Result<()> {
        let request = TunnelingRequest::parse(body)?;
        let ConnectionHeader {
            channel_id,
            sequence_counter,
        } = request.connection_header;

        let fresh = {
            if *self.state.lock() != TunnelState::Connected {
                return Err(KnxError::not_connected());
            }
            let mut session = self.session.lock();
            if channel_id != session.channel_id {
                return Err(KnxError::channel_mismatch());
            }
            session.accept(sequence_counter)
        };

        // Deliver before acking: a frame recorded as seen is never delivered later
        let delivered = if fresh {
            self.core.receive_cemi(request.cemi, queue)
        } else {
            knx_log!(debug, "Duplicate TUNNELLING_REQUEST seq {}", sequence_counter);
            Ok(())
        };

        let ack = TunnelingAck::new(channel_id, sequence_counter).build()?;
        if let Err(err) = transport.send_to(&ack, self.gateway).await {
            knx_log!(warn, "TUNNELLING_ACK seq {} not sent: {}", sequence_counter, err);
        }
        delivered
    }
}

impl<F: TransportFactory> CemiSender for TunnelShared<F> {
    async fn send_cemi(&self, cemi: &[u8]) -> Result<()> {
        let transport = self.current_transport()?;
        let header = {
            let mut session = self.session.lock();
            ConnectionHeader::new(session.channel_id, session.next_send_sequence())
        };
        let frame = TunnelingRequest::new(header, cemi).build()?;
        transport.send_to(&frame, self.gateway).await
    }
}

/// Pipeline handler bound to one session
struct SessionLink<F: TransportFactory> {
    shared: Arc<TunnelShared<F>>,
    epoch: u64,
}

impl<F: TransportFactory> PipelineHandler<F::Transport> for SessionLink<F> {
    async fn on_datagram(
        &self,
        transport: &F::Transport,
        datagram: &[u8],
        queue: &EventQueue,
    ) -> Result<()> {
        self.shared
            .handle_datagram(self.epoch, transport, datagram, queue)
            .await
    }

    fn on_event(&self, event: BusEvent) {
        self.shared.core.event(&event);
    }

    fn on_transport_lost(self: Arc<Self>, _error: KnxError) {
        self.shared.spawn_loss(self.epoch, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_frame_is_fresh() {
        let mut session = TunnelSession::new(7);
        assert!(session.accept(200));
        assert!(!session.accept(200));
        assert!(session.accept(201));
    }

    #[test]
    fn test_sequence_rollover() {
        let mut session = TunnelSession::new(1);
        assert!(session.accept(254));
        assert!(session.accept(255));
        assert!(session.accept(0));
        assert!(!session.accept(255));
        assert!(session.accept(1));
    }

    #[test]
    fn test_send_sequence_wraps() {
        let mut session = TunnelSession {
            send_sequence: 255,
            ..TunnelSession::new(1)
        };
        assert_eq!(session.next_send_sequence(), 255);
        assert_eq!(session.next_send_sequence(), 0);
    }

    #[test]
    fn test_large_jump_is_fresh() {
        let mut session = TunnelSession::new(1);
        assert!(session.accept(0));
        assert!(session.accept(200));
        assert!(!session.accept(199));
        assert!(session.accept(250));
    }

    #[test]
    fn test_high_number_before_rollover_is_fresh() {
        let mut session = TunnelSession::new(1);
        assert!(session.accept(3));
        assert!(session.accept(0xF8));
        assert!(session.accept(0x02));
        assert!(!session.accept(0xF8));
        assert!(!session.accept(0xFF));
        assert!(session.accept(0x03));
    }

    proptest! {
        #[test]
        fn test_accepts_only_strictly_increasing(
            seqs in proptest::collection::vec(ROLLOVER_WINDOW..=u8::MAX - ROLLOVER_WINDOW, 1..64),
        ) {
            let mut session = TunnelSession::new(1);
            let mut highest: Option<u8> = None;
            for seq in seqs {
                let expected = highest.map_or(true, |h| seq > h);
                prop_assert_eq!(session.accept(seq), expected);
                if expected {
                    highest = Some(seq);
                }
            }
        }

        #[test]
        fn test_accept_over_full_range(seqs in proptest::collection::vec(any::<u8>(), 1..64)) {
            let mut session = TunnelSession::new(1);
            let mut highest: Option<u8> = None;
            let mut rolled_over = false;
            for seq in seqs {
                let expected = match highest {
                    None => true,
                    Some(h) if h >= 0xF0 && seq < 0x10 => {
                        rolled_over = true;
                        true
                    }
                    Some(h) if rolled_over && h < 0x10 && seq >= 0xF0 => false,
                    Some(h) => seq > h,
                };
                prop_assert_eq!(session.accept(seq), expected, "seq {} after {:?}", seq, highest);
                if expected {
                    highest = Some(seq);
                }
            }
        }

        #[test]
        fn test_exact_retransmit_is_never_fresh(seqs in proptest::collection::vec(any::<u8>(), 1..64)) {
            let mut session = TunnelSession::new(1);
            for seq in seqs {
                session.accept(seq);
                prop_assert!(!session.accept(seq));
            }
        }
    }
}
