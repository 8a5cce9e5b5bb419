//! Tunnel connection tests against an in-memory gateway.
//!
//! Each test plays the gateway through a [`MockNetwork`]: it waits for the
//! datagrams the connection sends and injects the gateway's answers.

use knx_netip::net::MockNetwork;
use knx_netip::{
    ConnectionBuilder, ConnectionConfig, Handlers, KnxError, TunnelConnection, TunnelState,
};
use proptest::prelude::*;
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;

const CHANNEL: u8 = 7;
const WAIT: Duration = Duration::from_secs(2);

/// `L_Data.ind` from 1.1.5 to 1/2/3, APCI byte `apci`
fn indication(apci: u8, data: &[u8]) -> Vec<u8> {
    let mut cemi = vec![0x29, 0x00, 0xBC, 0xE0, 0x11, 0x05, 0x0A, 0x03];
    cemi.push(u8::try_from(data.len() + 1).unwrap());
    cemi.extend_from_slice(&[0x00, apci]);
    cemi.extend_from_slice(data);
    cemi
}

fn frame(service: u16, body: &[u8]) -> Vec<u8> {
    let total = u16::try_from(body.len() + 6).unwrap();
    let mut frame = vec![0x06, 0x10];
    frame.extend_from_slice(&service.to_be_bytes());
    frame.extend_from_slice(&total.to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

fn connect_response(channel: u8, status: u8) -> Vec<u8> {
    if status == 0 {
        frame(
            0x0206,
            &[
                channel, 0x00, 0x08, 0x01, 192, 168, 1, 10, 0x0E, 0x57, 0x04, 0x04, 0x11, 0x0A,
            ],
        )
    } else {
        frame(0x0206, &[channel, status])
    }
}

fn tunnelling_request(channel: u8, seq: u8, cemi: &[u8]) -> Vec<u8> {
    let mut body = vec![0x04, channel, seq, 0x00];
    body.extend_from_slice(cemi);
    frame(0x0420, &body)
}

fn service_of(datagram: &[u8]) -> u16 {
    u16::from_be_bytes([datagram[2], datagram[3]])
}

#[derive(Debug, PartialEq, Eq)]
enum Seen {
    Connected,
    Disconnected,
    Event(String, Vec<u8>),
    Status(String, Vec<u8>),
}

fn recorder() -> (Handlers, mpsc::UnboundedReceiver<Seen>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let connected = tx.clone();
    let disconnected = tx.clone();
    let event = tx.clone();
    let handlers = Handlers::new()
        .connected(move || {
            let _ = connected.send(Seen::Connected);
        })
        .disconnected(move || {
            let _ = disconnected.send(Seen::Disconnected);
        })
        .event(move |address, data| {
            let _ = event.send(Seen::Event(address.to_string(), data.to_vec()));
        })
        .status(move |address, data| {
            let _ = tx.send(Seen::Status(address.to_string(), data.to_vec()));
        });
    (handlers, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("no callback in time")
        .expect("handler dropped")
}

fn config(network: &MockNetwork) -> ConnectionConfig {
    ConnectionConfig::tunneling(network.peer())
        .with_send_interval(Duration::ZERO)
        .with_heartbeat_interval(Duration::from_secs(3600))
        .with_connect_timeout(WAIT)
        .with_reconnect(0, Duration::from_millis(10))
}

fn tunnel(
    network: &MockNetwork,
    config: ConnectionConfig,
) -> (TunnelConnection<MockNetwork>, mpsc::UnboundedReceiver<Seen>) {
    let (handlers, rx) = recorder();
    let tunnel = ConnectionBuilder::new(config)
        .handler(handlers)
        .tunnel_with(network.clone())
        .unwrap();
    (tunnel, rx)
}

/// Answer the next CONNECT_REQUEST with `response`.
///
/// Counts the datagrams already sent when called, not when first polled.
fn gateway_answers(network: &MockNetwork, response: Vec<u8>) -> impl Future<Output = ()> + '_ {
    let before = network.sent().len();
    async move {
        let sent = tokio::time::timeout(WAIT, network.wait_for_sent(before + 1))
            .await
            .expect("no CONNECT_REQUEST");
        assert_eq!(service_of(&sent[before]), 0x0205);
        assert!(network.inject(&response));
    }
}

async fn connected(network: &MockNetwork) -> (TunnelConnection<MockNetwork>, mpsc::UnboundedReceiver<Seen>) {
    let (tunnel, mut rx) = tunnel(network, config(network));
    let (result, ()) = tokio::join!(
        tunnel.connect(),
        gateway_answers(network, connect_response(CHANNEL, 0x00))
    );
    result.unwrap();
    assert_eq!(next(&mut rx).await, Seen::Connected);
    network.clear_sent();
    (tunnel, rx)
}

async fn sent(network: &MockNetwork, count: usize) -> Vec<Vec<u8>> {
    tokio::time::timeout(WAIT, network.wait_for_sent(count))
        .await
        .expect("datagrams not sent in time")
}

#[tokio::test]
async fn test_connect_request_layout() {
    let network = MockNetwork::new();
    let (tunnel, _rx) = tunnel(&network, config(&network));

    let (result, ()) = tokio::join!(
        tunnel.connect(),
        gateway_answers(&network, connect_response(CHANNEL, 0x00))
    );
    result.unwrap();

    let request = &network.sent()[0];
    assert_eq!(
        request,
        &vec![
            0x06, 0x10, 0x02, 0x05, 0x00, 0x1A, // header
            0x08, 0x01, 192, 168, 1, 100, 0xC3, 0x50, // control endpoint
            0x08, 0x01, 192, 168, 1, 100, 0xC3, 0x50, // data endpoint
            0x04, 0x04, 0x02, 0x00, // tunnel link layer
        ]
    );
    assert_eq!(tunnel.state(), TunnelState::Connected);
    assert_eq!(tunnel.channel_id(), Some(CHANNEL));
}

#[tokio::test]
async fn test_connect_rejected_when_gateway_is_full() {
    let network = MockNetwork::new();
    let (tunnel, mut rx) = tunnel(&network, config(&network));

    let rejection = vec![0x06, 0x10, 0x02, 0x06, 0x00, 0x08, 0x00, 0x24];
    let (result, ()) = tokio::join!(tunnel.connect(), gateway_answers(&network, rejection));

    let err = result.unwrap_err();
    assert!(err.is_rejected());
    assert_eq!(tunnel.state(), TunnelState::Disconnected);
    assert_eq!(tunnel.channel_id(), None);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_connect_failed_status() {
    let network = MockNetwork::new();
    let (tunnel, _rx) = tunnel(&network, config(&network));

    let (result, ()) = tokio::join!(
        tunnel.connect(),
        gateway_answers(&network, connect_response(0, 0x22))
    );

    match result.unwrap_err() {
        KnxError::Connection(err) => {
            assert!(!err.is_rejected());
            assert_eq!(err.status(), Some(0x22));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(tunnel.state(), TunnelState::Disconnected);
}

#[tokio::test]
async fn test_connect_timeout() {
    let network = MockNetwork::new();
    let config = config(&network).with_connect_timeout(Duration::from_millis(50));
    let (tunnel, _rx) = tunnel(&network, config);

    let err = tunnel.connect().await.unwrap_err();
    assert!(matches!(err, KnxError::Timeout));
    assert_eq!(tunnel.state(), TunnelState::Disconnected);
}

#[tokio::test]
async fn test_connect_twice_fails() {
    let network = MockNetwork::new();
    let (tunnel, _rx) = connected(&network).await;
    assert!(tunnel.connect().await.is_err());
}

#[tokio::test]
async fn test_duplicate_sequence_acked_but_delivered_once() {
    let network = MockNetwork::new();
    let (_tunnel, mut rx) = connected(&network).await;

    let on = tunnelling_request(CHANNEL, 5, &indication(0x81, &[]));
    network.inject(&on);
    network.inject(&on);

    let acks = sent(&network, 2).await;
    let expected_ack = vec![0x06, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, CHANNEL, 5, 0x00];
    assert_eq!(acks, vec![expected_ack.clone(), expected_ack]);

    network.inject(&tunnelling_request(CHANNEL, 6, &indication(0x80, &[])));
    assert_eq!(next(&mut rx).await, Seen::Event("1/2/3".into(), vec![0x01]));
    assert_eq!(next(&mut rx).await, Seen::Event("1/2/3".into(), vec![0x00]));
    assert_eq!(sent(&network, 3).await.len(), 3);
}

#[tokio::test]
async fn test_failed_ack_does_not_lose_frame() {
    let network = MockNetwork::new();
    let (tunnel, mut rx) = connected(&network).await;

    let on = tunnelling_request(CHANNEL, 1, &indication(0x81, &[]));
    network.fail_next_send();
    network.inject(&on);
    assert_eq!(next(&mut rx).await, Seen::Event("1/2/3".into(), vec![0x01]));

    // Unacknowledged, so the gateway repeats it
    network.inject(&on);
    let acks = sent(&network, 1).await;
    assert_eq!(acks, vec![vec![0x06, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, CHANNEL, 1, 0x00]]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(tunnel.state(), TunnelState::Connected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_every_request_acked_and_fresh_ones_delivered(
        seqs in proptest::collection::vec(0u8..0xF0, 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let network = MockNetwork::new();
            let (_tunnel, mut rx) = connected(&network).await;

            for (index, seq) in seqs.iter().enumerate() {
                let marker = u8::try_from(index).unwrap();
                network.inject(&tunnelling_request(CHANNEL, *seq, &indication(0x80, &[marker])));
            }

            let acks = sent(&network, seqs.len()).await;
            let acked: Vec<u8> = acks.iter().map(|ack| ack[8]).collect();
            assert_eq!(acked, seqs);

            let mut highest: Option<u8> = None;
            for (index, seq) in seqs.iter().enumerate() {
                if highest.map_or(true, |h| *seq > h) {
                    highest = Some(*seq);
                    let marker = u8::try_from(index).unwrap();
                    assert_eq!(next(&mut rx).await, Seen::Event("1/2/3".into(), vec![marker]));
                }
            }

            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(rx.try_recv().is_err());
            assert_eq!(network.sent().len(), seqs.len());
        });
    }
}

#[tokio::test]
async fn test_status_response_reaches_status_handler() {
    let network = MockNetwork::new();
    let (_tunnel, mut rx) = connected(&network).await;

    network.inject(&tunnelling_request(CHANNEL, 0, &indication(0x40, &[0x0C, 0x33])));

    assert_eq!(next(&mut rx).await, Seen::Status("1/2/3".into(), vec![0x0C, 0x33]));
    assert_eq!(sent(&network, 1).await.len(), 1);
}

#[tokio::test]
async fn test_foreign_channel_is_not_acked() {
    let network = MockNetwork::new();
    let (_tunnel, mut rx) = connected(&network).await;

    network.inject(&tunnelling_request(CHANNEL + 1, 0, &indication(0x81, &[])));
    network.inject(&[0x06, 0x10, 0x04]);
    network.inject(&tunnelling_request(CHANNEL, 0, &indication(0x80, &[])));

    assert_eq!(next(&mut rx).await, Seen::Event("1/2/3".into(), vec![0x00]));
    let acks = network.sent();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0][7], CHANNEL);
}

#[tokio::test]
async fn test_action_frames_use_send_sequence() {
    let network = MockNetwork::new();
    let (tunnel, _rx) = connected(&network).await;

    tunnel.action("1/2/3", true).await.unwrap();
    tunnel.action("1/2/3", 0x1234u32).await.unwrap();
    tunnel.request_status("1/2/3").await.unwrap();

    let frames = network.sent();
    assert_eq!(
        frames[0],
        vec![
            0x06, 0x10, 0x04, 0x20, 0x00, 0x15, // header
            0x04, CHANNEL, 0x00, 0x00, // connection header
            0x11, 0x00, 0x94, 0xE0, 0x00, 0x00, 0x0A, 0x03, 0x01, 0x00, 0x81,
        ]
    );
    assert_eq!(frames[1][8], 0x01);
    assert_eq!(&frames[1][18..], &[0x03, 0x00, 0x80, 0x12, 0x34]);
    assert_eq!(frames[2][8], 0x02);
    assert_eq!(&frames[2][18..], &[0x01, 0x00, 0x00]);
}

#[tokio::test]
async fn test_invalid_value_is_never_sent() {
    let network = MockNetwork::new();
    let (tunnel, _rx) = connected(&network).await;

    let err = tunnel.action("1/2/3", 70_000u32).await.unwrap_err();
    assert!(err.is_invalid_value());
    assert!(network.sent().is_empty());
}

#[tokio::test]
async fn test_send_waits_for_connect() {
    let network = MockNetwork::new();
    let (tunnel, _rx) = tunnel(&network, config(&network));

    let early = tokio::time::timeout(Duration::from_millis(50), tunnel.action("1/2/3", true)).await;
    assert!(early.is_err());
    assert!(network.sent().is_empty());

    let (sent, connect, ()) = tokio::join!(
        tunnel.action("1/2/3", true),
        tunnel.connect(),
        gateway_answers(&network, connect_response(CHANNEL, 0x00))
    );
    sent.unwrap();
    connect.unwrap();

    let services: Vec<_> = network.sent().iter().map(|d| service_of(d)).collect();
    assert_eq!(services, vec![0x0205, 0x0420]);
}

#[tokio::test]
async fn test_heartbeat() {
    let network = MockNetwork::new();
    let config = config(&network).with_heartbeat_interval(Duration::from_millis(20));
    let (tunnel, mut rx) = tunnel(&network, config);
    let (result, ()) = tokio::join!(
        tunnel.connect(),
        gateway_answers(&network, connect_response(CHANNEL, 0x00))
    );
    result.unwrap();
    assert_eq!(next(&mut rx).await, Seen::Connected);

    let sent = sent(&network, 2).await;
    assert_eq!(
        sent[1],
        vec![
            0x06, 0x10, 0x02, 0x07, 0x00, 0x10, CHANNEL, 0x00, 0x08, 0x01, 192, 168, 1, 100,
            0xC3, 0x50,
        ]
    );

    network.inject(&frame(0x0208, &[CHANNEL, 0x00]));
    network.inject(&frame(0x0208, &[CHANNEL, 0x21]));
    assert_eq!(next(&mut rx).await, Seen::Disconnected);
    assert_eq!(tunnel.state(), TunnelState::Disconnected);
}

#[tokio::test]
async fn test_transport_loss_reconnects() {
    let network = MockNetwork::new();
    let config = config(&network).with_reconnect(2, Duration::from_millis(10));
    let (tunnel, mut rx) = tunnel(&network, config);
    let (result, ()) = tokio::join!(
        tunnel.connect(),
        gateway_answers(&network, connect_response(CHANNEL, 0x00))
    );
    result.unwrap();
    assert_eq!(next(&mut rx).await, Seen::Connected);

    network.clear_sent();
    assert!(network.fail_current());
    assert_eq!(next(&mut rx).await, Seen::Disconnected);

    gateway_answers(&network, connect_response(CHANNEL + 1, 0x00)).await;
    assert_eq!(next(&mut rx).await, Seen::Connected);
    assert_eq!(network.opened_count(), 2);
    assert_eq!(tunnel.channel_id(), Some(CHANNEL + 1));

    network.clear_sent();
    network.inject(&tunnelling_request(CHANNEL + 1, 0, &indication(0x81, &[])));
    assert_eq!(next(&mut rx).await, Seen::Event("1/2/3".into(), vec![0x01]));
}

#[tokio::test]
async fn test_gateway_disconnect_request_is_answered() {
    let network = MockNetwork::new();
    let (tunnel, mut rx) = connected(&network).await;

    network.inject(&frame(
        0x0209,
        &[CHANNEL, 0x00, 0x08, 0x01, 192, 168, 1, 10, 0x0E, 0x57],
    ));

    let sent = sent(&network, 1).await;
    assert_eq!(sent[0], vec![0x06, 0x10, 0x02, 0x0A, 0x00, 0x08, CHANNEL, 0x00]);
    assert_eq!(next(&mut rx).await, Seen::Disconnected);
    assert_eq!(tunnel.state(), TunnelState::Disconnected);
}

#[tokio::test]
async fn test_user_disconnect_handshake() {
    let network = MockNetwork::new();
    let (tunnel, mut rx) = connected(&network).await;

    let gateway = async {
        let sent = sent(&network, 1).await;
        assert_eq!(service_of(&sent[0]), 0x0209);
        assert_eq!(sent[0][6], CHANNEL);
        network.inject(&frame(0x020A, &[CHANNEL, 0x00]));
    };
    let (result, ()) = tokio::join!(tunnel.disconnect(), gateway);
    result.unwrap();

    assert_eq!(next(&mut rx).await, Seen::Disconnected);
    assert_eq!(tunnel.state(), TunnelState::Disconnected);
    assert_eq!(network.opened_count(), 1);
    assert!(!network.inject(&[0x00]));
}

#[tokio::test]
async fn test_panicking_handler_does_not_stop_delivery() {
    let network = MockNetwork::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handlers = Handlers::new().event(move |_, data| {
        if data == [0x01] {
            panic!("handler bug");
        }
        let _ = tx.send(data.to_vec());
    });
    let tunnel = ConnectionBuilder::new(config(&network))
        .handler(handlers)
        .tunnel_with(network.clone())
        .unwrap();
    let (result, ()) = tokio::join!(
        tunnel.connect(),
        gateway_answers(&network, connect_response(CHANNEL, 0x00))
    );
    result.unwrap();

    network.inject(&tunnelling_request(CHANNEL, 0, &indication(0x81, &[])));
    network.inject(&tunnelling_request(CHANNEL, 1, &indication(0x80, &[])));

    let data = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(data, vec![0x00]);
}
