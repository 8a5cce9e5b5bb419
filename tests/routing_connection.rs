//! Routing connection tests against an in-memory multicast group.

use knx_netip::net::MockNetwork;
use knx_netip::{AddressingMode, ConnectionBuilder, ConnectionConfig, DptValue, Handlers};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(2);

fn routing_indication(cemi: &[u8]) -> Vec<u8> {
    let total = u16::try_from(cemi.len() + 6).unwrap();
    let mut frame = vec![0x06, 0x10, 0x05, 0x30];
    frame.extend_from_slice(&total.to_be_bytes());
    frame.extend_from_slice(cemi);
    frame
}

/// `L_Data.ind` from 1.1.5 to raw group 0x0A03
fn indication(apci: u8, data: &[u8]) -> Vec<u8> {
    let mut cemi = vec![0x29, 0x00, 0xBC, 0xE0, 0x11, 0x05, 0x0A, 0x03];
    cemi.push(u8::try_from(data.len() + 1).unwrap());
    cemi.extend_from_slice(&[0x00, apci]);
    cemi.extend_from_slice(data);
    cemi
}

#[tokio::test]
async fn test_indications_dispatched_by_kind() {
    let network = MockNetwork::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let events = tx.clone();
    let handlers = Handlers::new()
        .event(move |address, data| {
            let _ = events.send(("event", address.to_string(), data.to_vec()));
        })
        .status(move |address, data| {
            let _ = tx.send(("status", address.to_string(), data.to_vec()));
        });
    let config = ConnectionConfig::routing().with_addressing(AddressingMode::TwoLevel);
    let routing = ConnectionBuilder::new(config)
        .handler(handlers)
        .routing_with(network.clone());
    routing.connect().await.unwrap();

    // Busy indication and a read request are not application traffic
    network.inject(&[0x06, 0x10, 0x05, 0x32, 0x00, 0x0C, 0x06, 0x00, 0x00, 0x64, 0x00, 0x00]);
    network.inject(&routing_indication(&indication(0x00, &[])));
    network.inject(&routing_indication(&indication(0x40, &[0x2A])));
    network.inject(&routing_indication(&indication(0x81, &[])));

    let first = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    let second = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, ("status", "1/515".to_owned(), vec![0x2A]));
    assert_eq!(second, ("event", "1/515".to_owned(), vec![0x01]));

    // Nothing is acknowledged on a routing connection
    assert!(network.sent().is_empty());
}

#[tokio::test]
async fn test_datapoint_action() {
    let network = MockNetwork::new();
    let config = ConnectionConfig::routing()
        .with_send_interval(Duration::ZERO)
        .with_action_message_code(0x29);
    let routing = ConnectionBuilder::new(config).routing_with(network.clone());
    routing.connect().await.unwrap();

    routing
        .action_datapoint("1/2/3", "9.001", &DptValue::Float(21.5))
        .await
        .unwrap();

    let (datagram, target) = network.sent_with_destination().remove(0);
    assert_eq!(target, "224.0.23.12:3671".parse::<SocketAddr>().unwrap());
    assert_eq!(
        datagram,
        vec![
            0x06, 0x10, 0x05, 0x30, 0x00, 0x13, // header
            0x29, 0x00, 0x94, 0xE0, 0x00, 0x00, 0x0A, 0x03, 0x03, 0x00, 0x80, 0x0C, 0x33,
        ]
    );
    assert_eq!(
        routing.from_datapoint("9.001", &datagram[17..]).unwrap(),
        DptValue::Float(21.5)
    );
}

#[tokio::test]
async fn test_socket_failure_ends_connection() {
    let network = MockNetwork::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handlers = Handlers::new().disconnected(move || {
        let _ = tx.send(());
    });
    let routing = ConnectionBuilder::new(ConnectionConfig::routing())
        .handler(handlers)
        .routing_with(network.clone());
    routing.connect().await.unwrap();

    assert!(network.fail_current());
    tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();

    assert!(!routing.is_connected());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(network.opened_count(), 1);

    routing.connect().await.unwrap();
    assert_eq!(network.opened_count(), 2);
}
