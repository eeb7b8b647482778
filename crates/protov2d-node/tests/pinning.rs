// ============================================
// File: crates/protov2d-node/tests/pinning.rs
// ============================================
//! Identity pinning and non-recoverable error handling.

mod common;

use std::time::Duration;

use protov2d_core::crypto::sha256;
use protov2d_node::{Client, Connector, HandshakeV1, IdentityKeyPair, NodeError, PinSet};

use common::{fast_client_config, hash_pins, test_server, MemoryConnector};

#[tokio::test]
async fn pin_mismatch_aborts_without_retry() {
    let ts = test_server(false, 120);

    // Pin the hash of an unrelated root key.
    let wrong_root = IdentityKeyPair::generate();
    let pins = PinSet::single_hash(sha256(&wrong_root.public_key_bytes()).to_vec()).unwrap();

    let connector = MemoryConnector::new(ts.server.clone());
    let config = fast_client_config(pins)
        .with_connector(connector.clone() as std::sync::Arc<dyn Connector>);

    let error = Client::connect(config).await.unwrap_err();
    assert!(!error.is_recoverable());
    assert!(matches!(
        error,
        NodeError::Handshake(protov2d_core::CoreError::PinMismatch)
    ));

    // One attempt, no reconnect loop.
    assert_eq!(connector.attempts(), 1);
    assert_eq!(ts.server.session_count(), 0);
}

#[tokio::test]
async fn pin_mismatch_aborts_v1_too() {
    let ts = test_server(false, 120);
    let wrong_root = IdentityKeyPair::generate();
    let pins = PinSet::single_key(wrong_root.public_key_bytes()).unwrap();

    let connector = MemoryConnector::new(ts.server.clone());
    let config = fast_client_config(pins)
        .with_handshake_v1(HandshakeV1::Forced)
        .with_connector(connector.clone() as std::sync::Arc<dyn Connector>);

    let error = Client::connect(config).await.unwrap_err();
    assert!(!error.is_recoverable());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn plaintext_refused_unless_server_allows() {
    let ts = test_server(false, 120);
    let connector = MemoryConnector::new(ts.server.clone());
    let config = fast_client_config(hash_pins(&ts.root_public))
        .with_disable_encryption(true)
        .with_connector(connector.clone() as std::sync::Arc<dyn Connector>);

    let error = Client::connect(config).await.unwrap_err();
    assert!(!error.is_recoverable());
    assert!(matches!(
        error,
        NodeError::Handshake(protov2d_core::CoreError::PlaintextRefused)
    ));
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn initial_retries_are_capped() {
    let ts = test_server(false, 120);
    let connector = MemoryConnector::new(ts.server.clone());
    connector.set_offline(true);

    let config = fast_client_config(hash_pins(&ts.root_public))
        .with_reconnection_time(Duration::from_millis(20))
        .with_max_initial_retries(3)
        .with_connector(connector.clone() as std::sync::Arc<dyn Connector>);

    let error = Client::connect(config).await.unwrap_err();
    assert!(matches!(error, NodeError::ConnectExhausted { attempts: 3 }));
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn initial_retries_recover_when_server_returns() {
    let mut ts = test_server(false, 120);
    let connector = MemoryConnector::new(ts.server.clone());
    connector.set_offline(true);

    let config = fast_client_config(hash_pins(&ts.root_public))
        .with_reconnection_time(Duration::from_millis(50))
        .with_connector(connector.clone() as std::sync::Arc<dyn Connector>);

    let connect = tokio::spawn(async move { Client::connect(config).await });
    tokio::time::sleep(Duration::from_millis(120)).await;
    connector.set_offline(false);

    let (client, _events) = connect.await.unwrap().unwrap();
    assert!(client.session().is_connected());
    assert!(connector.attempts() > 1);

    let (_session, _events) = common::next_connection(&mut ts.events).await;
}
