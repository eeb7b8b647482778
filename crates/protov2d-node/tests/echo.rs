// ============================================
// File: crates/protov2d-node/tests/echo.rs
// ============================================
//! End-to-end echo scenarios over both protocol versions.

mod common;

use std::time::Duration;

use bytes::Bytes;

use protov2d_node::{HandshakeV1, Qos, SessionEvent};

use common::{
    connect_client, fast_client_config, hash_pins, next_connection, next_data, spawn_echo,
    test_server,
};

const PAYLOAD: &[u8] = &[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];

#[tokio::test]
async fn echo_over_v2_encrypted() {
    let mut ts = test_server(false, 120);
    let config = fast_client_config(hash_pins(&ts.root_public));

    let (client, mut client_events, _connector) = connect_client(&ts.server, config).await;
    let (server_session, server_events) = next_connection(&mut ts.events).await;
    assert_eq!(server_session.version(), 2);
    spawn_echo(server_session, server_events);

    client
        .session()
        .send(Bytes::from_static(PAYLOAD), Qos::Reliable)
        .await
        .unwrap();

    let echoed = next_data(&mut client_events).await;
    assert_eq!(&echoed[..], PAYLOAD);
    assert_eq!(client.session().pending_reliable(), 0);
}

#[tokio::test]
async fn echo_over_v1_forced() {
    let mut ts = test_server(false, 120);
    let config =
        fast_client_config(hash_pins(&ts.root_public)).with_handshake_v1(HandshakeV1::Forced);

    let (client, mut client_events, _connector) = connect_client(&ts.server, config).await;
    assert_eq!(client.session().version(), 1);

    let (server_session, server_events) = next_connection(&mut ts.events).await;
    assert_eq!(server_session.version(), 1);
    spawn_echo(server_session, server_events);

    client
        .session()
        .send(Bytes::from_static(PAYLOAD), Qos::Reliable)
        .await
        .unwrap();

    let echoed = next_data(&mut client_events).await;
    assert_eq!(&echoed[..], PAYLOAD);
}

#[tokio::test]
async fn fire_and_forget_delivery() {
    let mut ts = test_server(false, 120);
    let config = fast_client_config(hash_pins(&ts.root_public));

    let (client, _client_events, _connector) = connect_client(&ts.server, config).await;
    let (_server_session, mut server_events) = next_connection(&mut ts.events).await;

    client
        .session()
        .send(Bytes::from_static(b"unacked"), Qos::Fire)
        .await
        .unwrap();

    let received = next_data(&mut server_events).await;
    assert_eq!(&received[..], b"unacked");
    assert_eq!(client.session().pending_reliable(), 0);
}

#[tokio::test]
async fn large_reliable_payload() {
    let mut ts = test_server(false, 120);
    let config = fast_client_config(hash_pins(&ts.root_public));

    let (client, _client_events, _connector) = connect_client(&ts.server, config).await;
    let (_server_session, mut server_events) = next_connection(&mut ts.events).await;

    let payload = Bytes::from(vec![0x5Au8; 128 * 1024]);
    client
        .session()
        .send(payload.clone(), Qos::Reliable)
        .await
        .unwrap();

    assert_eq!(next_data(&mut server_events).await, payload);
}

#[tokio::test]
async fn keepalive_produces_rtt_samples() {
    let mut ts = test_server(false, 120);
    let config = fast_client_config(hash_pins(&ts.root_public))
        .with_ping_interval(Duration::from_millis(100));

    let (client, mut client_events, _connector) = connect_client(&ts.server, config).await;
    let (_server_session, _server_events) = next_connection(&mut ts.events).await;

    // Wait for a ping round-trip to surface.
    let rtt = loop {
        match tokio::time::timeout(Duration::from_secs(5), client_events.recv())
            .await
            .expect("event")
            .expect("stream open")
        {
            SessionEvent::Ping(rtt) => break rtt,
            _ => {}
        }
    };

    assert!(rtt < Duration::from_secs(2));
    assert!(client.session().last_ping().is_some());
    assert!(client.session().average_ping().is_some());
}

#[tokio::test]
async fn concurrent_reliable_sends() {
    let mut ts = test_server(false, 120);
    let config = fast_client_config(hash_pins(&ts.root_public));

    let (client, _client_events, _connector) = connect_client(&ts.server, config).await;
    let (_server_session, mut server_events) = next_connection(&mut ts.events).await;

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let session = client.session().clone();
        handles.push(tokio::spawn(async move {
            session.send(vec![i; 16], Qos::Reliable).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // All eight distinct payloads arrive exactly once.
    let mut seen = std::collections::HashSet::new();
    for _ in 0..8 {
        let payload = next_data(&mut server_events).await;
        assert_eq!(payload.len(), 16);
        assert!(seen.insert(payload[0]));
    }
    assert_eq!(client.session().pending_reliable(), 0);
}
