// ============================================
// File: crates/protov2d-node/tests/plaintext.rs
// ============================================
//! Unencrypted sessions and wire-level checks that need to see raw
//! frames: no ciphertext after a plaintext handshake, duplicate
//! suppression under frame injection, dupID parity on the wire.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use protov2d_core::handshake::client::{ClientHandshake, ClientHandshakeResult, ClientStep};
use protov2d_core::protocol::frame::{DataFrame, CTRL_ACK};
use protov2d_core::protocol::records::EncryptionMode;
use protov2d_core::IdentityKeyPair;
use protov2d_node::{memory_pair, FrameTransport, PinSet};
use protov2d_transport::TransportEvent;

use common::{next_connection, spawn_echo, test_server};

const PAYLOAD: &[u8] = &[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];

/// Drives the client handshake engine by hand over a raw transport,
/// leaving the transport free for frame-level assertions afterwards.
async fn manual_plaintext_handshake(
    server: &protov2d_node::Server,
) -> (Arc<dyn FrameTransport>, ClientHandshakeResult) {
    let (client_half, server_half) = memory_pair();
    let server = server.clone();
    tokio::spawn(async move {
        let transport: Arc<dyn FrameTransport> = server_half;
        let _ = server.accept_transport(transport).await;
    });

    let transport: Arc<dyn FrameTransport> = client_half;
    let pins = PinSet::new(vec![protov2d_node::PinEntry::NoVerify]).unwrap();
    let mut handshake = ClientHandshake::new(
        pins,
        Arc::new(IdentityKeyPair::generate()),
        2,
        vec![2],
        EncryptionMode::Plaintext,
    );

    transport
        .send(Bytes::from(handshake.initial().unwrap()))
        .await
        .unwrap();

    loop {
        match transport.recv().await {
            TransportEvent::Frame(frame) => match handshake.process(&frame).unwrap() {
                ClientStep::Send(out) => transport.send(Bytes::from(out)).await.unwrap(),
                ClientStep::Complete(result) => return (transport, result),
            },
            TransportEvent::Closed { .. } => panic!("transport closed mid-handshake"),
        }
    }
}

async fn next_frame(transport: &Arc<dyn FrameTransport>) -> Bytes {
    match tokio::time::timeout(Duration::from_secs(5), transport.recv())
        .await
        .expect("frame")
    {
        TransportEvent::Frame(frame) => frame,
        TransportEvent::Closed { reason, .. } => panic!("transport closed: {reason:?}"),
    }
}

fn raw_data_frame(body: DataFrame) -> Bytes {
    let mut frame = vec![0x03];
    frame.extend_from_slice(&body.encode());
    Bytes::from(frame)
}

#[tokio::test]
async fn plaintext_wire_carries_no_ciphertext() {
    let mut ts = test_server(true, 120);
    let (transport, result) = manual_plaintext_handshake(&ts.server).await;
    assert!(result.key_stack.is_plaintext());

    let (server_session, server_events) = next_connection(&mut ts.events).await;
    spawn_echo(server_session, server_events);

    // Client-minted dupID: low bit 0.
    let dup_id = 0;
    transport
        .send(raw_data_frame(DataFrame::Reliable {
            dup_id,
            retransmit: false,
            payload: Bytes::from_static(PAYLOAD),
        }))
        .await
        .unwrap();

    let mut acked = false;
    let mut echoed = false;
    while !(acked && echoed) {
        let frame = next_frame(&transport).await;
        assert_eq!(frame[0], 0x03);
        match DataFrame::decode(&frame[1..]).unwrap() {
            DataFrame::Ack { dup_id: id } => {
                assert_eq!(id, dup_id);
                acked = true;
            }
            DataFrame::Reliable {
                dup_id: server_id,
                payload,
                ..
            } => {
                // The echo travels in the clear: payload bytes appear
                // verbatim at the end of the raw frame.
                assert_eq!(&payload[..], PAYLOAD);
                assert_eq!(&frame[frame.len() - PAYLOAD.len()..], PAYLOAD);
                // Server-minted dupIDs carry low bit 1.
                assert_eq!(server_id & 1, 1);

                transport
                    .send(raw_data_frame(DataFrame::Ack { dup_id: server_id }))
                    .await
                    .unwrap();
                echoed = true;
            }
            DataFrame::Fire { .. } => panic!("unexpected fire frame"),
        }
    }
}

#[tokio::test]
async fn duplicate_frames_are_acked_but_not_redelivered() {
    let mut ts = test_server(true, 120);
    let (transport, _result) = manual_plaintext_handshake(&ts.server).await;
    let (_server_session, mut server_events) = next_connection(&mut ts.events).await;

    let dup_id = 4; // client-minted
    let first = raw_data_frame(DataFrame::Reliable {
        dup_id,
        retransmit: false,
        payload: Bytes::from_static(b"once"),
    });
    let retransmission = raw_data_frame(DataFrame::Reliable {
        dup_id,
        retransmit: true,
        payload: Bytes::from_static(b"once"),
    });

    transport.send(first).await.unwrap();
    transport.send(retransmission).await.unwrap();

    // Both copies are acknowledged...
    for _ in 0..2 {
        let frame = next_frame(&transport).await;
        match DataFrame::decode(&frame[1..]).unwrap() {
            DataFrame::Ack { dup_id: id } => assert_eq!(id, dup_id),
            other => panic!("expected ack, got {other:?}"),
        }
    }

    // ...but the application sees the payload exactly once.
    assert_eq!(&common::next_data(&mut server_events).await[..], b"once");
    assert!(
        tokio::time::timeout(Duration::from_millis(300), async {
            loop {
                if let Some(protov2d_node::SessionEvent::Data(_)) = server_events.recv().await {
                    return;
                }
            }
        })
        .await
        .is_err(),
        "duplicate must not reach the application"
    );
}

#[test]
fn malformed_ack_constant_is_enforced() {
    // A hand-rolled ack must use 0xFF; anything else is rejected by
    // the decoder before it can confuse the outbox.
    let mut bad_ack = vec![0x01, 0, 0, 0, 4, 0x7F];
    assert!(DataFrame::decode(&bad_ack).is_err());
    bad_ack[5] = CTRL_ACK;
    assert!(DataFrame::decode(&bad_ack).is_ok());
}
