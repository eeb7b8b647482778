// ============================================
// File: crates/protov2d-node/tests/resume.rs
// ============================================
//! Session resumption: transport loss, outbox preservation, and the
//! reconnect window.

mod common;

use std::time::Duration;

use bytes::Bytes;

use protov2d_node::{Qos, ServerEvent, SessionEvent};

use common::{
    connect_client, fast_client_config, hash_pins, next_connection, next_data, test_server,
};

#[tokio::test]
async fn reliable_send_survives_transport_loss() {
    let mut ts = test_server(false, 120);
    let config = fast_client_config(hash_pins(&ts.root_public));

    let (client, mut client_events, connector) = connect_client(&ts.server, config).await;
    let (_server_session, mut server_events) = next_connection(&mut ts.events).await;
    let session_count_before = ts.server.session_count();

    // Kill the carrier with the server unreachable, then queue a
    // reliable send while disconnected.
    connector.set_offline(true);
    connector.kill_current().await;
    loop {
        match tokio::time::timeout(Duration::from_secs(5), client_events.recv())
            .await
            .expect("event")
            .expect("stream open")
        {
            SessionEvent::Disconnected => break,
            _ => {}
        }
    }

    let send = {
        let session = client.session().clone();
        tokio::spawn(async move { session.send(Bytes::from_static(b"survives"), Qos::Reliable).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.session().pending_reliable(), 1);

    // Bring the server back; the reconnect driver resumes.
    connector.set_offline(false);

    // The reconnect driver resumes the same session; the payload
    // arrives exactly once and the promise settles.
    assert_eq!(&next_data(&mut server_events).await[..], b"survives");
    send.await.unwrap().unwrap();

    // Same session object on the server: no second Connection event,
    // no table growth.
    assert_eq!(ts.server.session_count(), session_count_before);
    assert!(
        tokio::time::timeout(Duration::from_millis(300), ts.events.recv())
            .await
            .is_err(),
        "resume must not emit a fresh-session event"
    );

    // No duplicate delivery after the dust settles.
    assert!(
        tokio::time::timeout(Duration::from_millis(300), async {
            loop {
                if let Some(SessionEvent::Data(_)) = server_events.recv().await {
                    return;
                }
            }
        })
        .await
        .is_err(),
        "payload must be delivered exactly once"
    );
}

#[tokio::test]
async fn outbox_redelivers_every_buffered_payload() {
    let mut ts = test_server(false, 120);
    let config = fast_client_config(hash_pins(&ts.root_public));

    let (client, _client_events, connector) = connect_client(&ts.server, config).await;
    let (_server_session, mut server_events) = next_connection(&mut ts.events).await;

    connector.set_offline(true);
    connector.kill_current().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut sends = Vec::new();
    for i in 0..3u8 {
        let session = client.session().clone();
        sends.push(tokio::spawn(async move {
            session.send(vec![i; 8], Qos::Reliable).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.session().pending_reliable(), 3);

    connector.set_offline(false);

    let mut seen = std::collections::HashSet::new();
    for _ in 0..3 {
        let payload = next_data(&mut server_events).await;
        assert!(seen.insert(payload[0]));
    }
    for send in sends {
        send.await.unwrap().unwrap();
    }
    assert_eq!(client.session().pending_reliable(), 0);
}

#[tokio::test]
async fn client_reemits_connected_on_resume() {
    let mut ts = test_server(false, 120);
    let config = fast_client_config(hash_pins(&ts.root_public));

    let (_client, mut client_events, connector) = connect_client(&ts.server, config).await;
    let (_server_session, _server_events) = next_connection(&mut ts.events).await;

    connector.kill_current().await;

    let mut saw_disconnect = false;
    loop {
        match tokio::time::timeout(Duration::from_secs(5), client_events.recv())
            .await
            .expect("event")
            .expect("stream open")
        {
            SessionEvent::Disconnected => saw_disconnect = true,
            SessionEvent::Connected if saw_disconnect => break,
            _ => {}
        }
    }
}

#[tokio::test]
async fn reconnect_window_expiry_drops_session() {
    let mut ts = test_server(false, 1);
    let config = fast_client_config(hash_pins(&ts.root_public));

    let (_client, _client_events, connector) = connect_client(&ts.server, config).await;
    let (server_session, _server_events) = next_connection(&mut ts.events).await;
    let session_id = server_session.id().to_string();

    // Sever the carrier with the server unreachable, so no resume
    // lands inside the window.
    connector.set_offline(true);
    connector.kill_current().await;

    // Wait out the window; the server must drop the session.
    let dropped = loop {
        match tokio::time::timeout(Duration::from_secs(5), ts.events.recv())
            .await
            .expect("server event")
            .expect("server stream open")
        {
            ServerEvent::DropConnection(id) => break id,
            ServerEvent::Connection { .. } => {}
        }
    };
    assert_eq!(dropped, session_id);
    assert_eq!(ts.server.session_count(), 0);
}

#[tokio::test]
async fn graceful_close_destroys_both_sides() {
    let mut ts = test_server(false, 120);
    let config = fast_client_config(hash_pins(&ts.root_public));

    let (client, mut client_events, _connector) = connect_client(&ts.server, config).await;
    let (server_session, mut server_events) = next_connection(&mut ts.events).await;

    client.close().await;

    // Client observes the deliberate teardown...
    let mut saw_final = false;
    loop {
        match tokio::time::timeout(Duration::from_secs(5), client_events.recv())
            .await
            .expect("event")
            .expect("stream open")
        {
            SessionEvent::FinalClose => saw_final = true,
            SessionEvent::Closed => break,
            _ => {}
        }
    }
    assert!(saw_final);

    // ...and the server destroys its session on the close frame.
    loop {
        match tokio::time::timeout(Duration::from_secs(5), server_events.recv())
            .await
            .expect("event")
            .expect("stream open")
        {
            SessionEvent::Closed => break,
            _ => {}
        }
    }
    assert!(server_session.is_closed());

    // Pending sends settle with an error once the session is gone.
    let result = client
        .session()
        .send(Bytes::from_static(b"late"), Qos::Reliable)
        .await;
    assert!(result.is_err());
}
