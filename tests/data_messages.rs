//! Data message delivery, classification and duplicate suppression.

mod common;

use std::time::Duration;

use common::{
    TestResult, accept_and_handshake, data_stanza, expect_connect, expect_silence, next_event,
    scripted_endpoint, send_frame, spawn_receiver, test_config,
};
use pushframe::{Event, registry};

#[tokio::test]
async fn plaintext_stanza_arrives_as_data_received_verbatim() -> TestResult {
    let (listener, addr) = scripted_endpoint().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = accept_and_handshake(&listener).await.expect("handshake");
        send_frame(
            &mut stream,
            registry::DATA_MESSAGE_STANZA_TAG,
            &data_stanza("p1", &[("title", "hello")]),
        )
        .await
        .expect("send stanza");
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(stream);
    });

    let (handle, mut events, task) = spawn_receiver(addr, Vec::new(), test_config());
    expect_connect(&mut events).await;

    let event = next_event(&mut events, Duration::from_secs(2)).await;
    let Event::DataReceived(message) = event else {
        panic!("expected data event, got {event:?}");
    };
    assert_eq!(message.persistent_id, "p1");
    assert_eq!(message.from, "test-sender");
    assert_eq!(message.category, "com.example.app");
    assert_eq!(message.app_data.get("title").map(String::as_str), Some("hello"));
    assert_eq!(message.raw_data, vec![0xde, 0xad, 0xbe, 0xef]);

    handle.shutdown();
    task.await?;
    server.abort();
    Ok(())
}

#[tokio::test]
async fn crypto_key_classifies_the_stanza_as_a_notification() -> TestResult {
    let (listener, addr) = scripted_endpoint().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = accept_and_handshake(&listener).await.expect("handshake");
        send_frame(
            &mut stream,
            registry::DATA_MESSAGE_STANZA_TAG,
            &data_stanza("p1", &[("crypto-key", "dh=BNcW4oA7z"), ("salt", "8A1psY")]),
        )
        .await
        .expect("send stanza");
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(stream);
    });

    let (handle, mut events, task) = spawn_receiver(addr, Vec::new(), test_config());
    expect_connect(&mut events).await;

    let event = next_event(&mut events, Duration::from_secs(2)).await;
    let Event::NotificationReceived(message) = event else {
        panic!("expected notification event, got {event:?}");
    };
    assert!(message.is_encrypted());
    assert_eq!(
        message.app_data.get("crypto-key").map(String::as_str),
        Some("dh=BNcW4oA7z")
    );

    handle.shutdown();
    task.await?;
    server.abort();
    Ok(())
}

#[tokio::test]
async fn duplicate_stanza_within_a_session_is_dropped() -> TestResult {
    let (listener, addr) = scripted_endpoint().await?;

    let server = tokio::spawn(async move {
        let (mut stream, _) = accept_and_handshake(&listener).await.expect("handshake");
        for _ in 0..2 {
            send_frame(
                &mut stream,
                registry::DATA_MESSAGE_STANZA_TAG,
                &data_stanza("p1", &[("k", "v")]),
            )
            .await
            .expect("send stanza");
        }
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(stream);
    });

    let (handle, mut events, task) = spawn_receiver(addr, Vec::new(), test_config());
    expect_connect(&mut events).await;

    let event = next_event(&mut events, Duration::from_secs(2)).await;
    assert!(matches!(event, Event::DataReceived(ref m) if m.persistent_id == "p1"));
    expect_silence(&mut events, Duration::from_millis(300)).await;

    handle.shutdown();
    task.await?;
    server.abort();
    Ok(())
}

#[tokio::test]
async fn replayed_stanza_after_reconnect_is_dropped_and_acknowledged() -> TestResult {
    let (listener, addr) = scripted_endpoint().await?;

    let server = tokio::spawn(async move {
        // First connection: deliver p1 then drop the link.
        let (mut stream, login) = accept_and_handshake(&listener).await.expect("handshake");
        assert!(login.received_persistent_id.is_empty());
        send_frame(
            &mut stream,
            registry::DATA_MESSAGE_STANZA_TAG,
            &data_stanza("p1", &[("k", "v")]),
        )
        .await
        .expect("send stanza");
        // Give the client a moment to dispatch before the cut.
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(stream);

        // Second connection: the replay list must acknowledge p1; the
        // server replays it anyway, plus a fresh message.
        let (mut stream, login) = accept_and_handshake(&listener).await.expect("reconnect");
        assert_eq!(login.received_persistent_id, vec!["p1"]);
        for id in ["p1", "p2"] {
            send_frame(
                &mut stream,
                registry::DATA_MESSAGE_STANZA_TAG,
                &data_stanza(id, &[("k", "v")]),
            )
            .await
            .expect("send stanza");
        }
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(stream);
    });

    let (handle, mut events, task) = spawn_receiver(addr, Vec::new(), test_config());
    expect_connect(&mut events).await;

    let event = next_event(&mut events, Duration::from_secs(2)).await;
    assert!(matches!(event, Event::DataReceived(ref m) if m.persistent_id == "p1"));

    // Link drops: error, disconnect, then the supervisor reconnects.
    let event = next_event(&mut events, Duration::from_secs(2)).await;
    assert!(matches!(event, Event::Error(_)), "got {event:?}");
    assert_eq!(next_event(&mut events, Duration::from_secs(2)).await, Event::Disconnect);
    assert_eq!(next_event(&mut events, Duration::from_secs(5)).await, Event::Connect);

    // Only the fresh message surfaces; the replayed p1 is suppressed.
    let event = next_event(&mut events, Duration::from_secs(2)).await;
    assert!(
        matches!(event, Event::DataReceived(ref m) if m.persistent_id == "p2"),
        "got {event:?}"
    );
    expect_silence(&mut events, Duration::from_millis(300)).await;

    assert_eq!(handle.persistent_ids(), vec!["p1", "p2"]);

    handle.shutdown();
    task.await?;
    server.abort();
    Ok(())
}

#[tokio::test]
async fn ids_seeded_at_construction_suppress_redelivery() -> TestResult {
    let (listener, addr) = scripted_endpoint().await?;

    let server = tokio::spawn(async move {
        let (mut stream, login) = accept_and_handshake(&listener).await.expect("handshake");
        // The seed list is replayed to the server on the first handshake.
        assert_eq!(login.received_persistent_id, vec!["p-old"]);
        send_frame(
            &mut stream,
            registry::DATA_MESSAGE_STANZA_TAG,
            &data_stanza("p-old", &[("k", "v")]),
        )
        .await
        .expect("send stanza");
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(stream);
    });

    let (handle, mut events, task) =
        spawn_receiver(addr, vec!["p-old".to_owned()], test_config());
    expect_connect(&mut events).await;
    expect_silence(&mut events, Duration::from_millis(300)).await;

    handle.shutdown();
    task.await?;
    server.abort();
    Ok(())
}
