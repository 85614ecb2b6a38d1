//! Typed events delivered to the embedder.
//!
//! The receiver and its sessions publish onto a bounded single-producer,
//! single-consumer channel. A slow consumer never stalls the read loop:
//! when the queue stays full past a bounded grace period the event is
//! dropped with a warning, matching the protocol's fire-and-forget posture
//! towards observers.

use std::{
    collections::HashMap,
    time::{Duration, SystemTime},
};

use log::{debug, warn};
use tokio::{sync::mpsc, time::timeout};

use crate::{error::ErrorReason, proto};

/// How long a full event queue is waited on before the event is dropped.
const SEND_GRACE: Duration = Duration::from_secs(1);

/// A pushed message surfaced to subscribers, ciphertext and crypto
/// metadata verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PushMessage {
    /// Server-assigned id used for duplicate suppression and replay.
    pub persistent_id: String,
    /// Sender identity (a sender id or subscription topic).
    pub from: String,
    /// Package name of the receiving application.
    pub category: String,
    /// Application key/value metadata.
    pub app_data: HashMap<String, String>,
    /// Opaque payload bytes; encrypted when `app_data` carries a
    /// `crypto-key` entry.
    pub raw_data: Vec<u8>,
}

impl From<&proto::DataMessageStanza> for PushMessage {
    fn from(stanza: &proto::DataMessageStanza) -> Self {
        let app_data = stanza
            .app_data
            .iter()
            .map(|entry| {
                (
                    entry.key.clone().unwrap_or_default(),
                    entry.value.clone().unwrap_or_default(),
                )
            })
            .collect();
        Self {
            persistent_id: stanza.persistent_id.clone().unwrap_or_default(),
            from: stanza.from.clone().unwrap_or_default(),
            category: stanza.category.clone().unwrap_or_default(),
            app_data,
            raw_data: stanza.raw_data.clone().unwrap_or_default(),
        }
    }
}

impl PushMessage {
    /// Whether the payload is an encrypted web-push style notification.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.app_data.contains_key("crypto-key")
    }
}

/// Events emitted by a [`crate::PushReceiver`].
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The handshake completed; at most once per session.
    Connect,
    /// The session ended; exactly once per session that connected.
    Disconnect,
    /// A plaintext data message arrived.
    DataReceived(PushMessage),
    /// An encrypted notification arrived (`crypto-key` present).
    NotificationReceived(PushMessage),
    /// The server probed the connection; stamped at receipt.
    HeartbeatPing(SystemTime),
    /// Our acknowledgement went out; stamped at the write.
    HeartbeatAck(SystemTime),
    /// The session hit an error; the supervisor decides what follows.
    Error(ErrorReason),
}

impl Event {
    /// Short name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connect => "connect",
            Event::Disconnect => "disconnect",
            Event::DataReceived(_) => "data-received",
            Event::NotificationReceived(_) => "notification-received",
            Event::HeartbeatPing(_) => "heartbeat-ping",
            Event::HeartbeatAck(_) => "heartbeat-ack",
            Event::Error(_) => "error",
        }
    }
}

/// Producer side of the event channel, shared by supervisor and sessions.
#[derive(Clone)]
pub(crate) struct EventBus {
    tx: mpsc::Sender<Event>,
}

impl EventBus {
    /// Create a bus and its consumer stream with the given capacity.
    pub(crate) fn channel(capacity: usize) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, EventStream { rx })
    }

    /// Publish `event`, waiting at most [`SEND_GRACE`] for queue space.
    ///
    /// A queue that stays full past the grace period costs the caller the
    /// event, not the connection: the event is dropped and a warning
    /// logged. A dropped receiver is quietly tolerated so a session can
    /// finish tearing down after the embedder walks away.
    pub(crate) async fn emit(&self, event: Event) {
        let kind = event.kind();
        match timeout(SEND_GRACE, self.tx.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!("event receiver dropped; discarding {kind} event"),
            Err(_) => warn!("event queue full for {SEND_GRACE:?}; dropping {kind} event"),
        }
    }
}

/// Consumer handle for receiver events.
pub struct EventStream {
    rx: mpsc::Receiver<Event>,
}

impl EventStream {
    /// Wait for the next event.
    ///
    /// Returns `None` once the receiver has shut down and all queued
    /// events have been drained.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stanza_with(key: &str) -> proto::DataMessageStanza {
        proto::DataMessageStanza {
            persistent_id: Some("p1".into()),
            from: Some("sender".into()),
            category: Some("com.example".into()),
            app_data: vec![proto::AppData {
                key: Some(key.into()),
                value: Some("v".into()),
            }],
            raw_data: Some(vec![9, 9]),
            ..Default::default()
        }
    }

    #[test]
    fn push_message_copies_stanza_fields_verbatim() {
        let message = PushMessage::from(&stanza_with("k"));
        assert_eq!(message.persistent_id, "p1");
        assert_eq!(message.from, "sender");
        assert_eq!(message.category, "com.example");
        assert_eq!(message.app_data.get("k").map(String::as_str), Some("v"));
        assert_eq!(message.raw_data, vec![9, 9]);
    }

    #[test]
    fn crypto_key_marks_a_message_encrypted() {
        assert!(PushMessage::from(&stanza_with("crypto-key")).is_encrypted());
        assert!(!PushMessage::from(&stanza_with("title")).is_encrypted());
    }

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let (bus, mut stream) = EventBus::channel(4);
        bus.emit(Event::Connect).await;
        bus.emit(Event::Disconnect).await;
        assert_eq!(stream.next().await, Some(Event::Connect));
        assert_eq!(stream.next().await, Some(Event::Disconnect));
    }

    #[tokio::test]
    async fn stream_ends_when_all_producers_drop() {
        let (bus, mut stream) = EventBus::channel(1);
        bus.emit(Event::Connect).await;
        drop(bus);
        assert_eq!(stream.next().await, Some(Event::Connect));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_the_event_after_the_grace_period() {
        let (bus, mut stream) = EventBus::channel(1);
        bus.emit(Event::Connect).await;
        // Queue full and nobody draining: the send times out and the event
        // is discarded rather than blocking the producer.
        bus.emit(Event::Disconnect).await;
        assert_eq!(stream.next().await, Some(Event::Connect));
        bus.emit(Event::HeartbeatPing(SystemTime::UNIX_EPOCH)).await;
        assert_eq!(
            stream.next().await,
            Some(Event::HeartbeatPing(SystemTime::UNIX_EPOCH))
        );
    }
}
