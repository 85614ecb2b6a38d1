//! Receiver lifecycle: connect, run a session, back off, reconnect.
//!
//! [`PushReceiver::run`] is a plain loop whose body is one session run plus
//! one interruptible sleep; reconnection never nests calls. The dedup store
//! and event channel are owned here and lent to each session, so subscriber
//! state survives any number of reconnects.

use std::{cmp, sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    config::ReceiverConfig,
    credentials::Credentials,
    dedup::DedupStore,
    event::{EventBus, EventStream},
    session::{Session, TerminationReason},
    transport::{Connector, TlsConnector},
};

/// Long-lived MCS push receiver.
///
/// Constructed with provisioned credentials and any persistent ids already
/// delivered in earlier process lifetimes, then driven by awaiting
/// [`run`](Self::run). Events arrive on the [`EventStream`] returned at
/// construction; a [`ReceiverHandle`] controls shutdown from other tasks.
pub struct PushReceiver {
    credentials: Arc<Credentials>,
    config: Arc<ReceiverConfig>,
    connector: Arc<dyn Connector>,
    dedup: Arc<DedupStore>,
    bus: EventBus,
    shutdown: CancellationToken,
}

/// Cloneable control handle for a running [`PushReceiver`].
#[derive(Clone)]
pub struct ReceiverHandle {
    shutdown: CancellationToken,
    dedup: Arc<DedupStore>,
}

impl ReceiverHandle {
    /// Request shutdown. Idempotent and asynchronous: the receiver closes
    /// its transport, emits a final `Disconnect` if connected, and stops
    /// reconnecting.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Point-in-time copy of every persistent id delivered so far, for the
    /// embedder to externalise.
    #[must_use]
    pub fn persistent_ids(&self) -> Vec<String> {
        self.dedup.snapshot()
    }
}

impl PushReceiver {
    /// Build a receiver dialing the real MCS endpoint over TLS.
    #[must_use]
    pub fn new(
        credentials: Credentials,
        persistent_ids: Vec<String>,
        config: ReceiverConfig,
    ) -> (Self, EventStream) {
        Self::with_connector(credentials, persistent_ids, config, Arc::new(TlsConnector::new()))
    }

    /// Build a receiver with a custom transport, e.g. to tunnel through a
    /// proxy or to exercise the protocol against a test endpoint.
    #[must_use]
    pub fn with_connector(
        credentials: Credentials,
        persistent_ids: Vec<String>,
        config: ReceiverConfig,
        connector: Arc<dyn Connector>,
    ) -> (Self, EventStream) {
        let config = config.normalized();
        let (bus, events) = EventBus::channel(config.event_buffer);
        let receiver = Self {
            credentials: Arc::new(credentials),
            config: Arc::new(config),
            connector,
            dedup: Arc::new(DedupStore::seeded(persistent_ids)),
            bus,
            shutdown: CancellationToken::new(),
        };
        (receiver, events)
    }

    /// Control handle usable from any task.
    #[must_use]
    pub fn handle(&self) -> ReceiverHandle {
        ReceiverHandle {
            shutdown: self.shutdown.clone(),
            dedup: Arc::clone(&self.dedup),
        }
    }

    /// Run until shutdown or a fatal credential error.
    ///
    /// Each iteration runs one session to termination, then sleeps the
    /// linear-capped backoff (1 s, 2 s, … up to `max_backoff`) before
    /// reconnecting. The retry counter resets whenever a session completes
    /// its handshake, so a healthy link always reconnects after one second.
    pub async fn run(self) {
        let mut retry: u32 = 0;
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let mut session = Session::new(
                Arc::clone(&self.credentials),
                Arc::clone(&self.config),
                Arc::clone(&self.connector),
                Arc::clone(&self.dedup),
                self.bus.clone(),
                self.shutdown.clone(),
            );
            let reason = session.run(self.dedup.snapshot()).await;
            if session.reached_established() {
                retry = 0;
            }

            match reason {
                TerminationReason::ShutdownRequested => break,
                TerminationReason::Fatal(reason) => {
                    warn!("receiver stopping: {reason}");
                    break;
                }
                TerminationReason::ConnectionLost(reason) => {
                    if self.shutdown.is_cancelled() {
                        break;
                    }
                    retry = retry.saturating_add(1);
                    let delay = backoff_delay(retry, self.config.max_backoff);
                    debug!("reconnecting in {delay:?} (attempt {retry}): {reason}");
                    tokio::select! {
                        () = self.shutdown.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        info!("receiver stopped");
    }
}

/// Linear backoff: `attempt` seconds, capped at `max_backoff`.
fn backoff_delay(attempt: u32, max_backoff: Duration) -> Duration {
    cmp::min(Duration::from_secs(u64::from(attempt)), max_backoff)
}
