//! One MCS connection from dial to teardown.
//!
//! A [`Session`] owns a single TLS connection for its whole life: it dials
//! through the connector, writes the versioned login frame, then splits the
//! stream into a read loop (driven here) and a heartbeat ticker (a spawned
//! task). All socket writes from either side pass through one async mutex,
//! so pings and acks never interleave on the wire.
//!
//! A session never retries. Whatever ends it, it closes the transport,
//! emits `Disconnect` exactly once if `Connect` was emitted, and returns a
//! [`TerminationReason`] for the supervisor to act on.

use std::{
    io,
    ops::ControlFlow,
    sync::Arc,
    time::{Duration, SystemTime},
};

use bytes::BytesMut;
use log::{debug, info, warn};
use prost::Message;
use tokio::{
    io::{AsyncWriteExt, BufReader, ReadHalf, WriteHalf, split},
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

use crate::{
    codec::{encode_frame, encode_versioned_frame},
    config::ReceiverConfig,
    credentials::{CredentialError, Credentials},
    dedup::DedupStore,
    error::ErrorReason,
    event::{Event, EventBus, PushMessage},
    parser::{McsMessage, StreamParser},
    proto,
    registry::{HEARTBEAT_ACK_TAG, HEARTBEAT_PING_TAG, LOGIN_REQUEST_TAG, Payload},
    transport::{Connector, SessionStream},
};

/// Client identity string sent in the login request, kept in lockstep with
/// the Chrome build the MCS endpoint expects.
const CLIENT_ID: &str = "chrome-63.0.3234.0";

/// Authentication domain for the login request.
const MCS_DOMAIN: &str = "mcs.android.com";

/// Lifecycle phase of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Connecting,
    HandshakePending,
    Established,
    Draining,
    Closed,
}

/// Why a session ended.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TerminationReason {
    /// `shutdown()` was requested; the supervisor must not reconnect.
    ShutdownRequested,
    /// Unrecoverable configuration error; the supervisor must not retry.
    Fatal(ErrorReason),
    /// The connection died; the supervisor reconnects with backoff.
    ConnectionLost(ErrorReason),
}

type SharedWriter = Arc<Mutex<WriteHalf<Box<dyn SessionStream>>>>;

/// A single connection attempt plus its read and heartbeat duties.
pub(crate) struct Session {
    credentials: Arc<Credentials>,
    config: Arc<ReceiverConfig>,
    connector: Arc<dyn Connector>,
    dedup: Arc<DedupStore>,
    bus: EventBus,
    shutdown: CancellationToken,
    phase: SessionPhase,
    connected: bool,
    frames_handled: u64,
}

impl Session {
    pub(crate) fn new(
        credentials: Arc<Credentials>,
        config: Arc<ReceiverConfig>,
        connector: Arc<dyn Connector>,
        dedup: Arc<DedupStore>,
        bus: EventBus,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            credentials,
            config,
            connector,
            dedup,
            bus,
            shutdown,
            phase: SessionPhase::Idle,
            connected: false,
            frames_handled: 0,
        }
    }

    /// Whether this session reached `Established` at any point.
    pub(crate) fn reached_established(&self) -> bool {
        self.connected
    }

    fn transition(&mut self, next: SessionPhase) {
        debug!("session phase: {:?} -> {next:?}", self.phase);
        self.phase = next;
    }

    /// Drive the session to termination.
    ///
    /// `replay` is the dedup snapshot sent to the server as
    /// `received_persistent_id`, authorising it to drop those messages from
    /// its replay queue.
    pub(crate) async fn run(&mut self, replay: Vec<String>) -> TerminationReason {
        let login_frame = match self.login_frame(replay) {
            Ok(frame) => frame,
            Err(err) => {
                let reason = ErrorReason::BadCredentials(err);
                self.bus.emit(Event::Error(reason.clone())).await;
                return TerminationReason::Fatal(reason);
            }
        };

        self.transition(SessionPhase::Connecting);
        let host = self.config.mcs_host.clone();
        let port = self.config.mcs_port;
        debug!("dialing mcs endpoint {host}:{port}");
        let stream = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return TerminationReason::ShutdownRequested,
            result = self.connector.connect(&host, port) => match result {
                Ok(stream) => stream,
                Err(err) => {
                    let reason = ErrorReason::ConnectFailed(err.to_string());
                    self.bus.emit(Event::Error(reason.clone())).await;
                    return TerminationReason::ConnectionLost(reason);
                }
            },
        };

        let (read_half, write_half) = split(stream);
        let writer: SharedWriter = Arc::new(Mutex::new(write_half));

        if let Err(err) = write_frame(&writer, &login_frame).await {
            let reason = ErrorReason::WriteFailed(err.to_string());
            self.bus.emit(Event::Error(reason.clone())).await;
            close_writer(&writer).await;
            self.transition(SessionPhase::Closed);
            return TerminationReason::ConnectionLost(reason);
        }
        self.transition(SessionPhase::HandshakePending);
        debug!("login request sent; awaiting login response");

        let reason = self.read_loop(read_half, &writer).await;

        self.transition(SessionPhase::Draining);
        close_writer(&writer).await;
        if self.connected {
            self.bus.emit(Event::Disconnect).await;
        }
        self.transition(SessionPhase::Closed);
        info!("session closed: reason={reason:?}, connected={}", self.connected);
        reason
    }

    async fn read_loop(
        &mut self,
        read_half: ReadHalf<Box<dyn SessionStream>>,
        writer: &SharedWriter,
    ) -> TerminationReason {
        let mut parser = StreamParser::new(BufReader::new(read_half));
        // Write failures on the heartbeat path surface here so the read
        // loop owns every exit.
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<ErrorReason>(1);
        let shutdown = self.shutdown.clone();
        let ticker_stop = shutdown.child_token();
        let read_timeout = self.config.read_timeout;
        let mut heartbeat: Option<JoinHandle<()>> = None;

        let reason = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break TerminationReason::ShutdownRequested,
                Some(reason) = fatal_rx.recv() => {
                    break TerminationReason::ConnectionLost(reason);
                }
                next = timeout(read_timeout, parser.next()) => match next {
                    Err(_) => {
                        warn!("no frame within {read_timeout:?}; treating connection as dead");
                        let reason = ErrorReason::ReadTimeout;
                        self.bus.emit(Event::Error(reason.clone())).await;
                        break TerminationReason::ConnectionLost(reason);
                    }
                    Ok(Err(parse_err)) => {
                        let reason = ErrorReason::from(parse_err);
                        self.bus.emit(Event::Error(reason.clone())).await;
                        break TerminationReason::ConnectionLost(reason);
                    }
                    Ok(Ok(message)) => {
                        match self
                            .dispatch(message, writer, &ticker_stop, &mut heartbeat, &fatal_tx)
                            .await
                        {
                            ControlFlow::Continue(()) => {}
                            ControlFlow::Break(reason) => break reason,
                        }
                    }
                },
            }
        };

        ticker_stop.cancel();
        if let Some(task) = heartbeat {
            let _ = task.await;
        }
        reason
    }

    async fn dispatch(
        &mut self,
        message: McsMessage,
        writer: &SharedWriter,
        ticker_stop: &CancellationToken,
        heartbeat: &mut Option<JoinHandle<()>>,
        fatal_tx: &mpsc::Sender<ErrorReason>,
    ) -> ControlFlow<TerminationReason> {
        self.frames_handled += 1;
        if self.config.debug_log {
            debug!(
                "received frame #{count}: tag={tag}",
                count = self.frames_handled,
                tag = message.tag
            );
        }
        match message.payload {
            Payload::LoginResponse(response) => {
                self.on_login_response(*response, writer, ticker_stop, heartbeat, fatal_tx)
                    .await;
                ControlFlow::Continue(())
            }
            Payload::DataMessageStanza(stanza) => {
                self.on_data_message(&stanza).await;
                ControlFlow::Continue(())
            }
            Payload::HeartbeatPing(_) => self.on_heartbeat_ping(writer).await,
            Payload::HeartbeatAck(_) => {
                // The server only acks pings we send from the ticker; an
                // unsolicited ack is harmless noise.
                debug!("heartbeat ack from server (unexpected in this role)");
                ControlFlow::Continue(())
            }
            Payload::Close(_) => {
                let reason = ErrorReason::ServerClose;
                self.bus.emit(Event::Error(reason.clone())).await;
                ControlFlow::Break(TerminationReason::ConnectionLost(reason))
            }
            Payload::StreamErrorStanza(stanza) => {
                let reason = ErrorReason::StreamError {
                    error_type: stanza.error_type.unwrap_or_default(),
                    text: stanza.text.unwrap_or_default(),
                };
                self.bus.emit(Event::Error(reason.clone())).await;
                ControlFlow::Break(TerminationReason::ConnectionLost(reason))
            }
            Payload::IqStanza(_) => {
                debug!("iq stanza ignored");
                ControlFlow::Continue(())
            }
            Payload::LoginRequest(_) => {
                debug!("login request from server ignored");
                ControlFlow::Continue(())
            }
            Payload::Reserved { tag, .. } => {
                debug!("reserved tag {tag} ignored");
                ControlFlow::Continue(())
            }
        }
    }

    async fn on_login_response(
        &mut self,
        response: proto::LoginResponse,
        writer: &SharedWriter,
        ticker_stop: &CancellationToken,
        heartbeat: &mut Option<JoinHandle<()>>,
        fatal_tx: &mpsc::Sender<ErrorReason>,
    ) {
        if self.connected {
            debug!("repeated login response ignored");
            return;
        }
        if let Some(error) = &response.error {
            warn!(
                "login response carries error: code={:?}, message={:?}",
                error.code, error.message
            );
        }
        self.transition(SessionPhase::Established);
        self.connected = true;
        info!("mcs handshake complete: jid={:?}", response.jid);
        // The ticker starts now, so the first client ping goes out one full
        // interval after establishment.
        *heartbeat = Some(spawn_heartbeat(
            Arc::clone(writer),
            self.bus.clone(),
            self.config.heartbeat_interval,
            ticker_stop.clone(),
            fatal_tx.clone(),
            self.config.debug_log,
        ));
        self.bus.emit(Event::Connect).await;
    }

    async fn on_data_message(&self, stanza: &proto::DataMessageStanza) {
        let message = PushMessage::from(stanza);
        if !self.dedup.observe(&message.persistent_id) {
            debug!(
                "duplicate message dropped: persistent_id={}",
                message.persistent_id
            );
            return;
        }
        if self.config.debug_log {
            debug!(
                "data message: persistent_id={}, from={}, category={}, encrypted={}",
                message.persistent_id,
                message.from,
                message.category,
                message.is_encrypted()
            );
        }
        let event = if message.is_encrypted() {
            Event::NotificationReceived(message)
        } else {
            Event::DataReceived(message)
        };
        self.bus.emit(event).await;
    }

    async fn on_heartbeat_ping(&self, writer: &SharedWriter) -> ControlFlow<TerminationReason> {
        self.bus.emit(Event::HeartbeatPing(SystemTime::now())).await;
        let ack = encode_frame(
            HEARTBEAT_ACK_TAG,
            &proto::HeartbeatAck::default().encode_to_vec(),
        );
        match write_frame(writer, &ack).await {
            Ok(()) => {
                if self.config.debug_log {
                    debug!("heartbeat ack sent");
                }
                self.bus.emit(Event::HeartbeatAck(SystemTime::now())).await;
                ControlFlow::Continue(())
            }
            Err(err) => {
                let reason = ErrorReason::WriteFailed(err.to_string());
                self.bus.emit(Event::Error(reason.clone())).await;
                ControlFlow::Break(TerminationReason::ConnectionLost(reason))
            }
        }
    }

    fn login_frame(&self, replay: Vec<String>) -> Result<BytesMut, CredentialError> {
        self.credentials.validate()?;
        let android_id = self.credentials.android_id().to_owned();
        let request = proto::LoginRequest {
            id: Some(CLIENT_ID.to_owned()),
            domain: Some(MCS_DOMAIN.to_owned()),
            user: Some(android_id.clone()),
            resource: Some(android_id),
            auth_token: Some(self.credentials.security_token().to_owned()),
            device_id: Some(self.credentials.device_id()?),
            setting: vec![proto::Setting {
                name: Some("new_vc".to_owned()),
                value: Some("1".to_owned()),
            }],
            received_persistent_id: replay,
            adaptive_heartbeat: Some(false),
            use_rmq2: Some(true),
            auth_service: Some(proto::AuthService::AndroidId as i32),
            network_type: Some(1),
            ..Default::default()
        };
        Ok(encode_versioned_frame(
            LOGIN_REQUEST_TAG,
            &request.encode_to_vec(),
        ))
    }
}

/// Write one frame under the shared write lock, flushing before release.
async fn write_frame(writer: &SharedWriter, bytes: &[u8]) -> io::Result<()> {
    let mut guard = writer.lock().await;
    guard.write_all(bytes).await?;
    guard.flush().await
}

async fn close_writer(writer: &SharedWriter) {
    let mut guard = writer.lock().await;
    if let Err(err) = guard.shutdown().await {
        debug!("transport close: {err}");
    }
}

/// Periodic client-originated keepalive pings.
///
/// Runs only while the session is established; a failed ping write is
/// reported on `fatal_tx` and ends the ticker, leaving the exit decision to
/// the read loop.
fn spawn_heartbeat(
    writer: SharedWriter,
    bus: EventBus,
    interval: Duration,
    stop: CancellationToken,
    fatal_tx: mpsc::Sender<ErrorReason>,
    debug_log: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let ping = encode_frame(
            HEARTBEAT_PING_TAG,
            &proto::HeartbeatPing::default().encode_to_vec(),
        );
        loop {
            tokio::select! {
                () = stop.cancelled() => return,
                () = tokio::time::sleep(interval) => {}
            }
            match write_frame(&writer, &ping).await {
                Ok(()) => {
                    if debug_log {
                        debug!("heartbeat ping sent");
                    }
                }
                Err(err) => {
                    let reason = ErrorReason::WriteFailed(err.to_string());
                    bus.emit(Event::Error(reason.clone())).await;
                    let _ = fatal_tx.send(reason).await;
                    return;
                }
            }
        }
    })
}
