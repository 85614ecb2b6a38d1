//! Shared utilities for integration tests.
//!
//! Provides a plain-TCP [`Connector`] pointed at an in-process scripted
//! endpoint, plus helpers for speaking the MCS wire format from the server
//! side. These helpers reduce duplication across test modules.
#![allow(dead_code, reason = "helpers are shared across independent test binaries")]

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use prost::Message;
use pushframe::{
    Connector, Credentials, Event, EventStream, PushReceiver, ReceiverConfig, ReceiverHandle,
    SessionStream,
    codec::{self, MCS_VERSION},
    proto, registry,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
    time::timeout,
};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Default credential pair used by the scenarios.
pub fn test_credentials() -> Credentials {
    Credentials::new("1", "2")
}

/// Receiver configuration with timings scaled down for tests.
pub fn test_config() -> ReceiverConfig {
    ReceiverConfig::default()
        .read_timeout(Duration::from_secs(5))
        .heartbeat_interval(Duration::from_secs(60))
}

/// Connector that dials the scripted endpoint without TLS.
pub struct PlainConnector {
    addr: SocketAddr,
}

impl PlainConnector {
    pub fn new(addr: SocketAddr) -> Arc<Self> {
        Arc::new(Self { addr })
    }
}

#[async_trait]
impl Connector for PlainConnector {
    async fn connect(&self, _host: &str, _port: u16) -> io::Result<Box<dyn SessionStream>> {
        Ok(Box::new(TcpStream::connect(self.addr).await?))
    }
}

/// Bind a scripted endpoint on an ephemeral local port.
pub async fn scripted_endpoint() -> TestResult<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    Ok((listener, addr))
}

/// Start a receiver wired to `addr` and return its control surfaces.
pub fn spawn_receiver(
    addr: SocketAddr,
    persistent_ids: Vec<String>,
    config: ReceiverConfig,
) -> (ReceiverHandle, EventStream, JoinHandle<()>) {
    let (receiver, events) = PushReceiver::with_connector(
        test_credentials(),
        persistent_ids,
        config,
        PlainConnector::new(addr),
    );
    let handle = receiver.handle();
    let task = tokio::spawn(receiver.run());
    (handle, events, task)
}

/// Read and decode the client's versioned login frame, asserting the exact
/// leading bytes of the wire contract.
pub async fn read_login(stream: &mut TcpStream) -> TestResult<proto::LoginRequest> {
    let version = stream.read_u8().await?;
    assert_eq!(version, MCS_VERSION, "first byte must be the protocol version");
    let tag = stream.read_u8().await?;
    assert_eq!(tag, registry::LOGIN_REQUEST_TAG, "second byte must be the login tag");
    let size = codec::read_varint(stream).await?;
    let mut body = vec![0u8; size as usize];
    stream.read_exact(&mut body).await?;
    Ok(proto::LoginRequest::decode(&body[..])?)
}

/// Write one tagged frame to the client.
pub async fn send_frame<M: Message>(stream: &mut TcpStream, tag: u8, message: &M) -> TestResult {
    let frame = codec::encode_frame(tag, &message.encode_to_vec());
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Accept a connection, consume the login frame and answer it, completing
/// the handshake.
pub async fn accept_and_handshake(
    listener: &TcpListener,
) -> TestResult<(TcpStream, proto::LoginRequest)> {
    let (mut stream, _) = listener.accept().await?;
    let login = read_login(&mut stream).await?;
    send_frame(
        &mut stream,
        registry::LOGIN_RESPONSE_TAG,
        &proto::LoginResponse::default(),
    )
    .await?;
    Ok((stream, login))
}

/// Build a data message stanza with the given id and app data entries.
pub fn data_stanza(persistent_id: &str, entries: &[(&str, &str)]) -> proto::DataMessageStanza {
    proto::DataMessageStanza {
        from: Some("test-sender".to_owned()),
        category: Some("com.example.app".to_owned()),
        persistent_id: Some(persistent_id.to_owned()),
        app_data: entries
            .iter()
            .map(|(key, value)| proto::AppData {
                key: Some((*key).to_owned()),
                value: Some((*value).to_owned()),
            })
            .collect(),
        raw_data: Some(vec![0xde, 0xad, 0xbe, 0xef]),
        ..Default::default()
    }
}

/// Await the next event, failing the test if none arrives in `wait`.
pub async fn next_event(events: &mut EventStream, wait: Duration) -> Event {
    timeout(wait, events.next())
        .await
        .expect("timed out waiting for event")
        .expect("event stream ended unexpectedly")
}

/// Await the next event, expecting it to be `Event::Connect`.
pub async fn expect_connect(events: &mut EventStream) {
    assert_eq!(next_event(events, Duration::from_secs(2)).await, Event::Connect);
}

/// Assert that no event arrives within `quiet`.
pub async fn expect_silence(events: &mut EventStream, quiet: Duration) {
    if let Ok(event) = timeout(quiet, events.next()).await {
        panic!("expected silence, got {event:?}");
    }
}
