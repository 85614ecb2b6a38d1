//! Transport establishment for MCS sessions.
//!
//! Sessions dial through the [`Connector`] seam rather than opening sockets
//! themselves, so the protocol machinery can be exercised against an
//! in-process plain-TCP endpoint in tests while production traffic goes
//! through [`TlsConnector`].

use std::{io, sync::Arc, time::Duration};

use async_trait::async_trait;
use log::debug;
use socket2::{SockRef, TcpKeepalive};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpSocket, TcpStream, lookup_host},
    time::timeout,
};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, pki_types::ServerName};

/// Time allowed for DNS, TCP and TLS establishment combined.
const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP keepalive idle time; keeps NAT and firewall state warm between
/// application heartbeats.
const KEEPALIVE_TIME: Duration = Duration::from_secs(30);

/// Byte stream a session runs over.
pub trait SessionStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> SessionStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Dials the MCS endpoint on behalf of a session.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a duplex stream to `host:port`.
    async fn connect(&self, host: &str, port: u16) -> io::Result<Box<dyn SessionStream>>;
}

/// Production connector: TCP with keepalive, then TLS with SNI set to the
/// dialled host, verified against the bundled web PKI roots.
pub struct TlsConnector {
    tls: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Build a connector trusting the bundled web PKI roots.
    #[must_use]
    pub fn new() -> Self {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self {
            tls: tokio_rustls::TlsConnector::from(Arc::new(config)),
        }
    }

    async fn dial_tcp(host: &str, port: u16) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in lookup_host((host, port)).await? {
            let socket = if addr.is_ipv4() {
                TcpSocket::new_v4()?
            } else {
                TcpSocket::new_v6()?
            };
            socket.set_keepalive(true)?;
            let keepalive = TcpKeepalive::new().with_time(KEEPALIVE_TIME);
            SockRef::from(&socket).set_tcp_keepalive(&keepalive)?;

            match socket.connect(addr).await {
                Ok(stream) => {
                    debug!("tcp connected to {addr}");
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no addresses for {host}"))
        }))
    }
}

impl Default for TlsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TlsConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<Box<dyn SessionStream>> {
        let server_name = ServerName::try_from(host.to_owned())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

        let dial = async {
            let tcp = Self::dial_tcp(host, port).await?;
            let tls = self.tls.connect(server_name, tcp).await?;
            debug!("tls established with {host}:{port}");
            Ok::<_, io::Error>(tls)
        };

        let stream = timeout(DIAL_TIMEOUT, dial)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "dial timed out"))??;
        Ok(Box::new(stream))
    }
}
