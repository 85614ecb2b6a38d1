//! Public API for the `pushframe` library.
//!
//! `pushframe` is a long-lived receiver for FCM push notifications over the
//! MCS binary protocol. Given an `(androidId, securityToken)` pair from
//! device provisioning, it keeps a TLS connection to the MCS endpoint,
//! performs the length-prefixed protobuf handshake, and demultiplexes the
//! server's message stream into typed [`Event`]s: data messages, encrypted
//! notifications, heartbeats and errors. Duplicate messages are suppressed
//! across reconnects and the connection is re-established automatically
//! with linear-capped backoff.
//!
//! ```no_run
//! use pushframe::{Credentials, Event, PushReceiver, ReceiverConfig};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let credentials = Credentials::new("4565897234657821", "7423465982304652345");
//! let (receiver, mut events) =
//!     PushReceiver::new(credentials, Vec::new(), ReceiverConfig::default());
//! let handle = receiver.handle();
//! tokio::spawn(receiver.run());
//!
//! while let Some(event) = events.next().await {
//!     match event {
//!         Event::DataReceived(message) => println!("data from {}", message.from),
//!         Event::NotificationReceived(message) => {
//!             println!("encrypted notification, {} bytes", message.raw_data.len());
//!         }
//!         other => println!("{}", other.kind()),
//!     }
//! }
//! # handle.shutdown();
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod credentials;
pub mod dedup;
pub mod error;
pub mod event;
pub mod parser;
pub mod proto;
pub mod registry;
mod receiver;
mod session;
pub mod transport;

pub use config::ReceiverConfig;
pub use credentials::{CredentialError, Credentials};
pub use dedup::DedupStore;
pub use error::ErrorReason;
pub use event::{Event, EventStream, PushMessage};
pub use parser::{McsMessage, ParseError, ParserState, StreamParser};
pub use receiver::{PushReceiver, ReceiverHandle};
pub use registry::Payload;
pub use transport::{Connector, SessionStream, TlsConnector};
