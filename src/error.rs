//! Error taxonomy surfaced to embedders.

use crate::{credentials::CredentialError, parser::ParseError};

/// Why a session failed, carried by [`crate::Event::Error`].
///
/// Reasons are plain values: I/O sources are flattened to their display
/// strings so events can be cloned and handed across tasks without
/// borrowing session state.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ErrorReason {
    /// A credential string failed numeric validation. Fatal: the
    /// supervisor does not reconnect.
    #[error("bad credentials: {0}")]
    BadCredentials(#[from] CredentialError),
    /// Dialing or TLS establishment failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    /// The read path failed at the transport level.
    #[error("read failed: {0}")]
    Read(String),
    /// No frame arrived within the configured read deadline.
    #[error("read timeout: connection presumed dead")]
    ReadTimeout,
    /// A write to the transport failed.
    #[error("write failed: {0}")]
    WriteFailed(String),
    /// The connection did not open with a recognised protocol version.
    #[error("unexpected mcs version: {0}")]
    UnexpectedVersion(u8),
    /// A frame size varint was malformed.
    #[error("malformed varint in stream")]
    MalformedVarint,
    /// A frame carried a tag outside the protocol's closed set.
    #[error("unknown message tag: {0}")]
    UnknownTag(u8),
    /// A frame body failed protobuf decoding.
    #[error("malformed message body: {0}")]
    MalformedBody(String),
    /// The server sent a `Close` frame.
    #[error("server closed the stream")]
    ServerClose,
    /// The server sent a `StreamErrorStanza`.
    #[error("stream error from server: {error_type}: {text}")]
    StreamError { error_type: String, text: String },
}

impl From<ParseError> for ErrorReason {
    fn from(value: ParseError) -> Self {
        match value {
            ParseError::Io(err) => ErrorReason::Read(err.to_string()),
            ParseError::MalformedVarint => ErrorReason::MalformedVarint,
            ParseError::UnexpectedVersion(version) => ErrorReason::UnexpectedVersion(version),
            ParseError::UnknownTag(tag) => ErrorReason::UnknownTag(tag),
            ParseError::MalformedBody(err) => ErrorReason::MalformedBody(err.to_string()),
        }
    }
}

impl ErrorReason {
    /// Whether the supervisor should give up instead of reconnecting.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorReason::BadCredentials(_))
    }
}
