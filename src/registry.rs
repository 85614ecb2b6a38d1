//! Tag table mapping MCS frame tags to protobuf payload types.
//!
//! The tag space is closed: tags 0–15 are known to the protocol, of which
//! this client materialises the eight it can receive or send. The remaining
//! known tags decode to [`Payload::Reserved`] so a stream carrying them
//! still parses; anything at or past [`NUM_PROTO_TYPES`] is a protocol
//! violation and terminates the session.

use bytes::Bytes;
use prost::Message;

use crate::proto;

pub const HEARTBEAT_PING_TAG: u8 = 0;
pub const HEARTBEAT_ACK_TAG: u8 = 1;
pub const LOGIN_REQUEST_TAG: u8 = 2;
pub const LOGIN_RESPONSE_TAG: u8 = 3;
pub const CLOSE_TAG: u8 = 4;
pub const IQ_STANZA_TAG: u8 = 7;
pub const DATA_MESSAGE_STANZA_TAG: u8 = 8;
pub const STREAM_ERROR_STANZA_TAG: u8 = 10;

/// One past the highest tag the protocol defines.
pub const NUM_PROTO_TYPES: u8 = 16;

/// Errors from tag-driven payload decoding.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The tag is outside the protocol's closed tag set.
    #[error("unknown message tag: {0}")]
    UnknownTag(u8),
    /// The body bytes do not decode as the tag's protobuf type.
    #[error("malformed message body for tag {tag}: {source}")]
    MalformedBody {
        tag: u8,
        #[source]
        source: prost::DecodeError,
    },
}

/// Decoded payload of one MCS frame, one variant per wire type.
///
/// Stanza-sized messages are boxed so the enum stays small for the
/// heartbeat-dominated steady state.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    HeartbeatPing(proto::HeartbeatPing),
    HeartbeatAck(proto::HeartbeatAck),
    LoginRequest(Box<proto::LoginRequest>),
    LoginResponse(Box<proto::LoginResponse>),
    Close(proto::Close),
    IqStanza(Box<proto::IqStanza>),
    DataMessageStanza(Box<proto::DataMessageStanza>),
    StreamErrorStanza(proto::StreamErrorStanza),
    /// A tag the protocol reserves (5, 6, 9, 11–15); carried undecoded.
    Reserved { tag: u8, body: Bytes },
}

impl Payload {
    /// Wire tag this payload travels under.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Payload::HeartbeatPing(_) => HEARTBEAT_PING_TAG,
            Payload::HeartbeatAck(_) => HEARTBEAT_ACK_TAG,
            Payload::LoginRequest(_) => LOGIN_REQUEST_TAG,
            Payload::LoginResponse(_) => LOGIN_RESPONSE_TAG,
            Payload::Close(_) => CLOSE_TAG,
            Payload::IqStanza(_) => IQ_STANZA_TAG,
            Payload::DataMessageStanza(_) => DATA_MESSAGE_STANZA_TAG,
            Payload::StreamErrorStanza(_) => STREAM_ERROR_STANZA_TAG,
            Payload::Reserved { tag, .. } => *tag,
        }
    }
}

fn decode_as<M>(tag: u8, body: &[u8]) -> Result<M, RegistryError>
where
    M: Message + Default,
{
    M::decode(body).map_err(|source| RegistryError::MalformedBody { tag, source })
}

/// Decode `body` as the protobuf type registered for `tag`.
///
/// # Errors
///
/// Returns [`RegistryError::UnknownTag`] for tags outside the protocol's
/// tag set and [`RegistryError::MalformedBody`] when the bytes do not parse
/// as the registered type.
pub fn decode(tag: u8, body: &[u8]) -> Result<Payload, RegistryError> {
    match tag {
        HEARTBEAT_PING_TAG => Ok(Payload::HeartbeatPing(decode_as(tag, body)?)),
        HEARTBEAT_ACK_TAG => Ok(Payload::HeartbeatAck(decode_as(tag, body)?)),
        LOGIN_REQUEST_TAG => Ok(Payload::LoginRequest(Box::new(decode_as(tag, body)?))),
        LOGIN_RESPONSE_TAG => Ok(Payload::LoginResponse(Box::new(decode_as(tag, body)?))),
        CLOSE_TAG => Ok(Payload::Close(decode_as(tag, body)?)),
        IQ_STANZA_TAG => Ok(Payload::IqStanza(Box::new(decode_as(tag, body)?))),
        DATA_MESSAGE_STANZA_TAG => {
            Ok(Payload::DataMessageStanza(Box::new(decode_as(tag, body)?)))
        }
        STREAM_ERROR_STANZA_TAG => Ok(Payload::StreamErrorStanza(decode_as(tag, body)?)),
        tag if tag < NUM_PROTO_TYPES => Ok(Payload::Reserved {
            tag,
            body: Bytes::copy_from_slice(body),
        }),
        tag => Err(RegistryError::UnknownTag(tag)),
    }
}

/// Produce the default-initialised payload for a zero-size frame.
///
/// Heartbeats in particular are normally empty on the wire.
///
/// # Errors
///
/// Returns [`RegistryError::UnknownTag`] for tags outside the protocol's
/// tag set.
pub fn empty(tag: u8) -> Result<Payload, RegistryError> {
    decode(tag, &[])
}
