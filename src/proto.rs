//! Protobuf messages of the MCS protocol.
//!
//! The message set mirrors the `mcs.proto` schema spoken by
//! `mtalk.google.com`. The structs are written by hand against `prost`
//! rather than generated, so the crate builds without a protoc step; field
//! numbers are therefore load-bearing and must not be renumbered.
//!
//! MCS is a proto2 schema in which every field the client touches is
//! optional on the wire, so fields are modelled as `Option` (or `Vec` for
//! repeated fields) throughout.

use prost::Message;

/// Authentication backend selector carried in [`LoginRequest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum AuthService {
    /// Authenticate with an android id / security token pair.
    AndroidId = 2,
}

/// A name/value pair passed in login requests and responses.
#[derive(Clone, PartialEq, Message)]
pub struct Setting {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

/// Client-side telemetry record; sent empty by this implementation.
#[derive(Clone, PartialEq, Message)]
pub struct ClientEvent {
    #[prost(enumeration = "client_event::Type", optional, tag = "1")]
    pub event_type: Option<i32>,
    #[prost(uint64, optional, tag = "100")]
    pub number_discarded_events: Option<u64>,
    #[prost(int32, optional, tag = "200")]
    pub network_type: Option<i32>,
}

pub mod client_event {
    /// Kinds of client telemetry events.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Unknown = 0,
        DiscardedEvents = 1,
        FailedConnection = 2,
        SuccessfulConnection = 3,
    }
}

/// Heartbeat interval negotiation block.
#[derive(Clone, PartialEq, Message)]
pub struct HeartbeatConfig {
    #[prost(bool, optional, tag = "1")]
    pub upload_stat: Option<bool>,
    #[prost(string, optional, tag = "2")]
    pub ip: Option<String>,
    #[prost(int32, optional, tag = "3")]
    pub interval_ms: Option<i32>,
}

/// Heartbeat statistics echoed back to the server when requested.
#[derive(Clone, PartialEq, Message)]
pub struct HeartbeatStat {
    #[prost(string, optional, tag = "1")]
    pub ip: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub timeout: Option<bool>,
    #[prost(int32, optional, tag = "3")]
    pub interval_ms: Option<i32>,
}

/// Server-originated keepalive probe (tag 0). Usually zero bytes on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct HeartbeatPing {
    #[prost(int32, optional, tag = "1")]
    pub stream_id: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub last_stream_id_received: Option<i32>,
    #[prost(int64, optional, tag = "3")]
    pub status: Option<i64>,
}

/// Acknowledgement for a heartbeat ping (tag 1).
#[derive(Clone, PartialEq, Message)]
pub struct HeartbeatAck {
    #[prost(int32, optional, tag = "1")]
    pub stream_id: Option<i32>,
    #[prost(int32, optional, tag = "2")]
    pub last_stream_id_received: Option<i32>,
    #[prost(int64, optional, tag = "3")]
    pub status: Option<i64>,
}

/// Handshake request (tag 2); the first and only versioned frame a client
/// sends on a fresh connection.
#[derive(Clone, PartialEq, Message)]
pub struct LoginRequest {
    #[prost(string, optional, tag = "1")]
    pub id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub domain: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub user: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub resource: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub auth_token: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub device_id: Option<String>,
    #[prost(int64, optional, tag = "7")]
    pub last_rmq_id: Option<i64>,
    #[prost(message, repeated, tag = "8")]
    pub setting: Vec<Setting>,
    /// Persistent ids of messages already delivered to the caller; the
    /// server drops these from its replay queue.
    #[prost(string, repeated, tag = "10")]
    pub received_persistent_id: Vec<String>,
    #[prost(bool, optional, tag = "12")]
    pub adaptive_heartbeat: Option<bool>,
    #[prost(message, optional, tag = "13")]
    pub heartbeat_stat: Option<HeartbeatStat>,
    #[prost(bool, optional, tag = "14")]
    pub use_rmq2: Option<bool>,
    #[prost(int64, optional, tag = "15")]
    pub account_id: Option<i64>,
    #[prost(enumeration = "AuthService", optional, tag = "16")]
    pub auth_service: Option<i32>,
    #[prost(int32, optional, tag = "17")]
    pub network_type: Option<i32>,
    #[prost(int64, optional, tag = "18")]
    pub status: Option<i64>,
    #[prost(message, repeated, tag = "22")]
    pub client_event: Vec<ClientEvent>,
}

/// Handshake response (tag 3); its receipt completes the handshake.
#[derive(Clone, PartialEq, Message)]
pub struct LoginResponse {
    #[prost(string, optional, tag = "1")]
    pub id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub jid: Option<String>,
    #[prost(message, optional, tag = "3")]
    pub error: Option<ErrorInfo>,
    #[prost(message, repeated, tag = "4")]
    pub setting: Vec<Setting>,
    #[prost(int32, optional, tag = "5")]
    pub stream_id: Option<i32>,
    #[prost(int32, optional, tag = "6")]
    pub last_stream_id_received: Option<i32>,
    #[prost(message, optional, tag = "7")]
    pub heartbeat_config: Option<HeartbeatConfig>,
    #[prost(int64, optional, tag = "8")]
    pub server_timestamp: Option<i64>,
}

/// Error detail embedded in login responses and iq stanzas.
#[derive(Clone, PartialEq, Message)]
pub struct ErrorInfo {
    #[prost(int32, optional, tag = "1")]
    pub code: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub message: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub error_type: Option<String>,
    #[prost(message, optional, tag = "4")]
    pub extension: Option<Extension>,
}

/// Opaque typed extension blob.
#[derive(Clone, PartialEq, Message)]
pub struct Extension {
    #[prost(int32, optional, tag = "1")]
    pub id: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub data: Option<Vec<u8>>,
}

/// Server-initiated connection teardown (tag 4). Always empty.
#[derive(Clone, PartialEq, Message)]
pub struct Close {}

/// Request/response stanza (tag 7). Parsed but not acted upon.
#[derive(Clone, PartialEq, Message)]
pub struct IqStanza {
    #[prost(int64, optional, tag = "1")]
    pub rmq_id: Option<i64>,
    #[prost(enumeration = "iq_stanza::IqType", optional, tag = "2")]
    pub iq_type: Option<i32>,
    #[prost(string, optional, tag = "3")]
    pub id: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub from: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub to: Option<String>,
    #[prost(message, optional, tag = "6")]
    pub error: Option<ErrorInfo>,
    #[prost(message, optional, tag = "7")]
    pub extension: Option<Extension>,
    #[prost(string, optional, tag = "8")]
    pub persistent_id: Option<String>,
    #[prost(int32, optional, tag = "9")]
    pub stream_id: Option<i32>,
    #[prost(int32, optional, tag = "10")]
    pub last_stream_id_received: Option<i32>,
    #[prost(int64, optional, tag = "11")]
    pub account_id: Option<i64>,
    #[prost(int64, optional, tag = "12")]
    pub status: Option<i64>,
}

pub mod iq_stanza {
    /// Iq stanza verb, mirroring XMPP semantics.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum IqType {
        Get = 0,
        Set = 1,
        Result = 2,
        Error = 3,
    }
}

/// A pushed application message (tag 8); the payload subscribers care about.
#[derive(Clone, PartialEq, Message)]
pub struct DataMessageStanza {
    #[prost(string, optional, tag = "2")]
    pub id: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub from: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub to: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub category: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub token: Option<String>,
    #[prost(message, repeated, tag = "7")]
    pub app_data: Vec<AppData>,
    #[prost(bool, optional, tag = "8")]
    pub from_trusted_server: Option<bool>,
    /// Server-assigned id used for duplicate suppression and replay
    /// acknowledgement.
    #[prost(string, optional, tag = "9")]
    pub persistent_id: Option<String>,
    #[prost(int32, optional, tag = "10")]
    pub stream_id: Option<i32>,
    #[prost(int32, optional, tag = "11")]
    pub last_stream_id_received: Option<i32>,
    #[prost(string, optional, tag = "13")]
    pub reg_id: Option<String>,
    #[prost(int64, optional, tag = "16")]
    pub device_user_id: Option<i64>,
    #[prost(int32, optional, tag = "17")]
    pub ttl: Option<i32>,
    #[prost(int64, optional, tag = "18")]
    pub sent: Option<i64>,
    #[prost(int32, optional, tag = "19")]
    pub queued: Option<i32>,
    #[prost(int64, optional, tag = "20")]
    pub status: Option<i64>,
    #[prost(bytes = "vec", optional, tag = "21")]
    pub raw_data: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "24")]
    pub immediate_ack: Option<bool>,
}

/// Application key/value metadata attached to a data message.
#[derive(Clone, PartialEq, Message)]
pub struct AppData {
    #[prost(string, optional, tag = "1")]
    pub key: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

/// Fatal stream-level error (tag 10); terminates the connection.
#[derive(Clone, PartialEq, Message)]
pub struct StreamErrorStanza {
    #[prost(string, optional, tag = "1")]
    pub error_type: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_message_round_trips_observed_fields() {
        let stanza = DataMessageStanza {
            from: Some("sender".into()),
            category: Some("com.example.app".into()),
            persistent_id: Some("p:1234".into()),
            app_data: vec![AppData {
                key: Some("crypto-key".into()),
                value: Some("dh=abc".into()),
            }],
            raw_data: Some(vec![1, 2, 3]),
            ..Default::default()
        };
        let bytes = stanza.encode_to_vec();
        let decoded = DataMessageStanza::decode(&bytes[..]).expect("decode");
        assert_eq!(decoded, stanza);
    }

    #[test]
    fn empty_login_response_decodes_to_default() {
        let decoded = LoginResponse::decode(&[][..]).expect("decode");
        assert_eq!(decoded, LoginResponse::default());
    }

    #[test]
    fn login_request_carries_replayed_ids_on_field_ten() {
        let request = LoginRequest {
            received_persistent_id: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        let bytes = request.encode_to_vec();
        // field 10, wire type 2 => key byte 0x52
        assert_eq!(bytes[0], 0x52);
        let decoded = LoginRequest::decode(&bytes[..]).expect("decode");
        assert_eq!(decoded.received_persistent_id, vec!["a", "b"]);
    }
}
