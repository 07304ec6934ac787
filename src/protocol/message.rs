use crate::error::{OverlayError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// `type` value of a data request asking for card references
pub const META_REQUEST: &str = "meta";
/// `type` value of a data request asking for card content
pub const CONTENT_REQUEST: &str = "content";
/// `type` value of a DATA_UPDATE entry announcing a card
pub const CARD_ENTRY_KIND: &str = "card";

/// Registry acknowledgement statuses
pub const STATUS_REGISTERED: &str = "registered";
pub const STATUS_UNREGISTERED: &str = "unregistered";
pub const STATUS_NOT_FOUND: &str = "not_found";
pub const STATUS_IGNORED: &str = "ignored";

/// Message types understood by the overlay
///
/// Tags travel as lowercase strings. Any tag not listed here decodes to
/// `Unknown`, which the connection loop treats like `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    Connect,
    ConnectResponse,
    GetPeers,
    PeerList,
    Ping,
    Pong,
    DataRequest,
    DataPeerRequest,
    DataResponse,
    DataUpdate,
    BoardRegister,
    BoardRegisterResponse,
    BoardUnregister,
    BoardUnregisterResponse,
    Close,
    Error,
    Unknown,
}

impl MessageType {
    pub fn as_tag(&self) -> &'static str {
        match self {
            MessageType::Connect => "connect",
            MessageType::ConnectResponse => "connect_response",
            MessageType::GetPeers => "get_peers",
            MessageType::PeerList => "peer_list",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::DataRequest => "data_request",
            MessageType::DataPeerRequest => "data_peer_request",
            MessageType::DataResponse => "data_response",
            MessageType::DataUpdate => "data_update",
            MessageType::BoardRegister => "board_register",
            MessageType::BoardRegisterResponse => "board_register_response",
            MessageType::BoardUnregister => "board_unregister",
            MessageType::BoardUnregisterResponse => "board_unregister_response",
            MessageType::Close => "close_connection",
            MessageType::Error => "error",
            MessageType::Unknown => "unknown",
        }
    }

    pub fn from_tag(tag: &str) -> MessageType {
        match tag {
            "connect" => MessageType::Connect,
            "connect_response" => MessageType::ConnectResponse,
            "get_peers" => MessageType::GetPeers,
            "peer_list" => MessageType::PeerList,
            "ping" => MessageType::Ping,
            "pong" => MessageType::Pong,
            "data_request" => MessageType::DataRequest,
            "data_peer_request" => MessageType::DataPeerRequest,
            "data_response" => MessageType::DataResponse,
            "data_update" => MessageType::DataUpdate,
            "board_register" => MessageType::BoardRegister,
            "board_register_response" => MessageType::BoardRegisterResponse,
            "board_unregister" => MessageType::BoardUnregister,
            "board_unregister_response" => MessageType::BoardUnregisterResponse,
            "close_connection" => MessageType::Close,
            "error" => MessageType::Error,
            _ => MessageType::Unknown,
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        MessageType::from_tag(&tag)
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        kind.as_tag().to_string()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Who a node is, as announced in every envelope it sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub node_id: Uuid,
    pub host: String,
    pub port: u16,
    pub is_super_peer: bool,
    pub is_bootstrap: bool,
}

/// The frame body exchanged between peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub node_id: Uuid,
    pub host: String,
    pub port: u16,
    #[serde(rename = "super", default)]
    pub is_super: bool,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Build an envelope stamped with the sender's identity and the current time
    pub fn new<P: Serialize>(kind: MessageType, sender: &NodeIdentity, payload: &P) -> Result<Self> {
        let payload = serde_json::to_value(payload).map_err(|e| {
            OverlayError::Serialization(format!("Failed to serialize {kind} payload: {e}"))
        })?;
        Ok(Envelope {
            kind,
            node_id: sender.node_id,
            host: sender.host.clone(),
            port: sender.port,
            is_super: sender.is_super_peer,
            timestamp: Utc::now().to_rfc3339(),
            payload,
        })
    }

    /// Interpret the payload as the structure its message type carries
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            OverlayError::MalformedMessage(format!("Invalid {} payload: {e}", self.kind))
        })
    }
}

/// CONNECT payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectPayload {
    pub node_id: Uuid,
    pub host: String,
    pub port: u16,
}

/// One entry of a PEER_LIST reply
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerEntry {
    pub node_id: Uuid,
    pub host: String,
    pub port: u16,
}

/// Flooded search query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingPayload {
    pub ping_id: Uuid,
    pub origin_id: Uuid,
    pub origin_host: String,
    pub origin_port: u16,
    pub ttl: u32,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
}

/// Search hit sent straight back to the PING's origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongPayload {
    pub ping_id: Uuid,
    pub title: String,
    pub board_id: Uuid,
    pub responder_id: Uuid,
    pub responder_host: String,
    pub responder_port: u16,
    #[serde(default)]
    pub boards: Vec<BoardRecord>,
}

/// DATA_REQUEST and DATA_PEER_REQUEST payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRequestPayload {
    #[serde(default)]
    pub board: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One entry of a DATA_UPDATE announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataUpdateEntry {
    #[serde(default)]
    pub board: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// `(origin_node_id, title, host, port, timestamp)` tuple of a meta reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry(
    pub Uuid,
    pub String,
    pub String,
    pub u16,
    pub DateTime<Utc>,
);

/// `(board, title, content)` tuple of a content reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry(pub String, pub String, pub String);

/// A board as recorded by the bootstrap registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardRecord {
    pub board_id: Uuid,
    pub peer_id: Uuid,
    pub board_title: String,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    pub peer_host: String,
    pub peer_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// BOARD_UNREGISTER payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnregisterPayload {
    pub peer_id: Uuid,
    pub board_title: String,
}

/// Acknowledgement payload for registry requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: String,
}

/// ERROR payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}
