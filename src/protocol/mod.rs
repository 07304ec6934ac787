//! Wire protocol
//!
//! Message envelopes, typed payloads for each message type and the
//! length-prefixed JSON framing used on every peer connection.

pub mod codec;
pub mod message;

pub use codec::{
    decode, encode, frame, read_frame, receive_envelope, send_envelope, write_frame,
    HEADER_SIZE, MAX_FRAME_SIZE,
};
pub use message::{
    BoardRecord, ConnectPayload, ContentEntry, DataRequestPayload, DataUpdateEntry, Envelope,
    ErrorPayload, MessageType, MetaEntry, NodeIdentity, PeerEntry, PingPayload, PongPayload,
    StatusPayload, UnregisterPayload, CARD_ENTRY_KIND, CONTENT_REQUEST, META_REQUEST,
    STATUS_IGNORED, STATUS_NOT_FOUND, STATUS_REGISTERED, STATUS_UNREGISTERED,
};
