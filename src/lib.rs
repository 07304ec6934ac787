//! # Peernote - My Peer-to-Peer Bulletin Board Overlay
//!
//! This is the overlay network behind my distributed bulletin board. There
//! is no central server: nodes find each other, gossip, and flood searches
//! to locate the boards they care about.
//! When I come back to this code, here's what I need to remember:
//!
//! ## What I Built
//! - **Wire Protocol**: JSON envelopes behind a 4-byte big-endian length prefix
//! - **Super-peers**: Nodes that own a board and aggregate card announcements
//! - **Gossip**: GET_PEERS/PEER_LIST crawl to learn other super-peers
//! - **Flooding Search**: TTL-bounded PING flood, deduplicated by ping id, PONGs straight to the origin
//! - **Soft State**: Card references expire unless their holder keeps announcing them
//! - **Bootstrap Registry**: The well-known entry node keeps a list of every board
//!
//! ## How I Organized My Code
//! - `protocol/`: Message types, typed payloads and the framing codec
//! - `board/`: Boards, card references and the local content store
//! - `network/`: The node, connection handling, peer directory and search routing
//! - `registry/`: Where the bootstrap keeps its board list (JSON files or memory)
//! - `config/`: Node settings from TOML and the environment
//! - `utils/`: Socket helpers and local address discovery
//! - `cli/`: Command-line interface for running and querying nodes
//!
//! ## Key Design Decisions I Made
//! - One thread per connection, capped by a limiter so a flood can't exhaust the node
//! - Every outbound request opens its own short-lived connection with timeouts
//! - Shared maps are copied under the lock before I iterate them
//! - A maintenance thread sweeps stale card references and old search routes
//!
//! ## When I Need to Understand Something
//! 1. Start with `main.rs` to see the CLI commands
//! 2. Look at `network/node.rs` for the outbound operations
//! 3. Check `network/handler.rs` for how each message type is answered
//! 4. Review `protocol/codec.rs` for the wire format

pub mod board;
pub mod cli;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod registry;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use board::{Board, CardRef, Comment, ContentStore, DEFAULT_BOARD, MAX_CONTENT_LEN};
pub use cli::{Command, Opt};
pub use config::Config;
pub use error::{OverlayError, Result};
pub use network::{
    ConnectionHandler, ContentReply, Node, PeerDirectory, PeerRecord, PongInfo, ResolvedCard,
    RoutingTable, SearchCollector,
};
pub use protocol::{Envelope, MessageType, NodeIdentity};
pub use registry::{BoardRegistry, JsonFileRegistry, MemoryRegistry};
pub use utils::local_ip;
