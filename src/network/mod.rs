//! Peer-to-peer overlay networking
//!
//! Connection handling, the peer directory, search routing state and the
//! `Node` that ties them together. Every connection is served by its own
//! thread, capped by `ConnectionLimiter`.

pub mod connection_limiter;
pub mod handler;
pub mod node;
pub mod peer_directory;
pub mod routing;

pub use connection_limiter::{ConnectionLimiter, ConnectionPermit};
pub use handler::ConnectionHandler;
pub use node::{ContentReply, Node, ResolvedCard};
pub use peer_directory::{PeerDirectory, PeerRecord};
pub use routing::{PongInfo, RoutingTable, SearchCollector};
