//! Board registry
//!
//! The bootstrap node keeps a list of every board announced by the
//! super-peers of the network. Searching peers keep the latest list the
//! bootstrap sent them. Both sit behind `BoardRegistry` so the node does
//! not care where the records live.

pub mod json_file;
pub mod memory;

pub use json_file::JsonFileRegistry;
pub use memory::MemoryRegistry;

use crate::error::Result;
use crate::protocol::BoardRecord;
use chrono::Utc;
use uuid::Uuid;

pub const ACTIVE_STATUS: &str = "active";

pub trait BoardRegistry: Send + Sync {
    /// Record a board announced by a super-peer
    fn register_board(&self, record: BoardRecord) -> Result<()>;

    /// Remove every record of `board_title` owned by `peer_id`; false when none matched
    fn unregister_board(&self, peer_id: Uuid, board_title: &str) -> Result<bool>;

    fn list_boards(&self) -> Result<Vec<BoardRecord>>;

    /// Replace the board list last received from the bootstrap
    fn store_received_boards(&self, boards: &[BoardRecord]) -> Result<()>;
}

/// Stamp a freshly registered record
fn activate(mut record: BoardRecord) -> BoardRecord {
    record.created_at = Some(Utc::now());
    record.status = Some(ACTIVE_STATUS.to_string());
    record
}
