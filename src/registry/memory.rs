use crate::error::{OverlayError, Result};
use crate::protocol::BoardRecord;
use crate::registry::{activate, BoardRegistry};
use std::sync::RwLock;
use uuid::Uuid;

/// Registry kept in process memory, for tests and throwaway nodes
#[derive(Default)]
pub struct MemoryRegistry {
    boards: RwLock<Vec<BoardRecord>>,
    received: RwLock<Vec<BoardRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> MemoryRegistry {
        MemoryRegistry::default()
    }

    pub fn received_boards(&self) -> Vec<BoardRecord> {
        match self.received.read() {
            Ok(received) => received.clone(),
            Err(_) => {
                log::error!("Failed to acquire read lock on received boards");
                Vec::new()
            }
        }
    }
}

impl BoardRegistry for MemoryRegistry {
    fn register_board(&self, record: BoardRecord) -> Result<()> {
        let mut boards = self
            .boards
            .write()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire registry lock: {e}")))?;
        boards.push(activate(record));
        Ok(())
    }

    fn unregister_board(&self, peer_id: Uuid, board_title: &str) -> Result<bool> {
        let mut boards = self
            .boards
            .write()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire registry lock: {e}")))?;
        let before = boards.len();
        boards.retain(|b| !(b.peer_id == peer_id && b.board_title == board_title));
        Ok(boards.len() < before)
    }

    fn list_boards(&self) -> Result<Vec<BoardRecord>> {
        let boards = self
            .boards
            .read()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire registry lock: {e}")))?;
        Ok(boards.clone())
    }

    fn store_received_boards(&self, boards: &[BoardRecord]) -> Result<()> {
        let mut received = self
            .received
            .write()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire registry lock: {e}")))?;
        *received = boards.to_vec();
        Ok(())
    }
}
