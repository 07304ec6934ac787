use crate::error::{OverlayError, Result};
use crate::protocol::BoardRecord;
use crate::registry::{activate, BoardRegistry};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

const BOARDS_FILE: &str = "boards.json";
const RECEIVED_BOARDS_FILE: &str = "received_boards.json";

/// Registry persisted as pretty-printed JSON files under a data directory
pub struct JsonFileRegistry {
    dir: PathBuf,
    /// Serializes read-modify-write cycles on the files
    guard: Mutex<()>,
}

impl JsonFileRegistry {
    pub fn new<P: AsRef<Path>>(dir: P) -> JsonFileRegistry {
        JsonFileRegistry {
            dir: dir.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    pub fn boards_path(&self) -> PathBuf {
        self.dir.join(BOARDS_FILE)
    }

    pub fn received_boards_path(&self) -> PathBuf {
        self.dir.join(RECEIVED_BOARDS_FILE)
    }

    pub fn received_boards(&self) -> Result<Vec<BoardRecord>> {
        Self::read_records(&self.received_boards_path())
    }

    fn read_records(path: &Path) -> Result<Vec<BoardRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            OverlayError::Registry(format!("Corrupt registry file {}: {e}", path.display()))
        })
    }

    fn write_records(&self, path: &Path, records: &[BoardRecord]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let raw = serde_json::to_string_pretty(records)?;
        fs::write(path, raw)?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.guard
            .lock()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire registry lock: {e}")))
    }
}

impl BoardRegistry for JsonFileRegistry {
    fn register_board(&self, record: BoardRecord) -> Result<()> {
        let _guard = self.lock()?;
        let path = self.boards_path();
        let mut boards = Self::read_records(&path)?;
        info!(
            "Board registered: {} by peer {}",
            record.board_title, record.peer_id
        );
        boards.push(activate(record));
        self.write_records(&path, &boards)
    }

    fn unregister_board(&self, peer_id: Uuid, board_title: &str) -> Result<bool> {
        let _guard = self.lock()?;
        let path = self.boards_path();
        let mut boards = Self::read_records(&path)?;
        let before = boards.len();
        boards.retain(|b| !(b.peer_id == peer_id && b.board_title == board_title));

        if boards.len() == before {
            info!("Board not found for unregistration: {board_title} by peer {peer_id}");
            return Ok(false);
        }
        self.write_records(&path, &boards)?;
        info!("Board unregistered: {board_title} by peer {peer_id}");
        Ok(true)
    }

    fn list_boards(&self) -> Result<Vec<BoardRecord>> {
        let _guard = self.lock()?;
        Self::read_records(&self.boards_path())
    }

    fn store_received_boards(&self, boards: &[BoardRecord]) -> Result<()> {
        let _guard = self.lock()?;
        self.write_records(&self.received_boards_path(), boards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ACTIVE_STATUS;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn record(peer_id: Uuid, title: &str) -> BoardRecord {
        BoardRecord {
            board_id: Uuid::new_v4(),
            peer_id,
            board_title: title.to_string(),
            keywords: BTreeSet::from(["hello".to_string()]),
            peer_host: "127.0.0.1".to_string(),
            peer_port: 8003,
            created_at: None,
            status: None,
        }
    }

    #[test]
    fn test_empty_directory_lists_nothing() {
        let dir = tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path().join("data"));
        assert!(registry.list_boards().unwrap().is_empty());
    }

    #[test]
    fn test_register_persists_and_stamps() {
        let dir = tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path());
        let peer = Uuid::new_v4();
        registry.register_board(record(peer, "yolo")).unwrap();

        // A second instance reads the same file
        let reopened = JsonFileRegistry::new(dir.path());
        let boards = reopened.list_boards().unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].board_title, "yolo");
        assert_eq!(boards[0].status.as_deref(), Some(ACTIVE_STATUS));
        assert!(boards[0].created_at.is_some());
    }

    #[test]
    fn test_unregister_matches_peer_and_title() {
        let dir = tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path());
        let peer = Uuid::new_v4();
        let other = Uuid::new_v4();
        registry.register_board(record(peer, "yolo")).unwrap();
        registry.register_board(record(other, "yolo")).unwrap();

        assert!(!registry.unregister_board(peer, "missing").unwrap());
        assert!(registry.unregister_board(peer, "yolo").unwrap());

        let boards = registry.list_boards().unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].peer_id, other);
    }

    #[test]
    fn test_received_boards_are_replaced() {
        let dir = tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path());
        let peer = Uuid::new_v4();

        registry
            .store_received_boards(&[record(peer, "a"), record(peer, "b")])
            .unwrap();
        registry.store_received_boards(&[record(peer, "c")]).unwrap();

        let received = registry.received_boards().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].board_title, "c");
    }

    #[test]
    fn test_corrupt_file_is_registry_error() {
        let dir = tempdir().unwrap();
        let registry = JsonFileRegistry::new(dir.path());
        fs::write(registry.boards_path(), "{not json").unwrap();
        assert!(matches!(
            registry.list_boards(),
            Err(OverlayError::Registry(_))
        ));
    }
}
