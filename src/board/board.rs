use crate::board::card::CardRef;
use crate::error::{OverlayError, Result};
use crate::protocol::MetaEntry;
use chrono::{DateTime, Utc};
use log::info;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// ( K -> (origin_node_id, card_title), V => CardRef )
pub type CardKey = (Uuid, String);

struct BoardInfo {
    title: String,
    keywords: BTreeSet<String>,
}

/// A topical board held by a super-peer
///
/// Card references are soft state: each announcement refreshes the
/// entry's timestamp and entries that stop being refreshed are evicted.
pub struct Board {
    board_id: Uuid,
    info: RwLock<BoardInfo>,
    card_references: Mutex<HashMap<CardKey, CardRef>>,
    write_denylist: Mutex<HashSet<String>>,
}

impl Board {
    pub fn new<I, S>(title: &str, keywords: I) -> Board
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Board {
            board_id: Uuid::new_v4(),
            info: RwLock::new(BoardInfo {
                title: title.to_string(),
                keywords: keywords.into_iter().map(Into::into).collect(),
            }),
            card_references: Mutex::new(HashMap::new()),
            write_denylist: Mutex::new(HashSet::new()),
        }
    }

    pub fn get_board_id(&self) -> Uuid {
        self.board_id
    }

    pub fn get_title(&self) -> String {
        match self.info.read() {
            Ok(info) => info.title.clone(),
            Err(_) => {
                log::error!("Failed to acquire read lock on board info");
                String::new()
            }
        }
    }

    pub fn get_keywords(&self) -> BTreeSet<String> {
        match self.info.read() {
            Ok(info) => info.keywords.clone(),
            Err(_) => {
                log::error!("Failed to acquire read lock on board info");
                BTreeSet::new()
            }
        }
    }

    pub fn set_title(&self, title: &str) -> Result<()> {
        let mut info = self
            .info
            .write()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire board info lock: {e}")))?;
        info.title = title.to_string();
        Ok(())
    }

    pub fn set_keywords(&self, keywords: BTreeSet<String>) -> Result<()> {
        let mut info = self
            .info
            .write()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire board info lock: {e}")))?;
        info.keywords = keywords;
        Ok(())
    }

    pub fn add_keyword(&self, keyword: &str) -> Result<()> {
        let mut info = self
            .info
            .write()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire board info lock: {e}")))?;
        info.keywords.insert(keyword.to_string());
        Ok(())
    }

    /// True iff at least one queried keyword is one of the board's keywords
    pub fn matches_any(&self, keywords: &BTreeSet<String>) -> bool {
        match self.info.read() {
            Ok(info) => !info.keywords.is_disjoint(keywords),
            Err(_) => {
                log::error!("Failed to acquire read lock on board info");
                false
            }
        }
    }

    pub fn add_or_refresh_reference(
        &self,
        origin_node_id: Uuid,
        title: &str,
        host: &str,
        port: u16,
    ) -> Result<()> {
        self.add_or_refresh_reference_at(origin_node_id, title, host, port, Utc::now())
    }

    /// Refresh the timestamp of an existing `(origin, title)` entry, or
    /// insert a new reference stamped with `now`
    pub fn add_or_refresh_reference_at(
        &self,
        origin_node_id: Uuid,
        title: &str,
        host: &str,
        port: u16,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut references = self.card_references.lock().map_err(|e| {
            OverlayError::Lock(format!("Failed to acquire card reference lock: {e}"))
        })?;

        references
            .entry((origin_node_id, title.to_string()))
            .and_modify(|card| card.refresh(now))
            .or_insert_with(|| CardRef::new(title, origin_node_id, host, port, now));
        Ok(())
    }

    pub fn evict_older_than(&self, max_age: Duration) -> Result<usize> {
        self.evict_older_than_at(max_age, Utc::now())
    }

    /// Remove every reference whose timestamp is before `now - max_age`
    pub fn evict_older_than_at(&self, max_age: Duration, now: DateTime<Utc>) -> Result<usize> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| OverlayError::Validation(format!("Invalid max age: {e}")))?;
        // A cutoff before the earliest representable instant keeps everything
        let Some(cutoff) = now.checked_sub_signed(max_age) else {
            return Ok(0);
        };

        let mut references = self.card_references.lock().map_err(|e| {
            OverlayError::Lock(format!("Failed to acquire card reference lock: {e}"))
        })?;

        let stale: Vec<CardKey> = references
            .iter()
            .filter(|(_, card)| card.get_timestamp() < cutoff)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            references.remove(key);
            info!(
                "Card reference '{}' from {} evicted due to staleness",
                key.1, key.0
            );
        }
        Ok(stale.len())
    }

    pub fn get_reference(&self, origin_node_id: Uuid, title: &str) -> Option<CardRef> {
        match self.card_references.lock() {
            Ok(references) => references
                .get(&(origin_node_id, title.to_string()))
                .cloned(),
            Err(_) => {
                log::error!("Failed to acquire card reference lock");
                None
            }
        }
    }

    /// Apply `update` to one reference; false when no such reference exists
    pub fn update_reference<F>(&self, origin_node_id: Uuid, title: &str, update: F) -> Result<bool>
    where
        F: FnOnce(&mut CardRef),
    {
        let mut references = self.card_references.lock().map_err(|e| {
            OverlayError::Lock(format!("Failed to acquire card reference lock: {e}"))
        })?;
        match references.get_mut(&(origin_node_id, title.to_string())) {
            Some(card) => {
                update(card);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get_references(&self) -> Vec<CardRef> {
        match self.card_references.lock() {
            Ok(references) => references.values().cloned().collect(),
            Err(_) => {
                log::error!("Failed to acquire card reference lock");
                Vec::new()
            }
        }
    }

    pub fn reference_count(&self) -> usize {
        match self.card_references.lock() {
            Ok(references) => references.len(),
            Err(_) => {
                log::error!("Failed to acquire card reference lock");
                0
            }
        }
    }

    /// `(origin, title, host, port, timestamp)` for every reference
    pub fn meta_entries(&self) -> Vec<MetaEntry> {
        self.get_references()
            .into_iter()
            .map(|card| {
                MetaEntry(
                    card.get_origin_node_id(),
                    card.get_title().to_string(),
                    card.get_host().to_string(),
                    card.get_port(),
                    card.get_timestamp(),
                )
            })
            .collect()
    }

    /// Record a user whose writes collaborators must refuse
    pub fn deny_write(&self, user_id: &str) -> Result<()> {
        let mut denylist = self
            .write_denylist
            .lock()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire denylist lock: {e}")))?;
        denylist.insert(user_id.to_string());
        Ok(())
    }

    pub fn is_write_denied(&self, user_id: &str) -> bool {
        match self.write_denylist.lock() {
            Ok(denylist) => denylist.contains(user_id),
            Err(_) => {
                log::error!("Failed to acquire denylist lock");
                true // Refuse writes when unsure
            }
        }
    }

    pub fn get_denied_writers(&self) -> Vec<String> {
        match self.write_denylist.lock() {
            Ok(denylist) => denylist.iter().cloned().collect(),
            Err(_) => {
                log::error!("Failed to acquire denylist lock");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use std::thread;

    fn keywords(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_matches_any_is_exact_intersection() {
        let board = Board::new("yolo", ["hello", "world"]);

        assert!(board.matches_any(&keywords(&["world"])));
        assert!(board.matches_any(&keywords(&["nope", "hello"])));
        assert!(!board.matches_any(&keywords(&["worl"])));
        assert!(!board.matches_any(&keywords(&[])));
    }

    #[test]
    fn test_repeated_announcement_refreshes_in_place() {
        let board = Board::new("yolo", ["hello"]);
        let origin = Uuid::new_v4();
        let first = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 12, 5, 0).unwrap();

        board
            .add_or_refresh_reference_at(origin, "card1", "10.0.0.2", 9000, first)
            .unwrap();
        let original_id = board.get_reference(origin, "card1").unwrap().get_id();

        board
            .add_or_refresh_reference_at(origin, "card1", "10.0.0.2", 9000, later)
            .unwrap();

        assert_eq!(board.reference_count(), 1);
        let card = board.get_reference(origin, "card1").unwrap();
        assert_eq!(card.get_timestamp(), later);
        assert_eq!(card.get_id(), original_id);
    }

    #[test]
    fn test_same_title_from_two_origins_is_two_references() {
        let board = Board::new("yolo", ["hello"]);
        board
            .add_or_refresh_reference(Uuid::new_v4(), "card1", "10.0.0.2", 9000)
            .unwrap();
        board
            .add_or_refresh_reference(Uuid::new_v4(), "card1", "10.0.0.3", 9000)
            .unwrap();
        assert_eq!(board.reference_count(), 2);
    }

    #[test]
    fn test_eviction_removes_exactly_entries_before_cutoff() {
        let board = Board::new("yolo", ["hello"]);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let max_age = Duration::from_secs(60);
        let cutoff = now - chrono::Duration::seconds(60);

        let stale = Uuid::new_v4();
        let boundary = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        board
            .add_or_refresh_reference_at(stale, "old", "h", 1, cutoff - chrono::Duration::seconds(1))
            .unwrap();
        board
            .add_or_refresh_reference_at(boundary, "edge", "h", 1, cutoff)
            .unwrap();
        board
            .add_or_refresh_reference_at(fresh, "new", "h", 1, now)
            .unwrap();

        let evicted = board.evict_older_than_at(max_age, now).unwrap();

        assert_eq!(evicted, 1);
        assert_eq!(board.reference_count(), 2);
        assert!(board.get_reference(stale, "old").is_none());
        assert!(board.get_reference(boundary, "edge").is_some());
        assert!(board.get_reference(fresh, "new").is_some());
    }

    #[test]
    fn test_eviction_with_huge_max_age_keeps_everything() {
        let board = Board::new("yolo", ["hello"]);
        let origin = Uuid::new_v4();
        board
            .add_or_refresh_reference(origin, "card1", "10.0.0.2", 9000)
            .unwrap();

        let evicted = board
            .evict_older_than(Duration::from_secs(10_000_000_000_000))
            .unwrap();

        assert_eq!(evicted, 0);
        assert!(board.get_reference(origin, "card1").is_some());
    }

    #[test]
    fn test_concurrent_announcements_for_one_key() {
        let board = Arc::new(Board::new("yolo", ["hello"]));
        let origin = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let board = Arc::clone(&board);
                thread::spawn(move || {
                    for _ in 0..50 {
                        board
                            .add_or_refresh_reference(origin, "card1", "10.0.0.2", 9000)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(board.reference_count(), 1);
    }

    #[test]
    fn test_meta_entries_mirror_references() {
        let board = Board::new("yolo", ["hello"]);
        let origin = Uuid::new_v4();
        board
            .add_or_refresh_reference(origin, "card1", "10.0.0.2", 9000)
            .unwrap();

        let entries = board.meta_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, origin);
        assert_eq!(entries[0].1, "card1");
        assert_eq!(entries[0].3, 9000);
    }

    #[test]
    fn test_update_reference_votes() {
        let board = Board::new("yolo", ["hello"]);
        let origin = Uuid::new_v4();
        board
            .add_or_refresh_reference(origin, "card1", "10.0.0.2", 9000)
            .unwrap();

        assert!(board.update_reference(origin, "card1", |card| card.upvote()).unwrap());
        assert!(!board.update_reference(origin, "missing", |card| card.upvote()).unwrap());
        assert_eq!(board.get_reference(origin, "card1").unwrap().get_votes(), 1);
    }

    #[test]
    fn test_write_denylist() {
        let board = Board::new("yolo", ["hello"]);
        assert!(!board.is_write_denied("mallory"));

        board.deny_write("mallory").unwrap();
        assert!(board.is_write_denied("mallory"));
        assert_eq!(board.get_denied_writers(), vec!["mallory".to_string()]);
    }

    #[test]
    fn test_title_and_keywords_are_mutable() {
        let board = Board::new("yolo", ["hello"]);
        board.set_title("renamed").unwrap();
        board.add_keyword("extra").unwrap();

        assert_eq!(board.get_title(), "renamed");
        assert!(board.matches_any(&keywords(&["extra"])));

        board.set_keywords(keywords(&["only"])).unwrap();
        assert!(!board.matches_any(&keywords(&["hello"])));
    }
}
