use crate::error::{OverlayError, Result};
use crate::protocol::ContentEntry;
use std::collections::HashMap;
use std::sync::RwLock;

/// Longest card content accepted, in characters
pub const MAX_CONTENT_LEN: usize = 1024;

/// Board a card lands on when the caller names none
pub const DEFAULT_BOARD: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCard {
    pub content: String,
    pub board: String,
}

/// Raw card content held by the peer that wrote it
///
/// ( K -> card title, V => StoredCard )
pub struct ContentStore {
    inner: RwLock<HashMap<String, StoredCard>>,
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore {
    pub fn new() -> ContentStore {
        ContentStore {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Store (or overwrite) a card's content locally
    pub fn add(&self, content: &str, title: &str, board: Option<&str>) -> Result<()> {
        let size = content.chars().count();
        if size > MAX_CONTENT_LEN {
            return Err(OverlayError::ContentTooLarge {
                size,
                limit: MAX_CONTENT_LEN,
            });
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|e| OverlayError::Lock(format!("Failed to acquire content lock: {e}")))?;
        inner.insert(
            title.to_string(),
            StoredCard {
                content: content.to_string(),
                board: board.unwrap_or(DEFAULT_BOARD).to_string(),
            },
        );
        Ok(())
    }

    pub fn get(&self, title: &str) -> Option<StoredCard> {
        match self.inner.read() {
            Ok(inner) => inner.get(title).cloned(),
            Err(_) => {
                log::error!("Failed to acquire read lock on content store");
                None
            }
        }
    }

    pub fn remove(&self, title: &str) -> bool {
        match self.inner.write() {
            Ok(mut inner) => inner.remove(title).is_some(),
            Err(_) => {
                log::error!("Failed to acquire write lock on content store");
                false
            }
        }
    }

    /// `(board, title, content)` for a held card
    pub fn content_entry(&self, title: &str) -> Option<ContentEntry> {
        self.get(title)
            .map(|card| ContentEntry(card.board, title.to_string(), card.content))
    }

    pub fn titles(&self) -> Vec<String> {
        match self.inner.read() {
            Ok(inner) => inner.keys().cloned().collect(),
            Err(_) => {
                log::error!("Failed to acquire read lock on content store");
                Vec::new()
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(inner) => inner.len(),
            Err(_) => {
                log::error!("Failed to acquire read lock on content store");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_fetch_entry() {
        let store = ContentStore::new();
        store.add("hi", "card1", Some("yolo")).unwrap();

        assert_eq!(
            store.content_entry("card1"),
            Some(ContentEntry("yolo".into(), "card1".into(), "hi".into()))
        );
        assert!(store.content_entry("card2").is_none());
    }

    #[test]
    fn test_missing_board_uses_default() {
        let store = ContentStore::new();
        store.add("hi", "card1", None).unwrap();
        assert_eq!(store.get("card1").unwrap().board, DEFAULT_BOARD);
    }

    #[test]
    fn test_content_limit_counts_characters() {
        let store = ContentStore::new();
        let at_limit = "ä".repeat(MAX_CONTENT_LEN);
        assert!(store.add(&at_limit, "full", None).is_ok());

        let too_long = "a".repeat(MAX_CONTENT_LEN + 1);
        assert_eq!(
            store.add(&too_long, "overflow", None),
            Err(OverlayError::ContentTooLarge {
                size: MAX_CONTENT_LEN + 1,
                limit: MAX_CONTENT_LEN
            })
        );
        assert!(store.get("overflow").is_none());
    }

    #[test]
    fn test_remove() {
        let store = ContentStore::new();
        store.add("hi", "card1", None).unwrap();
        assert!(store.remove("card1"));
        assert!(!store.remove("card1"));
        assert!(store.is_empty());
    }
}
