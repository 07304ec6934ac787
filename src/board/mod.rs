//! Bulletin board data model
//!
//! A super-peer owns one `Board` that aggregates soft-state `CardRef`
//! announcements from content-holding peers. The card content itself
//! stays with the peer that wrote it, in its `ContentStore`.

pub mod board;
pub mod card;
pub mod content_store;

pub use board::{Board, CardKey};
pub use card::{CardRef, Comment};
pub use content_store::{ContentStore, StoredCard, DEFAULT_BOARD, MAX_CONTENT_LEN};
