use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub author: String,
    pub content: String,
}

impl Comment {
    pub fn new(author: &str, content: &str) -> Comment {
        Comment {
            id: Uuid::new_v4(),
            author: author.to_string(),
            content: content.to_string(),
        }
    }
}

/// Announcement that `origin_node_id` holds the content of a titled card
///
/// `content` stays empty until someone fetches it from the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardRef {
    id: Uuid,
    title: String,
    origin_node_id: Uuid,
    host: String,
    port: u16,
    timestamp: DateTime<Utc>,
    content: String,
    comments: HashMap<Uuid, Comment>,
    votes: u32,
}

impl CardRef {
    pub fn new(
        title: &str,
        origin_node_id: Uuid,
        host: &str,
        port: u16,
        timestamp: DateTime<Utc>,
    ) -> CardRef {
        CardRef {
            id: Uuid::new_v4(),
            title: title.to_string(),
            origin_node_id,
            host: host.to_string(),
            port,
            timestamp,
            content: String::new(),
            comments: HashMap::new(),
            votes: 0,
        }
    }

    pub fn get_id(&self) -> Uuid {
        self.id
    }

    pub fn get_title(&self) -> &str {
        self.title.as_str()
    }

    pub fn get_origin_node_id(&self) -> Uuid {
        self.origin_node_id
    }

    pub fn get_host(&self) -> &str {
        self.host.as_str()
    }

    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn get_timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn get_content(&self) -> &str {
        self.content.as_str()
    }

    pub fn get_votes(&self) -> u32 {
        self.votes
    }

    pub fn get_comments(&self) -> Vec<Comment> {
        self.comments.values().cloned().collect()
    }

    pub fn refresh(&mut self, now: DateTime<Utc>) {
        self.timestamp = now;
    }

    pub fn set_content(&mut self, content: &str) {
        self.content = content.to_string();
    }

    pub fn add_comment(&mut self, comment: Comment) {
        self.comments.insert(comment.id, comment);
    }

    /// Only the comment's author may remove it
    pub fn remove_comment(&mut self, comment_id: &Uuid, author: &str) -> bool {
        match self.comments.get(comment_id) {
            Some(comment) if comment.author == author => {
                self.comments.remove(comment_id);
                true
            }
            _ => false,
        }
    }

    pub fn upvote(&mut self) {
        self.votes += 1;
    }

    pub fn downvote(&mut self) {
        self.votes = self.votes.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> CardRef {
        CardRef::new("card1", Uuid::new_v4(), "127.0.0.1", 9000, Utc::now())
    }

    #[test]
    fn test_new_card_is_unfetched() {
        let card = card();
        assert_eq!(card.get_content(), "");
        assert_eq!(card.get_votes(), 0);
        assert!(card.get_comments().is_empty());
    }

    #[test]
    fn test_votes_never_go_negative() {
        let mut card = card();
        card.downvote();
        assert_eq!(card.get_votes(), 0);

        card.upvote();
        card.upvote();
        card.downvote();
        assert_eq!(card.get_votes(), 1);
    }

    #[test]
    fn test_only_author_removes_comment() {
        let mut card = card();
        let comment = Comment::new("alice", "nice card");
        let comment_id = comment.id;
        card.add_comment(comment);

        assert!(!card.remove_comment(&comment_id, "bob"));
        assert_eq!(card.get_comments().len(), 1);

        assert!(card.remove_comment(&comment_id, "alice"));
        assert!(card.get_comments().is_empty());
    }
}
