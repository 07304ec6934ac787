//! Error handling for the overlay
//!
//! Every failure a node can observe while talking to peers, serving a
//! request or touching its registry maps onto one of these variants.

use std::fmt;

/// Result type alias for overlay operations
pub type Result<T> = std::result::Result<T, OverlayError>;

/// Error types for overlay operations
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayError {
    /// A frame was truncated mid-header or mid-body
    Connection(String),
    /// Bad JSON or an unrecognised message type
    MalformedMessage(String),
    /// The peer directory has no room for another peer
    CapacityExceeded { capacity: usize },
    /// Card content is longer than the allowed limit
    ContentTooLarge { size: usize, limit: usize },
    /// A request did not match this node's board or role
    Validation(String),
    /// Outbound connection or socket setup failures
    Network(String),
    /// File I/O errors
    Io(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Configuration errors
    Config(String),
    /// Board registry errors
    Registry(String),
    /// A shared-state lock was poisoned by a panicking thread
    Lock(String),
}

impl fmt::Display for OverlayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayError::Connection(msg) => write!(f, "Connection error: {msg}"),
            OverlayError::MalformedMessage(msg) => write!(f, "Malformed message: {msg}"),
            OverlayError::CapacityExceeded { capacity } => {
                write!(f, "Peer directory full: capacity {capacity}")
            }
            OverlayError::ContentTooLarge { size, limit } => {
                write!(f, "Content too large: {size} characters, limit {limit}")
            }
            OverlayError::Validation(msg) => write!(f, "Validation error: {msg}"),
            OverlayError::Network(msg) => write!(f, "Network error: {msg}"),
            OverlayError::Io(msg) => write!(f, "I/O error: {msg}"),
            OverlayError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            OverlayError::Config(msg) => write!(f, "Configuration error: {msg}"),
            OverlayError::Registry(msg) => write!(f, "Registry error: {msg}"),
            OverlayError::Lock(msg) => write!(f, "Lock error: {msg}"),
        }
    }
}

impl std::error::Error for OverlayError {}

impl From<std::io::Error> for OverlayError {
    fn from(err: std::io::Error) -> Self {
        OverlayError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for OverlayError {
    fn from(err: serde_json::Error) -> Self {
        OverlayError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for OverlayError {
    fn from(err: toml::de::Error) -> Self {
        OverlayError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_limits() {
        let err = OverlayError::ContentTooLarge {
            size: 2000,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "Content too large: 2000 characters, limit 1024"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: OverlayError = io.into();
        assert!(matches!(err, OverlayError::Io(_)));
    }
}
