//! Test network helpers
//!
//! Builds nodes on ephemeral loopback ports with short timeouts and polls
//! for conditions that settle asynchronously, such as PONG arrival.

pub mod test_utils;

pub use test_utils::*;
