//! Configuration management
//!
//! This module handles the settings a node runs with: its own address,
//! the well-known bootstrap address, capacity caps, timeouts and the
//! soft-state lifetimes used by the maintenance sweep.

pub mod settings;

pub use settings::{Config, DEFAULT_BOOTSTRAP_HOST, DEFAULT_BOOTSTRAP_PORT};
