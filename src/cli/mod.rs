//! Command-line interface
//!
//! This module contains the CLI commands and argument parsing
//! for running and querying overlay nodes.

pub mod commands;

pub use commands::{parse_keywords, Command, Opt};
