//! Utility functions and helpers
//!
//! Socket setup shared by the accept loop and every outbound request,
//! plus local address discovery for the CLI.

pub mod net;

pub use net::{configure_stream, local_ip, open_stream};
