//! Test utilities for overlay testing

use crate::config::Config;
use crate::network::Node;
use crate::registry::MemoryRegistry;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Loopback config whose bootstrap address refuses connections
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        bootstrap_host: "127.0.0.1".to_string(),
        bootstrap_port: 1, // Nothing listens here
        connect_timeout_ms: 1000,
        read_timeout_ms: 5000,
        sweep_interval_secs: 1,
        ..Config::default()
    }
}

/// A started node with an in-memory registry
pub fn spawn_node() -> Arc<Node> {
    spawn_node_with(test_config())
}

pub fn spawn_node_with(config: Config) -> Arc<Node> {
    let node = Node::new(config, Arc::new(MemoryRegistry::new())).unwrap();
    node.start().unwrap();
    node
}

/// Poll `condition` every 20ms until it holds or `timeout` elapses
pub fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}
