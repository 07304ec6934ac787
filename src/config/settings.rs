use crate::error::{OverlayError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BOOTSTRAP_HOST: &str = "127.0.0.1";
pub const DEFAULT_BOOTSTRAP_PORT: u16 = 8001;

const NODE_HOST_KEY: &str = "NODE_HOST";
const NODE_PORT_KEY: &str = "NODE_PORT";
const BOOTSTRAP_ADDRESS_KEY: &str = "BOOTSTRAP_ADDRESS";
const DATA_DIR_KEY: &str = "PEERNOTE_DATA_DIR";

/// Settings owned by a single node
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub bootstrap_host: String,
    pub bootstrap_port: u16,
    /// Capacity of the peer directory
    pub max_total_connections: usize,
    /// Upper bound on concurrently running connection handlers
    pub max_inbound_handlers: usize,
    /// Upper bound on entries in a PEER_LIST reply
    pub max_peer_list: usize,
    /// TTL a freshly issued PING starts with
    pub search_ttl: u32,
    pub card_max_age_secs: u64,
    pub sweep_interval_secs: u64,
    pub route_max_age_secs: u64,
    /// How long results of a search this node issued are kept
    pub search_max_age_secs: u64,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 0,
            bootstrap_host: String::from(DEFAULT_BOOTSTRAP_HOST),
            bootstrap_port: DEFAULT_BOOTSTRAP_PORT,
            max_total_connections: 100,
            max_inbound_handlers: 100,
            max_peer_list: 5,
            search_ttl: 5,
            card_max_age_secs: 300,
            sweep_interval_secs: 60,
            route_max_age_secs: 120,
            search_max_age_secs: 600,
            connect_timeout_ms: 5000,
            read_timeout_ms: 60_000,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Config> {
        let raw = fs::read_to_string(path).map_err(|e| {
            OverlayError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Config> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = env::var(NODE_HOST_KEY) {
            self.host = host;
        }
        if let Ok(port) = env::var(NODE_PORT_KEY) {
            self.port = port
                .parse()
                .map_err(|e| OverlayError::Config(format!("Invalid {NODE_PORT_KEY}: {e}")))?;
        }
        if let Ok(addr) = env::var(BOOTSTRAP_ADDRESS_KEY) {
            let (host, port) = split_host_port(&addr)?;
            self.bootstrap_host = host;
            self.bootstrap_port = port;
        }
        if let Ok(dir) = env::var(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.search_ttl == 0 {
            return Err(OverlayError::Config("search_ttl must be at least 1".to_string()));
        }
        if self.max_inbound_handlers == 0 {
            return Err(OverlayError::Config(
                "max_inbound_handlers must be at least 1".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(OverlayError::Config(
                "sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 {
            return Err(OverlayError::Config("socket timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Whether `(host, port)` names the well-known bootstrap node
    pub fn is_bootstrap_addr(&self, host: &str, port: u16) -> bool {
        self.bootstrap_host == host && self.bootstrap_port == port
    }

    pub fn card_max_age(&self) -> Duration {
        Duration::from_secs(self.card_max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn route_max_age(&self) -> Duration {
        Duration::from_secs(self.route_max_age_secs)
    }

    pub fn search_max_age(&self) -> Duration {
        Duration::from_secs(self.search_max_age_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Split "host:port" (e.g. "127.0.0.1:8001" -> ("127.0.0.1", 8001))
pub fn split_host_port(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| OverlayError::Config(format!("Missing port in address {addr}")))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| OverlayError::Config(format!("Invalid port in address {addr}: {e}")))?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_peer_list, 5);
        assert_eq!(config.search_ttl, 5);
        assert!(config.is_bootstrap_addr("127.0.0.1", 8001));
        assert!(!config.is_bootstrap_addr("127.0.0.1", 8002));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            port = 9100
            max_total_connections = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.max_total_connections, 3);
        assert_eq!(config.bootstrap_port, DEFAULT_BOOTSTRAP_PORT);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let result = Config::from_toml_str("search_ttl = 0");
        assert!(matches!(result, Err(OverlayError::Config(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Config::from_toml_str("read_timeout_ms = 0");
        assert!(matches!(result, Err(OverlayError::Config(_))));
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "host = \"10.0.0.7\"\ncard_max_age_secs = 30").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(config.host, "10.0.0.7");
        assert_eq!(config.card_max_age(), Duration::from_secs(30));
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("192.168.1.4:8001").unwrap(),
            ("192.168.1.4".to_string(), 8001)
        );
        assert!(split_host_port("nohost").is_err());
        assert!(split_host_port("host:notaport").is_err());
    }
}
