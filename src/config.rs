//! Configuration for the guardian service and the contract client
//!
//! The guardian takes CLI arguments and environment variables through clap.
//! The client reads a TOML file whose `[client]` table maps onto
//! [`ClientConfig`].

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Guardian service - mediates capabilities for minted token objects
#[derive(Parser, Debug, Clone)]
#[command(name = "guardian")]
#[command(about = "Capability relay and provisioning service for token objects")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:7900")]
    pub listen: SocketAddr,

    /// Directory for the capability keystore and endpoint registry
    #[arg(long, env = "GUARDIAN_DATA_DIR", default_value = "./guardian-data")]
    pub data_dir: PathBuf,

    /// Storage service URL advertised by /info
    #[arg(long, env = "STORAGE_SERVICE_URL", default_value = "http://localhost:7901")]
    pub storage_service_url: String,

    /// Comma-separated contract code hashes allowed to register endpoints
    #[arg(long, env = "ALLOWED_CODE_HASHES", value_delimiter = ',')]
    pub allowed_code_hashes: Vec<String>,

    /// Comma-separated contract ids allowed to register endpoints
    #[arg(long, env = "ALLOWED_CONTRACT_IDS", value_delimiter = ',')]
    pub allowed_contract_ids: Vec<String>,

    /// Requests processed concurrently before answering 429
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value = "64")]
    pub max_concurrent_requests: usize,

    /// Seconds a client should wait after a 429
    #[arg(long, env = "RETRY_AFTER_SECS", default_value = "1")]
    pub retry_after_secs: u64,

    /// Largest accepted request body in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,

    /// Timeout for outbound model/dataset requests made by handlers
    #[arg(long, env = "HANDLER_TIMEOUT_MS", default_value = "30000")]
    pub handler_timeout_ms: u64,

    /// Keep the keystore in memory only (testing)
    #[arg(long, env = "EPHEMERAL", default_value = "false")]
    pub ephemeral: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl Args {
    pub fn keystore_path(&self) -> PathBuf {
        self.data_dir.join("keystore.db")
    }

    pub fn endpoint_registry_path(&self) -> PathBuf {
        self.data_dir.join("endpoints.db")
    }

    /// Whether an endpoint allow-list is configured at all
    pub fn allow_list_enabled(&self) -> bool {
        !self.allowed_code_hashes.is_empty() || !self.allowed_contract_ids.is_empty()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_requests == 0 {
            return Err("MAX_CONCURRENT_REQUESTS must be at least 1".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be at least 1".to_string());
        }

        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(format!("unknown LOG_FORMAT {}", self.log_format));
        }

        if !self.storage_service_url.starts_with("http://")
            && !self.storage_service_url.starts_with("https://")
        {
            return Err("STORAGE_SERVICE_URL must be an http(s) URL".to_string());
        }

        Ok(())
    }
}

/// Client-side settings, the `[client]` table of the client config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Data directory; save files live in `<data_dir>/__contract_cache__`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Platform gateway URL
    #[serde(default)]
    pub platform_url: Option<String>,

    /// Timeout for platform gateway requests in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for guardian service requests in seconds
    #[serde(default = "default_guardian_timeout")]
    pub guardian_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            platform_url: None,
            request_timeout_secs: default_request_timeout(),
            guardian_timeout_secs: default_guardian_timeout(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_request_timeout() -> u64 { 60 }
fn default_guardian_timeout() -> u64 { 20 }

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["guardian"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults_validate() {
        let args = args(&[]);
        assert!(args.validate().is_ok());
        assert!(!args.allow_list_enabled());
        assert_eq!(args.keystore_path(), PathBuf::from("./guardian-data/keystore.db"));
    }

    #[test]
    fn test_allow_list_parsing() {
        let args = args(&["--allowed-code-hashes", "abc,def"]);
        assert_eq!(args.allowed_code_hashes, vec!["abc", "def"]);
        assert!(args.allow_list_enabled());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(args(&["--max-concurrent-requests", "0"]).validate().is_err());
        assert!(args(&["--log-format", "xml"]).validate().is_err());
        assert!(args(&["--storage-service-url", "ftp://x"]).validate().is_err());
    }

    #[test]
    fn test_client_config_defaults() {
        let config: ClientConfig = toml::from_str("platform_url = \"http://p\"").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.guardian_timeout_secs, 20);
        assert_eq!(config.platform_url.as_deref(), Some("http://p"));
    }
}
