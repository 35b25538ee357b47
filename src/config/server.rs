//! Server configuration types
//!
//! Defines the main configuration structures for the relay handler.

use super::TcpConfig;
use crate::helper::{DEFAULT_REFRESH_INTERVAL_MS, DEFAULT_UDP_IDLE_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Environment variable carrying the shadowbox API prefix
pub const SB_API_PREFIX: &str = "SB_API_PREFIX";

/// Environment variable carrying the shadowbox API port
pub const SB_API_PORT: &str = "SB_API_PORT";

fn default_listen() -> String {
    "127.0.0.1:8443".to_string()
}

fn default_udp_idle_timeout() -> u64 {
    DEFAULT_UDP_IDLE_TIMEOUT_SECS
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MS
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
}

/// Relay server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the CONNECT front end binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Fixed upstream address (e.g., "127.0.0.1:8388")
    #[serde(default)]
    pub upstream: Option<String>,

    /// Directory (shadowbox management API) base URL
    #[serde(default)]
    pub directory: Option<Url>,

    /// Static secrets accepted in addition to the directory users
    #[serde(default)]
    pub users: Vec<String>,

    /// UDP relay idle timeout in seconds
    #[serde(default = "default_udp_idle_timeout")]
    pub udp_idle_timeout: u64,

    /// Minimum spacing between directory refreshes, in milliseconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    /// Socket options for dialed upstream TCP connections
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            upstream: None,
            directory: None,
            users: Vec::new(),
            udp_idle_timeout: default_udp_idle_timeout(),
            refresh_interval: default_refresh_interval(),
            tcp: TcpConfig::default(),
        }
    }
}

impl ServerConfig {
    /// UDP idle timeout as a duration
    pub fn udp_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.udp_idle_timeout)
    }

    /// Directory refresh interval as a duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval)
    }

    /// Fill in the directory endpoint from the shadowbox environment
    /// variables when none is configured explicitly.
    pub fn apply_env(&mut self) {
        if self.directory.is_some() {
            return;
        }
        self.directory = directory_from_env(
            std::env::var(SB_API_PREFIX).ok().as_deref(),
            std::env::var(SB_API_PORT).ok().as_deref(),
        );
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.upstream.is_none() && self.directory.is_none() {
            return Err("Either upstream or directory must be configured".to_string());
        }
        if self.udp_idle_timeout == 0 {
            return Err("udp_idle_timeout must be greater than zero".to_string());
        }
        if self.refresh_interval == 0 {
            return Err("refresh_interval must be greater than zero".to_string());
        }
        if let Some(directory) = &self.directory {
            if directory.scheme() != "http" && directory.scheme() != "https" {
                return Err(format!("Unsupported directory scheme: {}", directory.scheme()));
            }
        }
        Ok(())
    }
}

/// Build the local shadowbox endpoint from its API prefix and port.
///
/// Both values must be present and non-empty.
pub fn directory_from_env(prefix: Option<&str>, port: Option<&str>) -> Option<Url> {
    match (prefix, port) {
        (Some(prefix), Some(port)) if !prefix.is_empty() && !port.is_empty() => {
            Url::parse(&format!("https://127.0.0.1:{}/{}", port, prefix)).ok()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.listen, "127.0.0.1:8443");
        assert!(config.upstream.is_none());
        assert!(config.directory.is_none());
        assert!(config.users.is_empty());
        assert_eq!(config.udp_idle_timeout(), Duration::from_secs(180));
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_requires_upstream_or_directory() {
        let config = ServerConfig::default();
        assert!(config.validate().is_err());

        let config = ServerConfig {
            upstream: Some("127.0.0.1:8388".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = ServerConfig {
            directory: Some(Url::parse("https://127.0.0.1:8081/secret").unwrap()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let config = ServerConfig {
            upstream: Some("127.0.0.1:8388".to_string()),
            udp_idle_timeout: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            upstream: Some("127.0.0.1:8388".to_string()),
            refresh_interval: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_directory() {
        let config = ServerConfig {
            directory: Some(Url::parse("ftp://127.0.0.1/box").unwrap()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_directory_from_env() {
        let url = directory_from_env(Some("abcdef"), Some("8081")).unwrap();
        assert_eq!(url.as_str(), "https://127.0.0.1:8081/abcdef");

        assert!(directory_from_env(None, Some("8081")).is_none());
        assert!(directory_from_env(Some("abcdef"), None).is_none());
        assert!(directory_from_env(Some(""), Some("8081")).is_none());
    }

    #[test]
    fn test_apply_env_keeps_explicit_directory() {
        let explicit = Url::parse("https://10.0.0.1:9000/box").unwrap();
        let mut config = ServerConfig {
            directory: Some(explicit.clone()),
            ..Default::default()
        };
        config.apply_env();
        assert_eq!(config.directory, Some(explicit));
    }
}
