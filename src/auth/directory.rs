//! Directory service client
//!
//! The directory is the system of record for valid secrets. The relay
//! only needs a snapshot: the port new access keys listen on and the
//! password of every access key.

use crate::error::RelayError;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Request timeout for directory queries
const DIRECTORY_TIMEOUT_SECS: u64 = 10;

/// One user known to the directory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectoryUser {
    /// Secret the user's token is derived from
    pub password: String,
}

/// Point-in-time view of the directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    /// Port the directory assigns to new access keys
    pub listen_port: u16,
    /// All users with their secrets
    pub users: Vec<DirectoryUser>,
}

/// Source of directory snapshots
#[async_trait]
pub trait Directory: Send + Sync + Debug {
    /// Fetch a fresh snapshot
    async fn fetch(&self) -> Result<DirectorySnapshot, RelayError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    port_for_new_access_keys: u16,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessKeys {
    access_keys: Vec<DirectoryUser>,
}

/// Outline (shadowbox) management API client
///
/// Shadowbox serves its API on loopback with a self-signed certificate,
/// so certificate verification is disabled for this client.
#[derive(Debug, Clone)]
pub struct OutlineDirectory {
    base: Url,
    client: reqwest::Client,
}

impl OutlineDirectory {
    /// Create a client for the API rooted at `base`
    pub fn new(base: Url) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(DIRECTORY_TIMEOUT_SECS))
            .build()?;
        Ok(OutlineDirectory { base, client })
    }

    /// API base URL
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base.as_str().trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Directory for OutlineDirectory {
    async fn fetch(&self) -> Result<DirectorySnapshot, RelayError> {
        let server: ServerInfo = self
            .client
            .get(self.endpoint("server"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let keys: AccessKeys = self
            .client
            .get(self.endpoint("access-keys"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(
            "Directory snapshot: port {}, {} users",
            server.port_for_new_access_keys,
            keys.access_keys.len()
        );

        Ok(DirectorySnapshot {
            listen_port: server.port_for_new_access_keys,
            users: keys.access_keys,
        })
    }
}
