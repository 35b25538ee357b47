//! Credential cache
//!
//! Holds every token currently accepted. A miss on a well-formed token
//! may trigger a rate-limited refresh from the directory; the refreshed
//! set replaces the old one wholesale under the write lock.

use super::directory::{Directory, DirectorySnapshot};
use super::token::{gen_key, TOKEN_LEN};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Cache of accepted credential tokens
pub struct AuthCache {
    tokens: RwLock<HashSet<String>>,
    /// Tokens derived from statically configured secrets
    static_tokens: Vec<String>,
    directory: Option<Arc<dyn Directory>>,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl AuthCache {
    /// Create a cache holding the tokens of `static_users`.
    ///
    /// Without a directory the cache never refreshes. `refresh_interval`
    /// is the minimum spacing between two directory fetches.
    pub fn new(
        static_users: &[String],
        directory: Option<Arc<dyn Directory>>,
        refresh_interval: Duration,
    ) -> Self {
        let static_tokens: Vec<String> = static_users.iter().map(|user| gen_key(user)).collect();
        let quota = Quota::with_period(refresh_interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::MIN);

        AuthCache {
            tokens: RwLock::new(static_tokens.iter().cloned().collect()),
            static_tokens,
            directory,
            limiter: RateLimiter::direct(quota),
        }
    }

    /// Replace the cached set with `snapshot` plus the static tokens
    pub async fn install(&self, snapshot: &DirectorySnapshot) {
        let fresh = self.token_set(snapshot);
        *self.tokens.write().await = fresh;
    }

    /// Whether `presented` is an accepted token.
    ///
    /// Never fails: a directory error leaves the cache as it was and the
    /// token is treated as unknown.
    pub async fn authenticate(&self, presented: &str) -> bool {
        if self.tokens.read().await.contains(presented) {
            return true;
        }

        let directory = match &self.directory {
            Some(directory) if presented.len() == TOKEN_LEN => directory,
            _ => return false,
        };

        {
            let mut tokens = self.tokens.write().await;
            if tokens.contains(presented) {
                return true;
            }
            if self.limiter.check().is_err() {
                debug!("Directory refresh rate limited");
                return false;
            }

            match directory.fetch().await {
                Ok(snapshot) => {
                    *tokens = self.token_set(&snapshot);
                    info!("Refreshed {} tokens from directory", tokens.len());
                }
                Err(e) => {
                    warn!("Failed to refresh users from directory: {}", e);
                    return false;
                }
            }
        }

        self.tokens.read().await.contains(presented)
    }

    /// Number of accepted tokens
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Whether no token is accepted at all
    pub async fn is_empty(&self) -> bool {
        self.tokens.read().await.is_empty()
    }

    /// Whether a directory is configured
    pub fn has_directory(&self) -> bool {
        self.directory.is_some()
    }

    fn token_set(&self, snapshot: &DirectorySnapshot) -> HashSet<String> {
        snapshot
            .users
            .iter()
            .map(|user| gen_key(&user.password))
            .chain(self.static_tokens.iter().cloned())
            .collect()
    }
}

impl fmt::Debug for AuthCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCache")
            .field("static_tokens", &self.static_tokens.len())
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}
