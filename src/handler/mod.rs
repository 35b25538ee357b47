//! Tunnel request handling
//!
//! The host front end delivers each CONNECT request as a [`TunnelRequest`].
//! [`TunnelHandler::serve`] authenticates it, picks the relay engine from
//! the `tcp.` / `udp.` prefix of the target host, adapts the host's
//! connection into a [`TunnelStream`] and runs the session to completion.
//! Requests it does not take are handed back untouched.

mod request;

pub use request::{HostConnection, Rejection, Scheme, TunnelRequest};

use crate::auth::{AuthCache, Directory, OutlineDirectory};
use crate::config::ServerConfig;
use crate::error::RelayError;
use crate::helper::SocketOpts;
use crate::relay::{relay_tcp, relay_udp};
use crate::stream::TunnelStream;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// What became of a request
#[derive(Debug)]
pub enum Dispatch {
    /// The request was a tunnel and its session has ended
    Handled,
    /// Not ours; the host keeps the request
    PassThrough(TunnelRequest, Rejection),
}

impl Dispatch {
    /// Whether the handler took the request
    pub fn is_handled(&self) -> bool {
        matches!(self, Dispatch::Handled)
    }
}

/// Relays authenticated tunnel requests to the fixed upstream
#[derive(Debug)]
pub struct TunnelHandler {
    upstream: SocketAddr,
    auth: AuthCache,
    udp_idle_timeout: Duration,
    socket_opts: SocketOpts,
}

impl TunnelHandler {
    /// Create a handler from its parts
    pub fn new(
        upstream: SocketAddr,
        auth: AuthCache,
        udp_idle_timeout: Duration,
        socket_opts: SocketOpts,
    ) -> Self {
        TunnelHandler {
            upstream,
            auth,
            udp_idle_timeout,
            socket_opts,
        }
    }

    /// Build a handler from configuration, talking to the configured
    /// Outline directory if there is one.
    pub async fn provision(config: &ServerConfig) -> Result<Self, RelayError> {
        let directory: Option<Arc<dyn Directory>> = match &config.directory {
            Some(url) => {
                let outline = OutlineDirectory::new(url.clone())?;
                info!("Using directory: {}", outline.base());
                Some(Arc::new(outline))
            }
            None => None,
        };
        Self::provision_with_directory(config, directory).await
    }

    /// Build a handler from configuration and an explicit directory.
    ///
    /// The directory is queried once up front: its users seed the cache
    /// and, without a configured upstream, its listen port on loopback
    /// becomes the upstream.
    pub async fn provision_with_directory(
        config: &ServerConfig,
        directory: Option<Arc<dyn Directory>>,
    ) -> Result<Self, RelayError> {
        config.validate().map_err(RelayError::Config)?;

        let snapshot = match &directory {
            Some(directory) => Some(directory.fetch().await?),
            None => None,
        };

        let upstream = match (&config.upstream, &snapshot) {
            (Some(addr), _) => addr.clone(),
            (None, Some(snapshot)) => format!("127.0.0.1:{}", snapshot.listen_port),
            (None, None) => {
                return Err(RelayError::Config("No upstream configured".to_string()));
            }
        };
        let upstream = resolve_upstream(&upstream).await?;

        let auth = AuthCache::new(&config.users, directory, config.refresh_interval());
        if let Some(snapshot) = &snapshot {
            auth.install(snapshot).await;
        }
        info!("Upstream: {}, {} tokens loaded", upstream, auth.len().await);

        Ok(Self::new(
            upstream,
            auth,
            config.udp_idle_timeout(),
            SocketOpts::from_tcp_config(&config.tcp),
        ))
    }

    /// Upstream address every session is relayed to
    pub fn upstream(&self) -> SocketAddr {
        self.upstream
    }

    /// Credential cache used by this handler
    pub fn auth(&self) -> &AuthCache {
        &self.auth
    }

    /// Handle one request from the host.
    ///
    /// Once a session is accepted it runs to completion here; relay
    /// errors are logged, never returned.
    pub async fn serve(&self, request: TunnelRequest) -> Dispatch {
        if !request.is_connect() {
            return Dispatch::PassThrough(request, Rejection::NotTunnel);
        }

        let token = request.proxy_authorization.as_deref().unwrap_or_default();
        if !self.auth.authenticate(token).await {
            return Dispatch::PassThrough(request, Rejection::Unauthenticated);
        }

        let scheme = match Scheme::from_host(&request.host) {
            Some(scheme) => scheme,
            None => return Dispatch::PassThrough(request, Rejection::UnknownScheme),
        };

        let peer = request.peer;
        let span = info_span!("session", %peer, %scheme);
        let stream = request.into_stream();

        async move {
            info!("handle {} connection from {}", scheme, peer);
            match self.relay(scheme, stream).await {
                Ok(()) => debug!("session closed"),
                Err(e) if e.is_dial() => warn!("upstream {} unreachable: {}", self.upstream, e),
                Err(e) => error!("handle {} error: {}", scheme, e),
            }
        }
        .instrument(span)
        .await;

        Dispatch::Handled
    }

    async fn relay(&self, scheme: Scheme, stream: TunnelStream) -> Result<(), RelayError> {
        match scheme {
            Scheme::Tcp => relay_tcp(stream, self.upstream, &self.socket_opts).await,
            Scheme::Udp => relay_udp(stream, self.upstream, self.udp_idle_timeout).await,
        }
    }
}

/// Resolve the upstream once, at startup
async fn resolve_upstream(addr: &str) -> Result<SocketAddr, RelayError> {
    tokio::net::lookup_host(addr)
        .await
        .map_err(|e| RelayError::Config(format!("Failed to resolve upstream {}: {}", addr, e)))?
        .next()
        .ok_or_else(|| RelayError::Config(format!("Upstream {} resolved to no address", addr)))
}
