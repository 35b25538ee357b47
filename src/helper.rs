//! Helper utilities for Sockrelay
//!
//! This module provides common constants, socket options and the
//! benign-shutdown classification shared by both relay engines.

use crate::config::TcpConfig;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

/// Default UDP idle timeout in seconds
pub const DEFAULT_UDP_IDLE_TIMEOUT_SECS: u64 = 180;

/// Default minimum spacing between two directory refreshes, in milliseconds
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1000;

/// Status line written on a hijacked connection before the first payload byte
pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Whether an I/O error only means "this direction is over".
///
/// End of stream and timeouts end a direction without failing the session.
pub fn is_benign(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::TimedOut
    )
}

/// Socket options applied to dialed upstream connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
    /// Give up dialing after this long
    pub connect_timeout: Duration,
}

impl Default for SocketOpts {
    fn default() -> Self {
        Self::from_tcp_config(&TcpConfig::default())
    }
}

impl SocketOpts {
    /// Create socket options from TCP config
    pub fn from_tcp_config(config: &TcpConfig) -> Self {
        SocketOpts {
            nodelay: config.nodelay,
            keepalive_secs: Some(config.keepalive_secs),
            keepalive_interval: Some(config.keepalive_interval),
            connect_timeout: Duration::from_secs(config.connect_timeout),
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}
