//! Tunnel request types

use crate::stream::{BodyReader, HijackedSocket, RawConn, ResponseSink, StreamPair, TunnelStream};
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};

/// Connection shape the host hands over with a request
pub enum HostConnection {
    /// HTTP/1.x: the raw socket plus whatever the host already buffered
    Hijacked {
        /// The hijacked socket
        socket: Box<dyn HijackedSocket>,
        /// Bytes read past the request head
        buffered: Bytes,
    },
    /// HTTP/2 and HTTP/3: request body in, response sink out
    Streams {
        /// Request body
        body: BodyReader,
        /// Response sink
        sink: ResponseSink,
    },
}

impl HostConnection {
    /// Hijacked-socket connection
    pub fn hijacked<S>(socket: S, buffered: Bytes) -> Self
    where
        S: HijackedSocket + 'static,
    {
        HostConnection::Hijacked {
            socket: Box::new(socket),
            buffered,
        }
    }

    /// Body/sink connection
    pub fn streams<R, W>(body: R, sink: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        HostConnection::Streams {
            body: Box::new(body),
            sink: Box::new(sink),
        }
    }
}

impl fmt::Debug for HostConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostConnection::Hijacked { socket, buffered } => f
                .debug_struct("Hijacked")
                .field("socket", socket)
                .field("buffered", &buffered.len())
                .finish(),
            HostConnection::Streams { .. } => f.debug_struct("Streams").finish_non_exhaustive(),
        }
    }
}

/// An inbound request as delivered by the host
#[derive(Debug)]
pub struct TunnelRequest {
    /// HTTP method
    pub method: String,
    /// Target host, carrying the scheme prefix
    pub host: String,
    /// `Proxy-Authorization` header value
    pub proxy_authorization: Option<String>,
    /// Remote address of the client
    pub peer: SocketAddr,
    /// The connection to relay over
    pub connection: HostConnection,
}

impl TunnelRequest {
    /// Whether this is a CONNECT request
    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }

    /// Adapt the host connection into a tunnel stream
    pub fn into_stream(self) -> TunnelStream {
        match self.connection {
            HostConnection::Hijacked { socket, buffered } => {
                TunnelStream::Raw(RawConn::from_boxed(socket, buffered))
            }
            HostConnection::Streams { body, sink } => {
                TunnelStream::Pair(StreamPair::new(body, sink))
            }
        }
    }
}

/// Relay engine requested through the target host prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `tcp.` prefix
    Tcp,
    /// `udp.` prefix
    Udp,
}

impl Scheme {
    /// Read the scheme from the first four bytes of `host`.
    ///
    /// Hosts shorter than the prefix carry no scheme.
    pub fn from_host(host: &str) -> Option<Self> {
        match host.as_bytes().get(..4) {
            Some(b"tcp.") => Some(Scheme::Tcp),
            Some(b"udp.") => Some(Scheme::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Tcp => write!(f, "tcp"),
            Scheme::Udp => write!(f, "udp"),
        }
    }
}

/// Why a request was handed back to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Not a CONNECT request
    NotTunnel,
    /// Missing or unknown credential
    Unauthenticated,
    /// Target host has no `tcp.` / `udp.` prefix
    UnknownScheme,
}
