//! Stream adapter
//!
//! The host hands over a tunnel request in one of two shapes: a hijacked
//! socket (HTTP/1.1) or a request-body / response-sink pair (HTTP/2 and
//! HTTP/3). [`TunnelStream`] turns either shape into one bidirectional
//! stream. `poll_shutdown` is the half-close operation: it closes the
//! write side only, and fails with [`std::io::ErrorKind::Unsupported`]
//! on variants that cannot express it.

mod pair;
mod raw;

pub use pair::{BodyReader, ResponseSink, StreamPair};
pub use raw::RawConn;

use crate::error::RelayError;
use bytes::Bytes;
use std::fmt::Debug;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::net::TcpStream;

/// A socket the host has given up control of.
pub trait HijackedSocket: AsyncRead + AsyncWrite + Unpin + Send + Debug {
    /// Whether `poll_shutdown` closes only the write side of this socket
    fn supports_half_close(&self) -> bool;
}

impl HijackedSocket for TcpStream {
    fn supports_half_close(&self) -> bool {
        true
    }
}

impl HijackedSocket for DuplexStream {
    fn supports_half_close(&self) -> bool {
        true
    }
}

/// Bidirectional stream for one accepted tunnel request
#[derive(Debug)]
pub enum TunnelStream {
    /// Hijacked socket plus the host's read-ahead bytes
    Raw(RawConn),
    /// Request body and flushed response sink
    Pair(StreamPair),
}

impl TunnelStream {
    /// Build the raw-socket variant
    pub fn hijacked<S>(socket: S, buffered: Bytes) -> Self
    where
        S: HijackedSocket + 'static,
    {
        TunnelStream::Raw(RawConn::new(socket, buffered))
    }

    /// Build the stream-pair variant
    pub fn streams<R, W>(body: R, sink: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        TunnelStream::Pair(StreamPair::new(body, sink))
    }

    /// Whether this stream can close its write side independently
    pub fn supports_half_close(&self) -> bool {
        match self {
            TunnelStream::Raw(conn) => conn.supports_half_close(),
            TunnelStream::Pair(_) => false,
        }
    }

    /// Close the write side, keeping the read side open
    pub async fn close_write(&mut self) -> Result<(), RelayError> {
        self.shutdown().await.map_err(|e| match e.kind() {
            io::ErrorKind::Unsupported => RelayError::Capability(e.to_string()),
            _ => RelayError::Transport(e),
        })
    }

    /// Flush whatever is pending and release the stream
    pub async fn close(mut self) -> io::Result<()> {
        self.flush().await
    }
}

impl AsyncRead for TunnelStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TunnelStream::Raw(conn) => Pin::new(conn).poll_read(cx, buf),
            TunnelStream::Pair(pair) => Pin::new(pair).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TunnelStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            TunnelStream::Raw(conn) => Pin::new(conn).poll_write(cx, buf),
            TunnelStream::Pair(pair) => Pin::new(pair).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TunnelStream::Raw(conn) => Pin::new(conn).poll_flush(cx),
            TunnelStream::Pair(pair) => Pin::new(pair).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            TunnelStream::Raw(conn) => Pin::new(conn).poll_shutdown(cx),
            TunnelStream::Pair(pair) => Pin::new(pair).poll_shutdown(cx),
        }
    }
}
