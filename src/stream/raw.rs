//! Hijacked raw-socket stream
//!
//! Wraps a socket taken over from the host together with any bytes the
//! host's request parser had already buffered.

use super::HijackedSocket;
use crate::helper::CONNECT_ESTABLISHED;
use bytes::{Buf, Bytes};
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Stream over a hijacked socket.
///
/// Reads drain the host's read-ahead bytes before touching the socket.
/// The first write emits the `200 Connection Established` status line
/// ahead of any payload.
pub struct RawConn {
    socket: Box<dyn HijackedSocket>,
    buffered: Bytes,
    /// Status-line bytes not yet written
    ack: &'static [u8],
}

impl RawConn {
    /// Wrap a hijacked socket and its read-ahead bytes
    pub fn new<S>(socket: S, buffered: Bytes) -> Self
    where
        S: HijackedSocket + 'static,
    {
        Self::from_boxed(Box::new(socket), buffered)
    }

    /// Wrap an already boxed hijacked socket
    pub fn from_boxed(socket: Box<dyn HijackedSocket>, buffered: Bytes) -> Self {
        RawConn {
            socket,
            buffered,
            ack: CONNECT_ESTABLISHED,
        }
    }

    /// Whether the status line has been fully written
    pub fn is_acknowledged(&self) -> bool {
        self.ack.is_empty()
    }

    /// Number of read-ahead bytes not yet consumed
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }

    /// Whether the underlying socket can close only its write side
    pub fn supports_half_close(&self) -> bool {
        self.socket.supports_half_close()
    }

    fn poll_write_ack(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while !self.ack.is_empty() {
            let ack = self.ack;
            let n = ready!(Pin::new(&mut self.socket).poll_write(cx, ack))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.ack = &ack[n..];
        }
        Poll::Ready(Ok(()))
    }
}

impl fmt::Debug for RawConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawConn")
            .field("socket", &self.socket)
            .field("buffered", &self.buffered.len())
            .field("acknowledged", &self.is_acknowledged())
            .finish()
    }
}

impl AsyncRead for RawConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.buffered.is_empty() {
            let n = this.buffered.len().min(buf.remaining());
            buf.put_slice(&this.buffered[..n]);
            this.buffered.advance(n);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.socket).poll_read(cx, buf)
    }
}

impl AsyncWrite for RawConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_write_ack(cx))?;
        Pin::new(&mut this.socket).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().socket).poll_flush(cx)
    }

    /// Half-close: the socket's write side is shut down, reads stay open.
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.socket.supports_half_close() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "hijacked socket cannot close its write side",
            )));
        }
        // A client that never received data still needs the status line.
        ready!(this.poll_write_ack(cx))?;
        Pin::new(&mut this.socket).poll_shutdown(cx)
    }
}
