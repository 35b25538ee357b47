//! Request-body / response-sink stream pair
//!
//! Used when the host cannot hand over a raw socket (HTTP/2 and HTTP/3).
//! The sink only delivers what has been flushed, so every write flushes.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Boxed request body
pub type BodyReader = Box<dyn AsyncRead + Unpin + Send>;

/// Boxed response sink
pub type ResponseSink = Box<dyn AsyncWrite + Unpin + Send>;

/// Stream over a request body and a response sink
pub struct StreamPair {
    body: BodyReader,
    sink: ResponseSink,
    /// Bytes accepted by the sink and awaiting their flush
    pending: Option<usize>,
}

impl StreamPair {
    /// Join a request body and a response sink into one stream
    pub fn new<R, W>(body: R, sink: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        StreamPair {
            body: Box::new(body),
            sink: Box::new(sink),
            pending: None,
        }
    }
}

impl fmt::Debug for StreamPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamPair")
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for StreamPair {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().body).poll_read(cx, buf)
    }
}

impl AsyncWrite for StreamPair {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.pending.is_none() {
            let n = ready!(Pin::new(&mut this.sink).poll_write(cx, buf))?;
            this.pending = Some(n);
        }
        let flushed = ready!(Pin::new(&mut this.sink).poll_flush(cx));
        let n = this.pending.take().unwrap_or_default();
        Poll::Ready(flushed.map(|_| n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().sink).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "response sink cannot close its write side",
        )))
    }
}
