//! Relay engines
//!
//! Both engines run one direction on a spawned worker and the other on
//! the calling task, share a [`CancellationToken`](tokio_util::sync::CancellationToken)
//! so a failing direction can wake its peer, and hand the worker's result
//! back over a oneshot channel. Neither engine returns before the worker
//! has finished.

pub mod frame;
mod tcp;
mod udp;

pub use frame::{encode_frame, read_frame, FRAME_HEADER_LEN, MAX_FRAME_LEN};
pub use tcp::{relay_tcp, relay_tcp_stream};
pub use udp::{relay_udp, relay_udp_socket};

use crate::error::RelayError;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome of one relay session: the first fatal error, if any
pub type SessionResult = Result<(), RelayError>;

/// Wait for the worker direction to report.
///
/// A worker that went away without reporting (it panicked) counts as a
/// transport failure.
async fn join_worker(rx: oneshot::Receiver<SessionResult>) -> SessionResult {
    rx.await.unwrap_or_else(|_| {
        Err(RelayError::Transport(io::Error::new(
            io::ErrorKind::Other,
            "relay worker exited without a result",
        )))
    })
}

/// Signal "no more data" to the destination of a finished direction.
///
/// Destinations that cannot half-close are left open; the session
/// teardown closes them.
async fn half_close<W>(writer: &mut W, direction: &str)
where
    W: AsyncWrite + Unpin,
{
    match writer.shutdown().await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::Unsupported => {
            debug!("{}: destination cannot half-close", direction);
        }
        Err(e) => debug!("{}: half-close failed: {}", direction, e),
    }
}
