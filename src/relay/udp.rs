//! UDP relay engine
//!
//! Translates length-prefixed frames on a tunnel stream into datagrams
//! sent to the fixed upstream, and upstream datagrams back into frames.
//! The session ends on stream end, on a genuine failure in either
//! direction, or when the upstream stays silent for the idle timeout.

use super::frame::{put_header, read_frame, FRAME_HEADER_LEN, MAX_FRAME_LEN};
use super::{join_worker, SessionResult};
use crate::error::RelayError;
use crate::helper::is_benign;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Open a UDP socket connected to `upstream` and relay `client` through it.
pub async fn relay_udp<S>(client: S, upstream: SocketAddr, idle_timeout: Duration) -> SessionResult
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let bind: SocketAddr = if upstream.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind).await.map_err(RelayError::Dial)?;
    socket.connect(upstream).await.map_err(RelayError::Dial)?;

    relay_udp_socket(client, socket, idle_timeout).await
}

/// Relay `client` through a UDP socket already connected to the upstream.
pub async fn relay_udp_socket<S>(client: S, socket: UdpSocket, idle_timeout: Duration) -> SessionResult
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let socket = Arc::new(socket);
    let (client_rd, client_wr) = tokio::io::split(client);

    let cancel = CancellationToken::new();
    // Dropping the session stops the worker and releases the socket.
    let _guard = cancel.clone().drop_guard();
    let (tx, rx) = oneshot::channel();

    let worker_socket = socket.clone();
    let worker_cancel = cancel.clone();
    tokio::spawn(async move {
        let result = frames_to_datagrams(client_rd, &worker_socket, &worker_cancel).await;
        // Whatever ended this direction ends the session.
        worker_cancel.cancel();
        let _ = tx.send(classify(result, "client->upstream"));
    });

    let result = datagrams_to_frames(client_wr, &socket, idle_timeout, &cancel).await;
    cancel.cancel();

    let result = classify(result, "upstream->client");
    let worker = join_worker(rx).await;
    result.and(worker)
}

/// Read frames from the stream and send each payload as one datagram.
async fn frames_to_datagrams<R>(
    mut reader: R,
    socket: &UdpSocket,
    cancel: &CancellationToken,
) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; MAX_FRAME_LEN];
    loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = read_frame(&mut reader, &mut buf) => result?,
        };
        socket.send(&buf[..n]).await?;
    }
}

/// Receive upstream datagrams and write each one to the stream as a frame.
async fn datagrams_to_frames<W>(
    mut writer: W,
    socket: &UdpSocket,
    idle_timeout: Duration,
    cancel: &CancellationToken,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; FRAME_HEADER_LEN + MAX_FRAME_LEN];
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = tokio::time::timeout(idle_timeout, socket.recv(&mut buf[FRAME_HEADER_LEN..])) => result,
        };
        let n = match received {
            Ok(result) => result?,
            Err(_) => {
                debug!("UDP relay idle for {:?}, closing", idle_timeout);
                return Ok(());
            }
        };

        put_header(&mut buf, n)?;
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = writer.write_all(&buf[..FRAME_HEADER_LEN + n]) => result?,
        }
    }
}

fn classify(result: io::Result<()>, direction: &str) -> SessionResult {
    match result {
        Ok(()) => Ok(()),
        Err(e) if is_benign(&e) => {
            debug!("{} ended: {}", direction, e);
            Ok(())
        }
        Err(e) => {
            debug!("{} error: {}", direction, e);
            Err(RelayError::Transport(e))
        }
    }
}
