//! TCP relay engine
//!
//! Copies bytes between a tunnel stream and a freshly dialed upstream
//! socket. The client->upstream direction runs on a spawned worker, the
//! upstream->client direction on the caller's task.

use super::{half_close, join_worker, SessionResult};
use crate::error::RelayError;
use crate::helper::{is_benign, SocketOpts};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Dial `upstream` and relay `client` through it.
///
/// A dial failure or timeout is returned as [`RelayError::Dial`] without
/// retrying.
pub async fn relay_tcp<S>(client: S, upstream: SocketAddr, opts: &SocketOpts) -> SessionResult
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let upstream = tokio::time::timeout(opts.connect_timeout, TcpStream::connect(upstream))
        .await
        .map_err(|_| RelayError::Dial(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))?
        .map_err(RelayError::Dial)?;

    if let Err(e) = opts.apply(&upstream) {
        warn!("Failed to apply socket options: {}", e);
    }

    relay_tcp_stream(client, upstream).await
}

/// Relay between `client` and an already connected upstream socket.
///
/// Returns only once both directions have stopped. A direction that ends
/// cleanly half-closes its destination so the other one keeps draining;
/// a direction that fails cancels the other one.
pub async fn relay_tcp_stream<S>(client: S, upstream: TcpStream) -> SessionResult
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_rd, client_wr) = tokio::io::split(client);
    let (upstream_rd, upstream_wr) = upstream.into_split();

    let cancel = CancellationToken::new();
    // Dropping the session stops the worker and releases both sockets.
    let _guard = cancel.clone().drop_guard();
    let (tx, rx) = oneshot::channel();

    let worker_cancel = cancel.clone();
    tokio::spawn(async move {
        let result = forward(client_rd, upstream_wr, &worker_cancel, "client->upstream").await;
        let _ = tx.send(result);
    });

    let result = forward(upstream_rd, client_wr, &cancel, "upstream->client").await;
    if result.is_err() {
        cancel.cancel();
    }

    let worker = join_worker(rx).await;
    result.and(worker)
}

/// Copy one direction until end of stream, cancellation, or failure.
async fn forward<R, W>(
    mut reader: R,
    mut writer: W,
    cancel: &CancellationToken,
    direction: &'static str,
) -> SessionResult
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::select! {
        _ = cancel.cancelled() => {
            debug!("{} cancelled", direction);
            Ok(None)
        }
        result = tokio::io::copy(&mut reader, &mut writer) => result.map(Some),
    };

    match copied {
        Ok(bytes) => {
            if let Some(bytes) = bytes {
                debug!("{} finished: {} bytes", direction, bytes);
            }
            half_close(&mut writer, direction).await;
            Ok(())
        }
        Err(e) if is_benign(&e) => {
            debug!("{} ended: {}", direction, e);
            half_close(&mut writer, direction).await;
            Ok(())
        }
        Err(e) => {
            debug!("{} error: {}", direction, e);
            cancel.cancel();
            Err(RelayError::Transport(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::tests::BrokenClient;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn upstream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (connected.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_relay_tcp_dial_failure() {
        // Reserve a port, then free it so nothing listens there
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (client, _peer) = duplex(1024);
        let result = relay_tcp(client, addr, &SocketOpts::default()).await;
        assert!(matches!(result, Err(RelayError::Dial(_))));
    }

    #[tokio::test]
    async fn test_relay_tcp_half_close_then_reply() {
        let (local, mut remote) = upstream_pair().await;
        let (mut client, relay_side) = duplex(1024);

        let relay = tokio::spawn(relay_tcp_stream(relay_side, local));

        client.write_all(b"request").await.unwrap();
        client.shutdown().await.unwrap();

        let mut received = Vec::new();
        remote.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"request");

        remote.write_all(b"response").await.unwrap();
        remote.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"response");

        let result = tokio::time::timeout(Duration::from_secs(2), relay).await;
        assert!(result.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_relay_tcp_upstream_closes_first() {
        let (local, mut remote) = upstream_pair().await;
        let (mut client, relay_side) = duplex(1024);

        let relay = tokio::spawn(relay_tcp_stream(relay_side, local));

        remote.write_all(b"banner").await.unwrap();
        remote.shutdown().await.unwrap();

        let mut banner = Vec::new();
        client.read_to_end(&mut banner).await.unwrap();
        assert_eq!(banner, b"banner");

        // Client side keeps sending after the upstream finished writing
        client.write_all(b"late").await.unwrap();
        client.shutdown().await.unwrap();

        let mut received = Vec::new();
        remote.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"late");

        let result = tokio::time::timeout(Duration::from_secs(2), relay).await;
        assert!(result.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_relay_tcp_large_transfer() {
        let (local, mut remote) = upstream_pair().await;
        let (mut client, relay_side) = duplex(65536);

        let relay = tokio::spawn(relay_tcp_stream(relay_side, local));

        let payload = vec![0xAB; 200_000];
        let expected = payload.clone();
        let sender = tokio::spawn(async move {
            client.write_all(&payload).await.unwrap();
            client.shutdown().await.unwrap();
            client
        });

        let mut received = Vec::new();
        remote.read_to_end(&mut received).await.unwrap();
        assert_eq!(received.len(), expected.len());
        assert_eq!(received, expected);

        drop(remote);
        let client = sender.await.unwrap();
        drop(client);

        let result = tokio::time::timeout(Duration::from_secs(2), relay).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_relay_tcp_upstream_reset() {
        let (local, remote) = upstream_pair().await;
        let (_client, relay_side) = duplex(1024);

        let relay = tokio::spawn(relay_tcp_stream(relay_side, local));

        // Linger of zero turns the close into an RST
        socket2::SockRef::from(&remote)
            .set_linger(Some(Duration::ZERO))
            .unwrap();
        drop(remote);

        let result = tokio::time::timeout(Duration::from_secs(2), relay)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(RelayError::Transport(_))));
    }

    #[tokio::test]
    async fn test_relay_tcp_client_read_error() {
        let (local, mut remote) = upstream_pair().await;

        let relay = tokio::spawn(relay_tcp_stream(BrokenClient, local));

        let result = tokio::time::timeout(Duration::from_secs(2), relay)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(RelayError::Transport(_))));

        // Upstream is released once the session fails
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(1), remote.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_session_releases_upstream() {
        let (local, mut remote) = upstream_pair().await;
        let (_client, relay_side) = duplex(1024);

        let relay = tokio::spawn(relay_tcp_stream(relay_side, local));
        tokio::time::sleep(Duration::from_millis(20)).await;
        relay.abort();

        let mut rest = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(1), remote.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_relay_tcp_returns_after_both_close() {
        let (local, remote) = upstream_pair().await;
        let (client, relay_side) = duplex(1024);

        let relay = tokio::spawn(relay_tcp_stream(relay_side, local));

        drop(client);
        drop(remote);

        let result = tokio::time::timeout(Duration::from_secs(2), relay).await;
        assert!(result.is_ok());
    }
}
