//! Minimal HTTP/1.1 CONNECT front end
//!
//! Accepts plain TCP connections, reads one request head, and hands the
//! hijacked socket to the [`TunnelHandler`]. Anything the handler passes
//! back is answered with `404 Not Found` and closed, so a probe cannot
//! tell the relay from an ordinary web server.

mod head;

pub use head::{read_request_head, RequestHead, MAX_HEAD_LEN};

use crate::config::Config;
use crate::handler::{Dispatch, HostConnection, TunnelHandler, TunnelRequest};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Response for every request the handler does not take
const NOT_FOUND: &[u8] = b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Time a client gets to send its request head
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Provision the handler, bind the listener, and serve until shutdown
pub async fn run_server(config: Config, shutdown: broadcast::Receiver<bool>) -> Result<()> {
    let mut server = config.server;
    server.apply_env();

    let handler = TunnelHandler::provision(&server)
        .await
        .context("Failed to provision tunnel handler")?;

    let listener = TcpListener::bind(&server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", server.listen))?;
    info!("Listening on {}", listener.local_addr()?);

    serve(listener, Arc::new(handler), shutdown).await
}

/// Accept connections on `listener` until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    handler: Arc<TunnelHandler>,
    mut shutdown: broadcast::Receiver<bool>,
) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (conn, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(handler, conn, peer).await {
                        debug!("Connection from {} dropped: {:#}", peer, e);
                    }
                });
            }
            _ = shutdown.recv() => {
                info!("Shutting down listener");
                break;
            }
        }
    }
    Ok(())
}

async fn handle_connection(
    handler: Arc<TunnelHandler>,
    mut conn: TcpStream,
    peer: SocketAddr,
) -> Result<()> {
    let (head, buffered) = tokio::time::timeout(HEAD_TIMEOUT, read_request_head(&mut conn))
        .await
        .context("Timed out reading request head")??;

    let request = TunnelRequest {
        method: head.method,
        host: head.host,
        proxy_authorization: head.proxy_authorization,
        peer,
        connection: HostConnection::hijacked(conn, buffered),
    };

    match handler.serve(request).await {
        Dispatch::Handled => Ok(()),
        Dispatch::PassThrough(request, reason) => {
            debug!("Rejected request from {}: {:?}", peer, reason);
            if let HostConnection::Hijacked { mut socket, .. } = request.connection {
                socket.write_all(NOT_FOUND).await?;
                socket.shutdown().await?;
            }
            Ok(())
        }
    }
}
