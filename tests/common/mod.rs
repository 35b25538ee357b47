//! Test utilities shared by the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use sockrelay::config::{ServerConfig, TcpConfig};
use sockrelay::handler::{HostConnection, TunnelRequest};
use std::net::SocketAddr;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, UdpSocket};

/// Create a pair of connected duplex streams for testing
pub fn create_mock_stream_pair() -> (DuplexStream, DuplexStream) {
    duplex(64 * 1024)
}

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// TCP upstream that echoes one connection back after the client's EOF
pub async fn spawn_tcp_echo() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut data = Vec::new();
        conn.read_to_end(&mut data).await.unwrap();
        conn.write_all(&data).await.unwrap();
    });
    addr
}

/// UDP upstream that echoes every datagram to its sender
pub async fn spawn_udp_echo() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 65535];
        while let Ok((n, from)) = socket.recv_from(&mut buf).await {
            if socket.send_to(&buf[..n], from).await.is_err() {
                break;
            }
        }
    });
    addr
}

/// CONNECT request over a hijacked duplex socket; returns the client side
pub fn hijacked_request(host: &str, token: Option<String>) -> (TunnelRequest, DuplexStream) {
    let (client, socket) = create_mock_stream_pair();
    let request = TunnelRequest {
        method: "CONNECT".to_string(),
        host: host.to_string(),
        proxy_authorization: token,
        peer: "127.0.0.1:40000".parse().unwrap(),
        connection: HostConnection::hijacked(socket, Bytes::new()),
    };
    (request, client)
}

/// CONNECT request over a body/sink pair; returns the client's writer and reader
pub fn streams_request(
    host: &str,
    token: Option<String>,
) -> (TunnelRequest, DuplexStream, DuplexStream) {
    let (body_writer, body) = create_mock_stream_pair();
    let (sink, response) = create_mock_stream_pair();
    let request = TunnelRequest {
        method: "CONNECT".to_string(),
        host: host.to_string(),
        proxy_authorization: token,
        peer: "127.0.0.1:40001".parse().unwrap(),
        connection: HostConnection::streams(body, sink),
    };
    (request, body_writer, response)
}

/// Test configuration builder
pub struct TestConfigBuilder {
    upstream: Option<String>,
    users: Vec<String>,
    udp_idle_timeout: u64,
    refresh_interval: u64,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        TestConfigBuilder {
            upstream: Some("127.0.0.1:8388".to_string()),
            users: vec!["Test1234".to_string()],
            udp_idle_timeout: 180,
            refresh_interval: 1000,
        }
    }
}

impl TestConfigBuilder {
    /// Create a new test config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the upstream address
    pub fn upstream(mut self, addr: SocketAddr) -> Self {
        self.upstream = Some(addr.to_string());
        self
    }

    /// Replace the static users
    pub fn users(mut self, users: &[&str]) -> Self {
        self.users = users.iter().map(|u| u.to_string()).collect();
        self
    }

    /// Set the UDP idle timeout in seconds
    pub fn udp_idle_timeout(mut self, secs: u64) -> Self {
        self.udp_idle_timeout = secs;
        self
    }

    /// Set the refresh interval in milliseconds
    pub fn refresh_interval(mut self, millis: u64) -> Self {
        self.refresh_interval = millis;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            listen: "127.0.0.1:0".to_string(),
            upstream: self.upstream,
            directory: None,
            users: self.users,
            udp_idle_timeout: self.udp_idle_timeout,
            refresh_interval: self.refresh_interval,
            tcp: TcpConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_mock_stream_pair() {
        let (mut a, mut b) = create_mock_stream_pair();

        a.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_config_builder() {
        let config = TestConfigBuilder::new()
            .users(&["a", "b"])
            .udp_idle_timeout(5)
            .refresh_interval(10)
            .build();

        assert_eq!(config.users, vec!["a", "b"]);
        assert_eq!(config.udp_idle_timeout, 5);
        assert_eq!(config.refresh_interval, 10);
        assert!(config.validate().is_ok());
    }
}
