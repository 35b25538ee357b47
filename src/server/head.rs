//! HTTP/1.x request head parsing
//!
//! Only what the tunnel handler needs: method, target host and the
//! `Proxy-Authorization` header. Bytes that arrive after the head belong
//! to the tunnel and are returned to the caller untouched.

use anyhow::{bail, Context, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest request head accepted
pub const MAX_HEAD_LEN: usize = 8192;

const HEAD_END: &[u8] = b"\r\n\r\n";

/// Parsed request line and the headers the relay cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method
    pub method: String,
    /// Request target as sent
    pub target: String,
    /// Target host: the authority for CONNECT, else the Host header
    pub host: String,
    /// `Proxy-Authorization` header value
    pub proxy_authorization: Option<String>,
}

impl RequestHead {
    /// Parse a complete head, terminator included or not
    pub fn parse(head: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(head).context("Request head is not valid UTF-8")?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split(' ');
        let (method, target, version) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(m), Some(t), Some(v), None) if !m.is_empty() && !t.is_empty() => (m, t, v),
                _ => bail!("Malformed request line: {:?}", request_line),
            };
        if !version.starts_with("HTTP/1.") {
            bail!("Unsupported HTTP version: {}", version);
        }

        let mut host_header = None;
        let mut proxy_authorization = None;
        for line in lines.filter(|line| !line.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .with_context(|| format!("Malformed header line: {:?}", line))?;
            let value = value.trim().to_string();
            if name.eq_ignore_ascii_case("host") {
                host_header = Some(value);
            } else if name.eq_ignore_ascii_case("proxy-authorization") {
                proxy_authorization = Some(value);
            }
        }

        let host = if method == "CONNECT" {
            target.to_string()
        } else {
            host_header.unwrap_or_else(|| target.to_string())
        };

        Ok(RequestHead {
            method: method.to_string(),
            target: target.to_string(),
            host,
            proxy_authorization,
        })
    }
}

/// Read one request head, returning it with any bytes read past its end
pub async fn read_request_head<R>(reader: &mut R) -> Result<(RequestHead, Bytes)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(pos) = buf.windows(HEAD_END.len()).position(|w| w == HEAD_END) {
            let head = buf.split_to(pos + HEAD_END.len());
            return Ok((RequestHead::parse(&head)?, buf.freeze()));
        }
        if buf.len() >= MAX_HEAD_LEN {
            bail!("Request head exceeds {} bytes", MAX_HEAD_LEN);
        }
        if reader.read_buf(&mut buf).await? == 0 {
            bail!("Connection closed before the request head was complete");
        }
    }
}
