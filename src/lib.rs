//! # Sockrelay - TCP/UDP relay over CONNECT tunnels
//!
//! Sockrelay sits behind an HTTP front end and turns authenticated
//! `CONNECT` requests into relay sessions to one fixed upstream, usually a
//! local Shadowsocks (Outline) server. The target host's prefix picks the
//! engine: `tcp.` forwards a byte stream, `udp.` carries datagrams as
//! length-prefixed frames over the tunnel.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sockrelay::config::load_config;
//! use sockrelay::server::run_server;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     run_server(config, shutdown_rx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Client -> HTTP front end -> TunnelHandler -> relay engine -> Upstream
//! ```
//!
//! Credentials are `Proxy-Authorization` tokens derived from user
//! passwords. Unknown tokens trigger a rate-limited refresh from the
//! Outline management API before the request is refused.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod helper;
pub mod relay;
pub mod server;
pub mod stream;

// Re-export commonly used items
pub use auth::{gen_key, AuthCache};
pub use config::{load_config, Config};
pub use error::RelayError;
pub use handler::{Dispatch, TunnelHandler, TunnelRequest};
pub use server::run_server;
pub use stream::TunnelStream;

/// Version of the Sockrelay library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
