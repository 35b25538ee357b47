//! Credential token derivation
//!
//! A secret becomes the `Proxy-Authorization` value a client presents:
//! `"Basic " + base64(hex(sha224(secret)))`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha224};

/// Length of every derived token.
///
/// 6 bytes of `"Basic "` plus the base64 form of 56 hex characters.
pub const TOKEN_LEN: usize = 82;

/// Derive the token for `secret`
///
/// # Example
///
/// ```
/// use sockrelay::auth::{gen_key, TOKEN_LEN};
///
/// let token = gen_key("Test1234");
/// assert!(token.starts_with("Basic "));
/// assert_eq!(token.len(), TOKEN_LEN);
/// ```
pub fn gen_key(secret: &str) -> String {
    let digest = Sha224::digest(secret.as_bytes());
    let hex = format!("{:x}", digest);
    format!("Basic {}", STANDARD.encode(hex))
}
