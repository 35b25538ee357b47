//! Authentication for tunnel requests
//!
//! Clients present a token derived from their secret in the
//! `Proxy-Authorization` header. Valid tokens come from statically
//! configured secrets and from the directory service.

mod cache;
mod directory;
mod token;

pub use cache::AuthCache;
pub use directory::{Directory, DirectorySnapshot, DirectoryUser, OutlineDirectory};
pub use token::{gen_key, TOKEN_LEN};
