// auth-server/src/lib.rs
//! Wallet challenge/response authentication.
//!
//! A wallet asks for a nonce, signs the returned challenge message with its
//! private key, and exchanges the signature for an HMAC-signed session token
//! carried in a cookie.

pub mod api;
pub mod auth;
pub mod housekeeping;
pub mod middleware;
pub mod utils;

pub use auth::{AuthError, AuthService, VerifiedSession};
