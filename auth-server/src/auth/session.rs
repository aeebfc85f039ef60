// auth-server/src/auth/session.rs
//! Self-verifying session tokens.
//!
//! `token = base64url(JSON(payload)) + "." + hex(HMAC-SHA256(secret, JSON(payload)))`
//!
//! Validation needs nothing but the secret. When no secret is configured one is
//! generated per process, so tokens stop validating after a restart and cannot
//! be shared between replicas. Configure `auth.session_secret` in production.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Duration;
use common::models::session::SessionPayload;
use dashmap::DashMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use super::address::derive_wallet_hash;
use super::error::StoreError;
use crate::utils::time_source::TimeSource;
use crate::utils::token::{encode_base64url, generate_secret};

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum SessionTokenError {
    #[error("Malformed session token")]
    Malformed,
    #[error("Session token signature mismatch")]
    BadSignature,
    #[error("Session expired")]
    Expired,
    #[error("Session payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),
}

pub struct SessionTokenCodec {
    secret: Vec<u8>,
    time_source: Arc<dyn TimeSource>,
}

impl SessionTokenCodec {
    pub fn new(secret: Vec<u8>, time_source: Arc<dyn TimeSource>) -> Self {
        Self { secret, time_source }
    }

    /// Use the operator secret when set, otherwise a random per-process one
    pub fn from_config(secret: Option<&str>, time_source: Arc<dyn TimeSource>) -> Self {
        match secret.filter(|s| !s.is_empty()) {
            Some(secret) => Self::new(secret.as_bytes().to_vec(), time_source),
            None => {
                tracing::warn!(
                    "No session secret configured; using an ephemeral one. Sessions will not survive a restart"
                );
                Self::new(generate_secret(), time_source)
            }
        }
    }

    /// Build a fresh payload for `address` valid for `ttl`
    pub fn mint(&self, address: &str, caps: Vec<String>, ttl: Duration) -> SessionPayload {
        let iat = self.time_source.now_millis();
        // exp must stay strictly after iat
        let exp = iat + ttl.num_milliseconds().max(1);

        SessionPayload {
            sid: Uuid::new_v4().to_string(),
            addr: address.to_string(),
            wallet_hash: derive_wallet_hash(address),
            iat,
            exp,
            caps,
        }
    }

    pub fn sign(&self, payload: &SessionPayload) -> Result<String, SessionTokenError> {
        let json = serde_json::to_vec(payload)?;
        let mac = self.mac(&json).finalize().into_bytes();
        Ok(format!("{}.{}", encode_base64url(&json), hex::encode(mac)))
    }

    /// Payload of a genuine, unexpired token
    pub fn verify(&self, token: &str) -> Option<SessionPayload> {
        self.decode(token).ok()
    }

    pub fn decode(&self, token: &str) -> Result<SessionPayload, SessionTokenError> {
        let payload = self.decode_ignoring_expiry(token)?;
        if payload.is_expired(self.time_source.now_millis()) {
            return Err(SessionTokenError::Expired);
        }
        Ok(payload)
    }

    /// Authenticity check only. Used by logout, which must also accept expired tokens.
    pub fn decode_ignoring_expiry(&self, token: &str) -> Result<SessionPayload, SessionTokenError> {
        let (encoded, signature) = token.trim().split_once('.').ok_or(SessionTokenError::Malformed)?;
        let json = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|_| SessionTokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| SessionTokenError::BadSignature)?;

        self.mac(&json)
            .verify_slice(&signature)
            .map_err(|_| SessionTokenError::BadSignature)?;

        Ok(serde_json::from_slice(&json)?)
    }

    fn mac(&self, data: &[u8]) -> HmacSha256 {
        // HMAC accepts keys of any length
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!("HMAC key of any size is valid"));
        mac.update(data);
        mac
    }
}

/// Server-side record of issued sessions, consulted only when revocation is enforced
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn record(&self, sid: &str, expires_at: i64) -> Result<(), StoreError>;

    async fn is_active(&self, sid: &str, now_ms: i64) -> Result<bool, StoreError>;

    /// Returns whether a live entry was removed
    async fn revoke(&self, sid: &str) -> Result<bool, StoreError>;

    async fn purge_expired(&self, now_ms: i64) -> Result<usize, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    // sid -> exp
    sessions: DashMap<String, i64>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn record(&self, sid: &str, expires_at: i64) -> Result<(), StoreError> {
        self.sessions.insert(sid.to_string(), expires_at);
        Ok(())
    }

    async fn is_active(&self, sid: &str, now_ms: i64) -> Result<bool, StoreError> {
        Ok(self
            .sessions
            .get(sid)
            .map(|exp| *exp.value() > now_ms)
            .unwrap_or(false))
    }

    async fn revoke(&self, sid: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.remove(sid).is_some())
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        let before = self.sessions.len();
        self.sessions.retain(|_, exp| *exp > now_ms);
        Ok(before.saturating_sub(self.sessions.len()))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.sessions.len())
    }
}
