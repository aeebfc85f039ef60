// auth-server/src/auth/nonce.rs
//! One live challenge per address.
//!
//! Issuing supersedes whatever was stored for the address before, so at most
//! one nonce is ever verifiable per address. Expired records are not swept here:
//! they are ignored at verify time and linger until overwritten, removed, or
//! purged by housekeeping.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::domain::canonicalize;
use super::error::StoreError;
use super::message::build_message;
use crate::utils::time_source::TimeSource;
use crate::utils::token::generate_nonce;

/// Default challenge lifetime
pub const DEFAULT_NONCE_TTL_SECONDS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRecord {
    pub nonce: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub message: String,
    /// Canonical domain the challenge was issued for
    pub domain: String,
}

impl NonceRecord {
    /// Valid up to and including `expires_at`
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms > self.expires_at
    }
}

/// Backing storage for challenges, keyed by claimed address.
///
/// Must be last-write-wins per key. A shared implementation (e.g. a TTL cache)
/// is required before running more than one server instance.
#[async_trait]
pub trait NonceStore: Send + Sync {
    async fn put(&self, address: &str, record: NonceRecord) -> Result<(), StoreError>;

    async fn get(&self, address: &str) -> Result<Option<NonceRecord>, StoreError>;

    async fn remove(&self, address: &str) -> Result<Option<NonceRecord>, StoreError>;

    /// Atomically remove the record for `address` only if it still holds `nonce`.
    /// Exactly one concurrent caller can take a given nonce.
    async fn take_if(&self, address: &str, nonce: &str) -> Result<Option<NonceRecord>, StoreError>;

    /// Drop every record expired at `now_ms`, returning how many were removed
    async fn purge_expired(&self, now_ms: i64) -> Result<usize, StoreError>;

    async fn len(&self) -> Result<usize, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryNonceStore {
    records: DashMap<String, NonceRecord>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn put(&self, address: &str, record: NonceRecord) -> Result<(), StoreError> {
        self.records.insert(address.to_string(), record);
        Ok(())
    }

    async fn get(&self, address: &str) -> Result<Option<NonceRecord>, StoreError> {
        Ok(self.records.get(address).map(|entry| entry.value().clone()))
    }

    async fn remove(&self, address: &str) -> Result<Option<NonceRecord>, StoreError> {
        Ok(self.records.remove(address).map(|(_, record)| record))
    }

    async fn take_if(&self, address: &str, nonce: &str) -> Result<Option<NonceRecord>, StoreError> {
        Ok(self
            .records
            .remove_if(address, |_, record| record.nonce == nonce)
            .map(|(_, record)| record))
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<usize, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now_ms));
        Ok(before.saturating_sub(self.records.len()))
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.len())
    }
}

/// Issues challenges and hands them to the configured store
pub struct NonceRegistry {
    store: Arc<dyn NonceStore>,
    time_source: Arc<dyn TimeSource>,
    ttl: Duration,
}

impl NonceRegistry {
    pub fn new(store: Arc<dyn NonceStore>, time_source: Arc<dyn TimeSource>) -> Self {
        Self {
            store,
            time_source,
            ttl: Duration::seconds(DEFAULT_NONCE_TTL_SECONDS as i64),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Generate, store and return a fresh challenge, superseding any previous one
    pub async fn issue(&self, address: &str, domain: &str) -> Result<NonceRecord, StoreError> {
        let nonce = generate_nonce();
        let issued_at = self.time_source.now_millis();
        let expires_at = issued_at + self.ttl.num_milliseconds();
        let domain = canonicalize(domain);
        let message = build_message(address, &nonce, issued_at, expires_at, &domain);

        let record = NonceRecord {
            nonce,
            issued_at,
            expires_at,
            message,
            domain,
        };
        self.store.put(address, record.clone()).await?;

        tracing::debug!(address = %address, domain = %record.domain, expires_at, "Issued challenge nonce");

        Ok(record)
    }

    pub async fn get(&self, address: &str) -> Result<Option<NonceRecord>, StoreError> {
        self.store.get(address).await
    }

    pub async fn delete(&self, address: &str) -> Result<(), StoreError> {
        self.store.remove(address).await.map(|_| ())
    }

    /// Consume `record` if it is still the live challenge for `address`.
    /// `None` means it was already consumed or superseded.
    pub async fn take(&self, address: &str, record: &NonceRecord) -> Result<Option<NonceRecord>, StoreError> {
        self.store.take_if(address, &record.nonce).await
    }

    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.store.purge_expired(self.time_source.now_millis()).await
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        self.store.len().await
    }
}
