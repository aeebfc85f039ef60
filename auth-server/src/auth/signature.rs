// auth-server/src/auth/signature.rs
//! Tolerant wallet signature verification.
//!
//! Wallet extensions disagree on both encoding and signing convention, so a
//! signature is tried across a small matrix:
//!
//! * message variants: the UTF-8 bytes as issued, plus a CRLF -> LF copy when
//!   the message contains CRLF;
//! * signature encodings: every applicable [`DecodeStrategy`], skipping
//!   strategies that decode to bytes already tried;
//! * verify modes: the chain's native verify, then RSA-PSS over a SHA-256
//!   prehash of the message.
//!
//! The public key is decoded once, to the same bytes its address is derived
//! from, so the key that verifies is always the key that owns the address.
//!
//! Every attempt is recorded in a [`VerifyReport`]. Individual failures are
//! data, never errors: `verify` only answers yes or no.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::FutureExt;
use rsa::pss::Pss;
use rsa::{BigUint, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::encoding::{decode_public_key, DecodeStrategy, DECODE_STRATEGIES};

/// Public exponent shared by all chain keys
pub const RSA_PUBLIC_EXPONENT: u32 = 65537;

/// PSS salt length, equal to the SHA-256 digest length
pub const PSS_SALT_LEN: usize = 32;

#[cfg(feature = "test-signatures")]
pub const TEST_SIGNATURE: &str = "TEST";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainVerifyError {
    #[error("Invalid public key: {0}")]
    InvalidKey(String),
    #[error("Chain verifier failed: {0}")]
    Failed(String),
}

/// The chain's own `verify(publicKey, message, signature)` primitive
#[async_trait]
pub trait ChainVerifier: Send + Sync {
    async fn verify(
        &self,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, ChainVerifyError>;
}

/// Entries kept before the cache starts over
pub const DEFAULT_KEY_CACHE_CAPACITY: usize = 1024;

/// Imported RSA keys keyed by modulus. A pure performance memo, clearable at any time.
#[derive(Debug)]
pub struct KeyCache {
    keys: DashMap<Vec<u8>, RsaPublicKey>,
    capacity: usize,
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_KEY_CACHE_CAPACITY)
    }
}

impl KeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn import(&self, modulus: &[u8]) -> Result<RsaPublicKey, rsa::Error> {
        if let Some(key) = self.keys.get(modulus) {
            return Ok(key.value().clone());
        }
        let key = RsaPublicKey::new(
            BigUint::from_bytes_be(modulus),
            BigUint::from(RSA_PUBLIC_EXPONENT),
        )?;
        if self.keys.len() >= self.capacity {
            let dropped = self.clear();
            tracing::debug!(dropped, "Key cache full, starting over");
        }
        self.keys.insert(modulus.to_vec(), key.clone());
        Ok(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drop every entry, returning how many were held
    pub fn clear(&self) -> usize {
        let held = self.keys.len();
        self.keys.clear();
        held
    }
}

/// RSA-PSS / SHA-256 / salt 32 over a 32-byte digest
fn pss_verify(key: &RsaPublicKey, digest: &[u8], signature: &[u8]) -> Result<(), rsa::Error> {
    key.verify(Pss::new_with_salt::<Sha256>(PSS_SALT_LEN), digest, signature)
}

/// Native verification for chains whose wallets sign the raw message with
/// RSA-PSS/SHA-256 over the key's modulus
pub struct RsaPssChainVerifier {
    keys: Arc<KeyCache>,
}

impl RsaPssChainVerifier {
    pub fn new(keys: Arc<KeyCache>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl ChainVerifier for RsaPssChainVerifier {
    async fn verify(
        &self,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, ChainVerifyError> {
        let key = self
            .keys
            .import(public_key)
            .map_err(|e| ChainVerifyError::InvalidKey(e.to_string()))?;
        Ok(pss_verify(&key, &Sha256::digest(message), signature).is_ok())
    }
}

/// One way of checking a signature against a key and message
#[async_trait]
pub trait VerifyMode: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err` carries the human-readable rejection reason
    async fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), String>;
}

/// Defers to the chain's verify primitive
pub struct NativeVerify {
    chain: Arc<dyn ChainVerifier>,
}

impl NativeVerify {
    pub fn new(chain: Arc<dyn ChainVerifier>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl VerifyMode for NativeVerify {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), String> {
        let outcome = AssertUnwindSafe(self.chain.verify(public_key, message, signature))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err("chain verifier rejected signature".to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("chain verifier panicked".to_string()),
        }
    }
}

/// For wallets whose sign-message API signs sha256(message) as the data
pub struct PrehashedPssVerify {
    keys: Arc<KeyCache>,
}

impl PrehashedPssVerify {
    pub fn new(keys: Arc<KeyCache>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl VerifyMode for PrehashedPssVerify {
    fn name(&self) -> &'static str {
        "rsa-pss-prehash"
    }

    async fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), String> {
        let key = self
            .keys
            .import(public_key)
            .map_err(|e| format!("cannot import RSA key: {}", e))?;
        let prehash = Sha256::digest(message);
        pss_verify(&key, &Sha256::digest(prehash), signature).map_err(|e| {
            // Wrong key and wrong hash algorithm are indistinguishable here
            format!("rsa-pss(sha256, salt={}) rejected: {} (wrong key or unexpected hash algorithm)", PSS_SALT_LEN, e)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Verified,
    Rejected(String),
    /// The strategy applied but the signature did not decode
    Undecodable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyAttempt {
    pub message_variant: &'static str,
    pub encoding: &'static str,
    /// Empty for decode failures, which never reach a mode
    pub mode: &'static str,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub attempts: Vec<VerifyAttempt>,
}

impl VerifyReport {
    pub fn verified(&self) -> bool {
        self.success().is_some()
    }

    pub fn success(&self) -> Option<&VerifyAttempt> {
        self.attempts
            .iter()
            .find(|a| a.outcome == AttemptOutcome::Verified)
    }

    fn record(&mut self, message_variant: &'static str, encoding: &'static str, mode: &'static str, outcome: AttemptOutcome) {
        self.attempts.push(VerifyAttempt {
            message_variant,
            encoding,
            mode,
            outcome,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageVariant {
    pub tag: &'static str,
    pub bytes: Vec<u8>,
}

/// The message as issued, plus a LF-only copy when it contains CRLF
pub fn message_variants(message: &str) -> Vec<MessageVariant> {
    let mut variants = vec![MessageVariant {
        tag: "utf8",
        bytes: message.as_bytes().to_vec(),
    }];
    if message.contains("\r\n") {
        variants.push(MessageVariant {
            tag: "crlf-to-lf",
            bytes: message.replace("\r\n", "\n").into_bytes(),
        });
    }
    variants
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureVariant {
    pub tag: &'static str,
    pub bytes: Vec<u8>,
}

/// Decode the signature with every applicable strategy, dropping duplicates.
/// Decode failures are returned separately for diagnostics.
pub fn signature_variants(
    strategies: &[DecodeStrategy],
    signature: &str,
) -> (Vec<SignatureVariant>, Vec<(&'static str, String)>) {
    let mut variants: Vec<SignatureVariant> = Vec::new();
    let mut failures = Vec::new();

    for strategy in strategies {
        match (strategy.decode)(signature) {
            None => {}
            Some(Ok(bytes)) if bytes.is_empty() => {
                failures.push((strategy.name, "decoded to zero bytes".to_string()));
            }
            Some(Ok(bytes)) => {
                if !variants.iter().any(|v| v.bytes == bytes) {
                    variants.push(SignatureVariant {
                        tag: strategy.name,
                        bytes,
                    });
                }
            }
            Some(Err(e)) => failures.push((strategy.name, e)),
        }
    }

    (variants, failures)
}

pub struct SignatureVerifier {
    strategies: Vec<DecodeStrategy>,
    modes: Vec<Arc<dyn VerifyMode>>,
    keys: Arc<KeyCache>,
    debug: bool,
    #[cfg_attr(not(feature = "test-signatures"), allow(dead_code))]
    allow_test_signatures: bool,
}

impl SignatureVerifier {
    /// Native mode backed by `chain`, then the RSA-PSS prehash fallback
    pub fn new(chain: Arc<dyn ChainVerifier>, keys: Arc<KeyCache>) -> Self {
        let modes: Vec<Arc<dyn VerifyMode>> = vec![
            Arc::new(NativeVerify::new(chain)),
            Arc::new(PrehashedPssVerify::new(keys.clone())),
        ];
        Self::with_modes(DECODE_STRATEGIES.to_vec(), modes, keys)
    }

    pub fn with_modes(
        strategies: Vec<DecodeStrategy>,
        modes: Vec<Arc<dyn VerifyMode>>,
        keys: Arc<KeyCache>,
    ) -> Self {
        Self {
            strategies,
            modes,
            keys,
            debug: false,
            allow_test_signatures: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Accept the literal `TEST` signature. Has no effect unless built with
    /// the `test-signatures` feature.
    pub fn with_test_signatures(mut self, allow: bool) -> Self {
        if allow && !cfg!(feature = "test-signatures") {
            tracing::warn!("Test signatures requested but not compiled in; ignoring");
        }
        self.allow_test_signatures = allow && cfg!(feature = "test-signatures");
        self
    }

    pub fn key_cache(&self) -> &Arc<KeyCache> {
        &self.keys
    }

    /// Verify with string-encoded key and signature
    pub async fn verify(&self, public_key: &str, message: &str, signature: &str) -> bool {
        match decode_public_key(public_key) {
            Ok(key) => self.verify_key_bytes(&key, message, signature).await,
            Err(e) => {
                if self.debug {
                    tracing::debug!(reason = %e, "Public key undecodable");
                }
                false
            }
        }
    }

    pub async fn verify_key_bytes(&self, public_key: &[u8], message: &str, signature: &str) -> bool {
        let report = self.verify_with_report(public_key, message, signature).await;

        if self.debug {
            for attempt in &report.attempts {
                tracing::debug!(
                    message_variant = attempt.message_variant,
                    encoding = attempt.encoding,
                    mode = attempt.mode,
                    outcome = ?attempt.outcome,
                    "Signature verification attempt"
                );
            }
        }

        report.verified()
    }

    /// Run the matrix, stopping at the first success
    pub async fn verify_with_report(&self, public_key: &[u8], message: &str, signature: &str) -> VerifyReport {
        let mut report = VerifyReport::default();

        if self.is_test_bypass(signature) {
            tracing::warn!("Accepting test signature bypass");
            report.record("any", "test-bypass", "none", AttemptOutcome::Verified);
            return report;
        }

        let (signatures, failures) = signature_variants(&self.strategies, signature.trim());
        for (encoding, reason) in failures {
            report.record("any", encoding, "", AttemptOutcome::Undecodable(reason));
        }

        for message_variant in message_variants(message) {
            for signature_variant in &signatures {
                for mode in &self.modes {
                    let outcome = match mode
                        .verify(public_key, &message_variant.bytes, &signature_variant.bytes)
                        .await
                    {
                        Ok(()) => AttemptOutcome::Verified,
                        Err(reason) => AttemptOutcome::Rejected(reason),
                    };
                    let verified = outcome == AttemptOutcome::Verified;
                    report.record(message_variant.tag, signature_variant.tag, mode.name(), outcome);
                    if verified {
                        return report;
                    }
                }
            }
        }

        report
    }

    #[cfg(feature = "test-signatures")]
    fn is_test_bypass(&self, signature: &str) -> bool {
        self.allow_test_signatures && signature == TEST_SIGNATURE
    }

    #[cfg(not(feature = "test-signatures"))]
    fn is_test_bypass(&self, _signature: &str) -> bool {
        false
    }
}
