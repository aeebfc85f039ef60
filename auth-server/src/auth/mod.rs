// auth-server/src/auth/mod.rs
//! Wallet authentication: challenge issuance, signature verification and
//! session minting.
//!
//! ```text
//! UNAUTHENTICATED --issue_nonce--> NONCE_ISSUED --verify ok--> SESSION_ACTIVE
//!        ^                              |                           |
//!        +-------- verify failed -------+                           |
//!        +------------------------- logout -------------------------+
//! ```

pub mod address;
pub mod domain;
pub mod encoding;
pub mod error;
pub mod message;
pub mod nonce;
pub mod session;
pub mod signature;

use std::sync::Arc;

use chrono::Duration;
use common::models::session::{
    NonceResponse, SessionInfoResponse, SessionPayload, VerifyRequest, VerifyResponse,
};
use common::AuthConfig;

use self::address::{address_from_key_bytes, is_valid_address};
use self::domain::CanonicalDomain;
use self::encoding::decode_public_key;
use self::message::ChallengePayload;
use self::nonce::{InMemoryNonceStore, NonceRegistry, NonceStore};
use self::session::{InMemorySessionStore, SessionStore, SessionTokenCodec};
use self::signature::{ChainVerifier, KeyCache, RsaPssChainVerifier, SignatureVerifier};
use crate::utils::time_source::{SystemTimeSource, TimeSource};

pub use self::error::{AuthError, StoreError};

/// Upper bound for configured nonce and session lifetimes (ten years)
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Lifetime from configured seconds, clamped to [`MAX_TTL_SECONDS`]
pub fn ttl_from_seconds(name: &str, seconds: u64) -> Duration {
    let clamped = seconds.min(MAX_TTL_SECONDS);
    if clamped != seconds {
        tracing::warn!(setting = name, configured = seconds, used = clamped, "TTL clamped");
    }
    i64::try_from(clamped)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or_else(|| Duration::seconds(MAX_TTL_SECONDS as i64))
}

/// A freshly minted session and the token that carries it
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub token: String,
    pub payload: SessionPayload,
}

impl VerifiedSession {
    pub fn response(&self) -> VerifyResponse {
        VerifyResponse::from(&self.payload)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub nonces: usize,
    pub sessions: usize,
    pub cached_keys: usize,
}

impl PurgeStats {
    /// Expired entries removed; dropped cache keys are not counted
    pub fn total(&self) -> usize {
        self.nonces + self.sessions
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub nonces: usize,
    pub sessions: usize,
    pub cached_keys: usize,
}

struct AuthServiceInner {
    nonces: NonceRegistry,
    verifier: SignatureVerifier,
    codec: SessionTokenCodec,
    session_store: Arc<dyn SessionStore>,
    time_source: Arc<dyn TimeSource>,
    login_domain: Option<String>,
    session_ttl: Duration,
    capabilities: Vec<String>,
    enforce_revocation: bool,
}

/// Owns every piece of authentication state. Cheap to clone.
#[derive(Clone)]
pub struct AuthService {
    inner: Arc<AuthServiceInner>,
}

pub struct AuthServiceBuilder {
    config: AuthConfig,
    time_source: Arc<dyn TimeSource>,
    nonce_store: Arc<dyn NonceStore>,
    session_store: Arc<dyn SessionStore>,
    chain_verifier: Option<Arc<dyn ChainVerifier>>,
}

impl AuthServiceBuilder {
    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn with_nonce_store(mut self, store: Arc<dyn NonceStore>) -> Self {
        self.nonce_store = store;
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = store;
        self
    }

    /// Replace the default RSA-PSS native verifier
    pub fn with_chain_verifier(mut self, verifier: Arc<dyn ChainVerifier>) -> Self {
        self.chain_verifier = Some(verifier);
        self
    }

    pub fn build(self) -> AuthService {
        let keys = Arc::new(KeyCache::new());
        let chain = self
            .chain_verifier
            .unwrap_or_else(|| Arc::new(RsaPssChainVerifier::new(keys.clone())));

        let verifier = SignatureVerifier::new(chain, keys)
            .with_debug(self.config.debug)
            .with_test_signatures(self.config.allow_test_signatures);

        let nonces = NonceRegistry::new(self.nonce_store, self.time_source.clone())
            .with_ttl(ttl_from_seconds("nonce_ttl_seconds", self.config.nonce_ttl_seconds));

        let codec = SessionTokenCodec::from_config(
            self.config.session_secret.as_deref(),
            self.time_source.clone(),
        );

        AuthService {
            inner: Arc::new(AuthServiceInner {
                nonces,
                verifier,
                codec,
                session_store: self.session_store,
                time_source: self.time_source,
                login_domain: self.config.login_domain.clone().filter(|d| !d.trim().is_empty()),
                session_ttl: ttl_from_seconds("session_ttl_seconds", self.config.session_ttl_seconds),
                capabilities: self.config.capabilities(),
                enforce_revocation: self.config.enforce_revocation,
            }),
        }
    }
}

impl AuthService {
    pub fn builder(config: &AuthConfig) -> AuthServiceBuilder {
        AuthServiceBuilder {
            config: config.clone(),
            time_source: Arc::new(SystemTimeSource),
            nonce_store: Arc::new(InMemoryNonceStore::new()),
            session_store: Arc::new(InMemorySessionStore::new()),
            chain_verifier: None,
        }
    }

    /// Domain a challenge is bound to: the configured login domain, else the request host
    pub fn resolve_domain(&self, request_host: &str) -> String {
        let raw = self.inner.login_domain.as_deref().unwrap_or(request_host);
        domain::canonicalize(raw)
    }

    /// Issue a challenge for `address`, superseding any outstanding one
    pub async fn issue_nonce(&self, address: &str, request_host: &str) -> Result<NonceResponse, AuthError> {
        let address = address.trim();
        if !is_valid_address(address) {
            return Err(AuthError::InvalidPayload("address is not a valid wallet address".into()));
        }

        let domain = self.resolve_domain(request_host);
        let record = self.inner.nonces.issue(address, &domain).await?;

        tracing::info!(address = %address, domain = %record.domain, "Challenge issued");

        Ok(NonceResponse {
            address: address.to_string(),
            nonce: record.nonce,
            issued_at: record.issued_at,
            expires_at: record.expires_at,
            message: record.message,
            domain: record.domain,
        })
    }

    /// Check a signed challenge and mint a session on success
    pub async fn verify(&self, request: &VerifyRequest, request_host: &str) -> Result<VerifiedSession, AuthError> {
        let result = self.verify_inner(request, request_host).await;
        if let Err(e) = &result {
            match e {
                AuthError::Internal(details) => {
                    tracing::error!(error = %details, "Wallet verification failed internally")
                },
                _ => tracing::warn!(
                    address = %request.address.trim(),
                    code = e.code(),
                    "Wallet verification rejected"
                ),
            }
        }
        result
    }

    async fn verify_inner(&self, request: &VerifyRequest, request_host: &str) -> Result<VerifiedSession, AuthError> {
        let address = request.address.trim();
        let signature = request.signature.trim();

        // Shape checks happen before any state is touched
        if !is_valid_address(address) {
            return Err(AuthError::InvalidPayload("address is not a valid wallet address".into()));
        }
        if signature.is_empty() {
            return Err(AuthError::InvalidPayload("signature is required".into()));
        }
        let public_key = decode_public_key(&request.public_key)
            .map_err(|e| AuthError::InvalidPayload(format!("publicKey: {}", e)))?;

        let record = self
            .inner
            .nonces
            .get(address)
            .await?
            .ok_or(AuthError::NonceNotFound)?;

        // Failure paths only remove this record, never a fresher re-issue
        if record.is_expired(self.inner.time_source.now_millis()) {
            self.inner.nonces.take(address, &record).await?;
            return Err(AuthError::NonceExpired);
        }

        let expected = CanonicalDomain::parse(&self.resolve_domain(request_host));
        let issued_for = if record.domain.is_empty() {
            // Records without a stored domain still carry it in the message payload
            ChallengePayload::extract(&record.message)
                .map(|p| p.domain)
                .unwrap_or_default()
        } else {
            record.domain.clone()
        };
        let issued_for = CanonicalDomain::parse(&issued_for);
        if !expected.matches(&issued_for) {
            self.inner.nonces.take(address, &record).await?;
            return Err(AuthError::DomainMismatch {
                expected: expected.to_string(),
                actual: issued_for.to_string(),
            });
        }

        // Nonce is kept on the two failures below so the wallet can retry
        if address_from_key_bytes(&public_key) != address {
            return Err(AuthError::AddressMismatch);
        }

        if !self
            .inner
            .verifier
            .verify_key_bytes(&public_key, &record.message, signature)
            .await
        {
            return Err(AuthError::BadSignature);
        }

        // Only the caller that consumes the nonce may mint
        self.inner
            .nonces
            .take(address, &record)
            .await?
            .ok_or(AuthError::NonceNotFound)?;

        let payload = self.inner.codec.mint(
            address,
            self.inner.capabilities.clone(),
            self.inner.session_ttl,
        );
        let token = self
            .inner
            .codec
            .sign(&payload)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        self.inner.session_store.record(&payload.sid, payload.exp).await?;

        tracing::info!(address = %address, wallet_hash = %payload.wallet_hash, "Wallet session issued");

        Ok(VerifiedSession { token, payload })
    }

    /// Validate a session token, honoring revocation when enforced
    pub async fn session(&self, token: &str) -> Result<SessionPayload, AuthError> {
        let payload = self.inner.codec.verify(token).ok_or(AuthError::NoSession)?;

        if self.inner.enforce_revocation
            && !self
                .inner
                .session_store
                .is_active(&payload.sid, self.inner.time_source.now_millis())
                .await?
        {
            return Err(AuthError::NoSession);
        }

        Ok(payload)
    }

    pub async fn inspect_session(&self, token: &str) -> Result<SessionInfoResponse, AuthError> {
        self.session(token).await.map(|p| SessionInfoResponse::from(&p))
    }

    /// Forget the session server-side. Only matters when revocation is
    /// enforced; the caller clears the cookie either way.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let payload = match self.inner.codec.decode_ignoring_expiry(token) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(reason = %e, "Logout with unusable token");
                return Ok(());
            }
        };

        let revoked = self.inner.session_store.revoke(&payload.sid).await?;
        tracing::info!(address = %payload.addr, revoked, "Wallet session logged out");
        Ok(())
    }

    /// Drop expired nonces and session entries, and reset the key cache
    pub async fn purge_expired(&self) -> Result<PurgeStats, AuthError> {
        let nonces = self.inner.nonces.purge_expired().await?;
        let sessions = self
            .inner
            .session_store
            .purge_expired(self.inner.time_source.now_millis())
            .await?;
        let cached_keys = self.inner.verifier.key_cache().clear();
        Ok(PurgeStats {
            nonces,
            sessions,
            cached_keys,
        })
    }

    pub async fn store_counts(&self) -> Result<StoreCounts, AuthError> {
        Ok(StoreCounts {
            nonces: self.inner.nonces.len().await?,
            sessions: self.inner.session_store.len().await?,
            cached_keys: self.inner.verifier.key_cache().len(),
        })
    }

    pub fn session_ttl_seconds(&self) -> i64 {
        self.inner.session_ttl.num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::address::derive_wallet_hash;
    use crate::auth::nonce::NonceRecord;
    use crate::auth::signature::ChainVerifyError;
    use crate::utils::time_source::FakeTimeSource;
    use async_trait::async_trait;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    use pretty_assertions::assert_eq;
    use sha2::{Digest, Sha256};

    /// Accepts signature == sha256(key || message)
    struct DigestChain;

    #[async_trait]
    impl ChainVerifier for DigestChain {
        async fn verify(&self, key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, ChainVerifyError> {
            Ok(sign(key, message) == signature)
        }
    }

    fn sign(key: &[u8], message: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(message);
        hasher.finalize().to_vec()
    }

    struct Wallet {
        key: Vec<u8>,
    }

    impl Wallet {
        fn new(seed: u8) -> Self {
            Self { key: vec![seed; 64] }
        }

        fn address(&self) -> String {
            address_from_key_bytes(&self.key)
        }

        fn public_key(&self) -> String {
            URL_SAFE_NO_PAD.encode(&self.key)
        }

        fn request(&self, message: &str) -> VerifyRequest {
            VerifyRequest {
                address: self.address(),
                public_key: self.public_key(),
                signature: URL_SAFE_NO_PAD.encode(sign(&self.key, message.as_bytes())),
            }
        }
    }

    struct Fixture {
        auth: AuthService,
        clock: FakeTimeSource,
        nonce_store: Arc<InMemoryNonceStore>,
    }

    fn fixture_with(configure: impl FnOnce(&mut AuthConfig)) -> Fixture {
        let mut config = AuthConfig {
            session_secret: Some("test-secret".into()),
            ..AuthConfig::default()
        };
        configure(&mut config);

        let clock = FakeTimeSource::new();
        let nonce_store = Arc::new(InMemoryNonceStore::new());
        let auth = AuthService::builder(&config)
            .with_time_source(Arc::new(clock.clone()))
            .with_nonce_store(nonce_store.clone())
            .with_chain_verifier(Arc::new(DigestChain))
            .build();

        Fixture {
            auth,
            clock,
            nonce_store,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(|_| {})
    }

    #[tokio::test]
    async fn test_issue_and_verify() {
        let f = fixture();
        let wallet = Wallet::new(1);

        let challenge = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();
        assert_eq!(challenge.domain, "example.com");

        let session = f
            .auth
            .verify(&wallet.request(&challenge.message), "example.com")
            .await
            .unwrap();
        assert_eq!(session.payload.addr, wallet.address());
        assert_eq!(session.payload.wallet_hash, derive_wallet_hash(&wallet.address()));
        assert_eq!(session.payload.caps, vec!["config.read", "config.write"]);
        assert_eq!(session.payload.exp - session.payload.iat, 86_400_000);
        assert!(session.response().success);

        let info = f.auth.inspect_session(&session.token).await.unwrap();
        assert_eq!(info.address, wallet.address());
        assert_eq!(info.capabilities, vec!["config.read", "config.write"]);
    }

    #[tokio::test]
    async fn test_invalid_payload_precedes_state() {
        let f = fixture();
        let wallet = Wallet::new(1);

        let err = f.auth.issue_nonce("not an address", "example.com").await.unwrap_err();
        assert_eq!(err.code(), "invalid_payload");

        let mut request = wallet.request("anything");
        request.public_key = "%%%".into();
        assert_eq!(f.auth.verify(&request, "example.com").await.unwrap_err().code(), "invalid_payload");

        let mut request = wallet.request("anything");
        request.signature = "  ".into();
        assert_eq!(f.auth.verify(&request, "example.com").await.unwrap_err().code(), "invalid_payload");
    }

    #[tokio::test]
    async fn test_single_use() {
        let f = fixture();
        let wallet = Wallet::new(2);
        let challenge = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();
        let request = wallet.request(&challenge.message);

        f.auth.verify(&request, "example.com").await.unwrap();
        assert_eq!(
            f.auth.verify(&request, "example.com").await.unwrap_err(),
            AuthError::NonceNotFound
        );
    }

    #[tokio::test]
    async fn test_expired_nonce_is_deleted() {
        let f = fixture();
        let wallet = Wallet::new(3);
        let challenge = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();

        f.clock.advance(Duration::minutes(5) + Duration::milliseconds(1));
        assert_eq!(
            f.auth
                .verify(&wallet.request(&challenge.message), "example.com")
                .await
                .unwrap_err(),
            AuthError::NonceExpired
        );
        assert_eq!(f.nonce_store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_domain_mismatch_is_deleted() {
        let f = fixture();
        let wallet = Wallet::new(4);
        let challenge = f.auth.issue_nonce(&wallet.address(), "a.example:443").await.unwrap();

        let err = f
            .auth
            .verify(&wallet.request(&challenge.message), "b.example:443")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AuthError::DomainMismatch {
                expected: "b.example".into(),
                actual: "a.example".into()
            }
        );
        assert_eq!(f.nonce_store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_port_mismatch_and_localhost() {
        let f = fixture();
        let wallet = Wallet::new(5);

        let challenge = f.auth.issue_nonce(&wallet.address(), "a.example:443").await.unwrap();
        let err = f
            .auth
            .verify(&wallet.request(&challenge.message), "a.example:8443")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "domain_mismatch");

        let challenge = f.auth.issue_nonce(&wallet.address(), "localhost:4200").await.unwrap();
        f.auth
            .verify(&wallet.request(&challenge.message), "127.0.0.1:8081")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_login_domain_overrides_request_host() {
        let f = fixture_with(|c| c.login_domain = Some("Login.Example.com".into()));
        let wallet = Wallet::new(6);

        let challenge = f.auth.issue_nonce(&wallet.address(), "internal:8080").await.unwrap();
        assert_eq!(challenge.domain, "login.example.com");
        f.auth
            .verify(&wallet.request(&challenge.message), "another-internal:9090")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_address_mismatch_keeps_nonce() {
        let f = fixture();
        let victim = Wallet::new(7);
        let attacker = Wallet::new(8);
        let challenge = f.auth.issue_nonce(&victim.address(), "example.com").await.unwrap();

        // Attacker signs the victim's challenge with their own key
        let mut request = attacker.request(&challenge.message);
        request.address = victim.address();
        assert_eq!(
            f.auth.verify(&request, "example.com").await.unwrap_err(),
            AuthError::AddressMismatch
        );
        assert_eq!(f.nonce_store.len().await.unwrap(), 1);

        // Victim can still complete
        f.auth
            .verify(&victim.request(&challenge.message), "example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bad_signature_keeps_nonce() {
        let f = fixture();
        let wallet = Wallet::new(9);
        let challenge = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();

        let request = wallet.request("some other message");
        assert_eq!(
            f.auth.verify(&request, "example.com").await.unwrap_err(),
            AuthError::BadSignature
        );
        f.auth
            .verify(&wallet.request(&challenge.message), "example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_superseded_nonce_fails() {
        let f = fixture();
        let wallet = Wallet::new(10);
        let first = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();
        let second = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();

        assert_eq!(
            f.auth
                .verify(&wallet.request(&first.message), "example.com")
                .await
                .unwrap_err(),
            AuthError::BadSignature
        );
        f.auth
            .verify(&wallet.request(&second.message), "example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_domain_recovered_from_message_for_legacy_records() {
        let f = fixture();
        let wallet = Wallet::new(11);
        let challenge = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();

        let legacy = NonceRecord {
            nonce: challenge.nonce.clone(),
            issued_at: challenge.issued_at,
            expires_at: challenge.expires_at,
            message: challenge.message.clone(),
            domain: String::new(),
        };
        f.nonce_store.put(&wallet.address(), legacy).await.unwrap();

        assert_eq!(
            f.auth
                .verify(&wallet.request(&challenge.message), "evil.example")
                .await
                .unwrap_err()
                .code(),
            "domain_mismatch"
        );
    }

    #[tokio::test]
    async fn test_stateless_logout_does_not_revoke() {
        let f = fixture();
        let wallet = Wallet::new(12);
        let challenge = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();
        let session = f
            .auth
            .verify(&wallet.request(&challenge.message), "example.com")
            .await
            .unwrap();

        f.auth.logout(&session.token).await.unwrap();
        assert!(f.auth.session(&session.token).await.is_ok());
    }

    #[tokio::test]
    async fn test_enforced_revocation() {
        let f = fixture_with(|c| c.enforce_revocation = true);
        let wallet = Wallet::new(13);
        let challenge = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();
        let session = f
            .auth
            .verify(&wallet.request(&challenge.message), "example.com")
            .await
            .unwrap();
        assert!(f.auth.session(&session.token).await.is_ok());

        f.auth.logout(&session.token).await.unwrap();
        assert_eq!(
            f.auth.session(&session.token).await.unwrap_err(),
            AuthError::NoSession
        );

        // Garbage tokens are tolerated
        f.auth.logout("garbage").await.unwrap();
    }

    #[tokio::test]
    async fn test_session_expiry() {
        let f = fixture_with(|c| c.session_ttl_seconds = 60);
        let wallet = Wallet::new(14);
        let challenge = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();
        let session = f
            .auth
            .verify(&wallet.request(&challenge.message), "example.com")
            .await
            .unwrap();

        f.clock.advance(Duration::seconds(60));
        assert_eq!(
            f.auth.inspect_session(&session.token).await.unwrap_err(),
            AuthError::NoSession
        );
    }

    #[tokio::test]
    async fn test_purge_and_counts() {
        let f = fixture();
        let a = Wallet::new(15);
        let b = Wallet::new(16);
        f.auth.issue_nonce(&a.address(), "example.com").await.unwrap();
        let challenge = f.auth.issue_nonce(&b.address(), "example.com").await.unwrap();
        f.auth
            .verify(&b.request(&challenge.message), "example.com")
            .await
            .unwrap();

        let counts = f.auth.store_counts().await.unwrap();
        assert_eq!(counts.nonces, 1);
        assert_eq!(counts.sessions, 1);

        f.clock.advance(Duration::days(2));
        let stats = f.auth.purge_expired().await.unwrap();
        assert_eq!(stats.nonces, 1);
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.total(), 2);
    }

    #[tokio::test]
    async fn test_purge_resets_key_cache() {
        let f = fixture();
        let modulus = vec![0xc5u8; 256];
        f.auth.inner.verifier.key_cache().import(&modulus).unwrap();
        assert_eq!(f.auth.store_counts().await.unwrap().cached_keys, 1);

        let stats = f.auth.purge_expired().await.unwrap();
        assert_eq!(
            stats,
            PurgeStats {
                nonces: 0,
                sessions: 0,
                cached_keys: 1
            }
        );
        assert_eq!(stats.total(), 0);
        assert_eq!(f.auth.store_counts().await.unwrap().cached_keys, 0);
    }

    #[tokio::test]
    async fn test_huge_ttls_are_clamped() {
        for ttl in [10_u64.pow(16), u64::MAX] {
            let f = fixture_with(|c| {
                c.session_ttl_seconds = ttl;
                c.nonce_ttl_seconds = ttl;
            });
            assert_eq!(f.auth.session_ttl_seconds(), MAX_TTL_SECONDS as i64);

            let wallet = Wallet::new(17);
            let challenge = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();
            assert_eq!(
                challenge.expires_at - challenge.issued_at,
                MAX_TTL_SECONDS as i64 * 1000
            );

            let session = f
                .auth
                .verify(&wallet.request(&challenge.message), "example.com")
                .await
                .unwrap();
            assert_eq!(session.payload.exp - session.payload.iat, MAX_TTL_SECONDS as i64 * 1000);
            assert!(f.auth.session(&session.token).await.is_ok());
        }
    }

    #[test]
    fn test_ttl_from_seconds() {
        assert_eq!(ttl_from_seconds("ttl", 0), Duration::zero());
        assert_eq!(ttl_from_seconds("ttl", 300), Duration::seconds(300));
        assert_eq!(ttl_from_seconds("ttl", MAX_TTL_SECONDS), Duration::seconds(MAX_TTL_SECONDS as i64));
        assert_eq!(ttl_from_seconds("ttl", u64::MAX), Duration::seconds(MAX_TTL_SECONDS as i64));
    }

    #[tokio::test]
    async fn test_stale_failure_keeps_fresh_nonce() {
        let f = fixture();
        let wallet = Wallet::new(18);
        let stale = f.auth.issue_nonce(&wallet.address(), "a.example").await.unwrap();
        let stale_record = f.nonce_store.get(&wallet.address()).await.unwrap().unwrap();
        assert_eq!(stale_record.nonce, stale.nonce);

        let fresh = f.auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();

        // Removing the record a slow verify read earlier leaves the re-issue alone
        let registry = &f.auth.inner.nonces;
        assert_eq!(registry.take(&wallet.address(), &stale_record).await.unwrap(), None);
        assert_eq!(f.nonce_store.len().await.unwrap(), 1);

        f.auth
            .verify(&wallet.request(&fresh.message), "example.com")
            .await
            .unwrap();
    }

    /// DigestChain that yields before answering, widening the window
    /// between reading a nonce and consuming it
    struct SlowDigestChain;

    #[async_trait]
    impl ChainVerifier for SlowDigestChain {
        async fn verify(&self, key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, ChainVerifyError> {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            Ok(sign(key, message) == signature)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_verifies_mint_one_session() {
        let config = AuthConfig {
            session_secret: Some("test-secret".into()),
            ..AuthConfig::default()
        };
        let auth = AuthService::builder(&config)
            .with_chain_verifier(Arc::new(SlowDigestChain))
            .build();
        let wallet = Wallet::new(19);

        for _ in 0..20 {
            let challenge = auth.issue_nonce(&wallet.address(), "example.com").await.unwrap();
            let request = wallet.request(&challenge.message);

            let tasks: Vec<_> = (0..2)
                .map(|_| {
                    let auth = auth.clone();
                    let request = request.clone();
                    tokio::spawn(async move { auth.verify(&request, "example.com").await })
                })
                .collect();

            let mut sessions = 0;
            for task in tasks {
                match task.await.unwrap() {
                    Ok(_) => sessions += 1,
                    Err(e) => assert_eq!(e, AuthError::NonceNotFound),
                }
            }
            assert_eq!(sessions, 1);
        }
    }
}
