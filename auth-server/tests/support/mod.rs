#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use auth_server::auth::address::address_from_key_bytes;
use auth_server::utils::FakeTimeSource;
use auth_server::AuthService;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use common::AuthConfig;
use rand::thread_rng;
use rsa::pss::Pss;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey};
use sha2::{Digest, Sha256};

/// A wallet holding a 2048-bit RSA key with e = 65537
pub struct TestWallet {
    key: RsaPrivateKey,
}

impl TestWallet {
    fn generate() -> Self {
        let key = RsaPrivateKey::new_with_exp(&mut thread_rng(), 2048, &BigUint::from(65537u32))
            .expect("generate RSA key");
        Self { key }
    }

    /// Raw big-endian modulus, the bytes the address is derived from
    pub fn modulus(&self) -> Vec<u8> {
        self.key.n().to_bytes_be()
    }

    pub fn address(&self) -> String {
        address_from_key_bytes(&self.modulus())
    }

    pub fn public_key(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.modulus())
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.modulus())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.modulus())
    }

    /// The chain's native scheme: RSA-PSS/SHA-256 over the message
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.sign_digest(&Sha256::digest(message))
    }

    /// Wallets that sign sha256(message) as the data
    pub fn sign_prehashed(&self, message: &[u8]) -> Vec<u8> {
        self.sign_digest(&Sha256::digest(Sha256::digest(message)))
    }

    fn sign_digest(&self, digest: &[u8]) -> Vec<u8> {
        self.key
            .sign_with_rng(&mut thread_rng(), Pss::new_with_salt::<Sha256>(32), digest)
            .expect("sign")
    }
}

pub fn alice() -> &'static TestWallet {
    static WALLET: OnceLock<TestWallet> = OnceLock::new();
    WALLET.get_or_init(TestWallet::generate)
}

pub fn mallory() -> &'static TestWallet {
    static WALLET: OnceLock<TestWallet> = OnceLock::new();
    WALLET.get_or_init(TestWallet::generate)
}

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        session_secret: Some("integration-test-secret".to_string()),
        ..AuthConfig::default()
    }
}

/// Service backed by the real RSA-PSS chain verifier and a fake clock
pub fn service_with(config: &AuthConfig) -> (AuthService, FakeTimeSource) {
    let clock = FakeTimeSource::new();
    let auth = AuthService::builder(config)
        .with_time_source(Arc::new(clock.clone()))
        .build();
    (auth, clock)
}

pub fn service() -> (AuthService, FakeTimeSource) {
    service_with(&auth_config())
}
