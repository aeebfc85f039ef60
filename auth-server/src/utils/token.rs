// auth-server/src/utils/token.rs
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::{thread_rng, RngCore};
use sha2::{Digest, Sha256};

/// Random bytes per challenge nonce (encodes to 32 base64url chars)
pub const NONCE_BYTES: usize = 24;

/// Random bytes in an ephemeral session secret
pub const SECRET_BYTES: usize = 32;

/// Fill a buffer of `length` bytes from the thread-local CSPRNG
pub fn random_bytes(length: usize) -> Vec<u8> {
    let mut buf = vec![0u8; length];
    thread_rng().fill_bytes(&mut buf);
    buf
}

/// Generate an opaque, URL-safe challenge nonce
pub fn generate_nonce() -> String {
    encode_base64url(&random_bytes(NONCE_BYTES))
}

/// Generate a process-local secret for signing session tokens
pub fn generate_secret() -> Vec<u8> {
    random_bytes(SECRET_BYTES)
}

/// Hash a string using SHA-256, hex encoded
pub fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Unpadded base64url
pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}
