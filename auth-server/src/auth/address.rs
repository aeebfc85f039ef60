// auth-server/src/auth/address.rs
//! Address and tenant-hash derivation.

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::encoding::decode_public_key;
use crate::utils::token::{encode_base64url, hash_string};

/// sha256 digest, base64url without padding
pub const ADDRESS_LEN: usize = 43;

pub const WALLET_HASH_LEN: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Public key could not be decoded: {0}")]
    UndecodablePublicKey(String),
}

/// Short, non-reversible tenant identifier: first 16 hex chars of sha256(lowercase(address))
pub fn derive_wallet_hash(address: &str) -> String {
    let mut hash = hash_string(&address.to_lowercase());
    hash.truncate(WALLET_HASH_LEN);
    hash
}

/// The chain's canonical address: base64url(sha256(raw public key bytes))
pub fn address_from_key_bytes(public_key: &[u8]) -> String {
    encode_base64url(&Sha256::digest(public_key))
}

pub fn address_from_public_key(public_key: &str) -> Result<String, AddressError> {
    let bytes = decode_public_key(public_key).map_err(AddressError::UndecodablePublicKey)?;
    Ok(address_from_key_bytes(&bytes))
}

/// Syntax check only: 43 base64url characters
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_LEN
        && address
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
