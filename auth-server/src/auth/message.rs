// auth-server/src/auth/message.rs
//! Challenge message construction.
//!
//! The message is a fixed human-readable preamble followed by a base64url JSON
//! payload. Building is deterministic, so a stored record can always be
//! re-rendered and its payload re-read byte for byte.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::address::derive_wallet_hash;
use crate::utils::token::encode_base64url;

pub const MESSAGE_VERSION: u32 = 1;

const PAYLOAD_PREFIX: &str = "Payload: ";

/// Self-describing part of the challenge, embedded in the message text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengePayload {
    pub nonce: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub domain: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_hash: Option<String>,
}

impl ChallengePayload {
    /// Decode the payload line of a built message
    pub fn extract(message: &str) -> Option<Self> {
        let encoded = message
            .lines()
            .rev()
            .find_map(|line| line.trim_end_matches('\r').strip_prefix(PAYLOAD_PREFIX))?;
        let json = URL_SAFE_NO_PAD.decode(encoded.trim()).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

/// Render the challenge the wallet is asked to sign
pub fn build_message(
    address: &str,
    nonce: &str,
    issued_at: i64,
    expires_at: i64,
    domain: &str,
) -> String {
    let wallet_hash = if address.is_empty() {
        None
    } else {
        Some(derive_wallet_hash(address))
    };

    let payload = ChallengePayload {
        nonce: nonce.to_string(),
        issued_at,
        expires_at,
        domain: domain.to_string(),
        version: MESSAGE_VERSION,
        wallet_hash,
    };
    // Serializing a struct of strings and integers cannot fail
    let json = serde_json::to_vec(&payload).unwrap_or_default();

    let header = if domain.is_empty() {
        "Sign in with your wallet.".to_string()
    } else {
        format!("{} wants you to sign in with your wallet.", domain)
    };

    format!(
        "{header}\n\
         \n\
         Sign this message to prove you control this wallet. \
         Signing is free and does not submit a transaction.\n\
         \n\
         Address: {address}\n\
         Nonce: {nonce}\n\
         Issued At: {issued}\n\
         Expiration Time: {expires}\n\
         \n\
         {PAYLOAD_PREFIX}{payload}",
        issued = format_millis(issued_at),
        expires = format_millis(expires_at),
        payload = encode_base64url(&json),
    )
}

fn format_millis(ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(t) => t.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}
