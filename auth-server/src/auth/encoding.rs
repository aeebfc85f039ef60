// auth-server/src/auth/encoding.rs
//! Lenient decoding of wallet-supplied keys and signatures.
//!
//! Wallet extensions disagree on how binary values are encoded: base64url with
//! or without padding, standard base64, partially padded mixes, or lowercase
//! hex. Each [`DecodeStrategy`] is one pure interpretation of the input.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;

/// A 2048-bit modulus or signature is 512 hex chars
pub const MIN_HEX_LEN: usize = 512;

/// Standard alphabet, accepts input with or without canonical padding
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Result of applying one strategy: `None` when the strategy does not apply
pub type DecodeAttempt = Option<Result<Vec<u8>, String>>;

#[derive(Clone, Copy)]
pub struct DecodeStrategy {
    pub name: &'static str,
    pub decode: fn(&str) -> DecodeAttempt,
}

impl std::fmt::Debug for DecodeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeStrategy").field("name", &self.name).finish()
    }
}

/// Ordered strategies tried against every signature
pub const DECODE_STRATEGIES: [DecodeStrategy; 5] = [
    DecodeStrategy {
        name: "base64url",
        decode: decode_base64url,
    },
    DecodeStrategy {
        name: "base64-raw",
        decode: decode_base64_raw,
    },
    DecodeStrategy {
        name: "base64-pad+1",
        decode: decode_forced_padding_1,
    },
    DecodeStrategy {
        name: "base64-pad+2",
        decode: decode_forced_padding_2,
    },
    DecodeStrategy {
        name: "hex",
        decode: decode_hex,
    },
];

/// Long, purely lowercase hex runs are plausible RSA moduli or signatures
pub fn looks_like_hex(input: &str) -> bool {
    input.len() >= MIN_HEX_LEN && input.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Padding that `len % 4` says is missing; `None` when no valid padding exists
pub fn missing_padding(len: usize) -> Option<usize> {
    match len % 4 {
        0 => Some(0),
        2 => Some(2),
        3 => Some(1),
        _ => None,
    }
}

/// Decode a public key to the bytes its address is derived from.
/// Hex is preferred for hex-looking input since such strings are also valid base64.
pub fn decode_public_key(input: &str) -> Result<Vec<u8>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty public key".to_string());
    }
    if looks_like_hex(input) {
        return hex::decode(input).map_err(|e| e.to_string());
    }

    let mut last_error = String::from("no decoding applied");
    for strategy in [decode_base64url, decode_base64_raw] {
        match strategy(input) {
            Some(Ok(bytes)) if !bytes.is_empty() => return Ok(bytes),
            Some(Ok(_)) => last_error = "decoded to zero bytes".to_string(),
            Some(Err(e)) => last_error = e,
            None => {}
        }
    }
    Err(last_error)
}

/// base64url -> base64 with padding restored from `len % 4`
fn decode_base64url(input: &str) -> DecodeAttempt {
    let normalized: String = input
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();

    let padding = match missing_padding(normalized.len()) {
        Some(p) => p,
        None => return Some(Err(format!("impossible base64 length {}", normalized.len()))),
    };
    let padded = format!("{}{}", normalized, "=".repeat(padding));
    Some(STANDARD.decode(padded).map_err(|e| e.to_string()))
}

/// Pass-through for input already in the standard alphabet
fn decode_base64_raw(input: &str) -> DecodeAttempt {
    let input = input.trim();
    if !input.contains(['+', '/']) {
        return None;
    }
    Some(STANDARD_LENIENT.decode(input).map_err(|e| e.to_string()))
}

fn decode_forced_padding_1(input: &str) -> DecodeAttempt {
    decode_forced_padding(input, 1)
}

fn decode_forced_padding_2(input: &str) -> DecodeAttempt {
    decode_forced_padding(input, 2)
}

/// Appends `extra` '=' when the input's padding looks short
fn decode_forced_padding(input: &str, extra: usize) -> DecodeAttempt {
    let input = input.trim();
    if input.len() % 4 == 0 {
        return None;
    }
    let normalized: String = input
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            c => c,
        })
        .collect();
    let padded = format!("{}{}", normalized, "=".repeat(extra));
    Some(STANDARD_LENIENT.decode(padded).map_err(|e| e.to_string()))
}

fn decode_hex(input: &str) -> DecodeAttempt {
    let input = input.trim();
    if !looks_like_hex(input) {
        return None;
    }
    Some(hex::decode(input).map_err(|e| e.to_string()))
}
