// auth-server/src/auth/error.rs
//! Error types for wallet authentication.

use thiserror::Error;

/// Terminal outcome of a failed boundary operation.
///
/// Every variant maps to one stable wire code (see [`AuthError::code`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Request shape or field syntax is invalid
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// No live challenge exists for the claimed address
    #[error("No challenge issued for this address")]
    NonceNotFound,

    /// The challenge window has closed
    #[error("Challenge expired")]
    NonceExpired,

    /// Challenge was issued for a different site
    #[error("Domain mismatch: expected {expected}, got {actual}")]
    DomainMismatch { expected: String, actual: String },

    /// The supplied public key does not hash to the claimed address
    #[error("Public key does not match the claimed address")]
    AddressMismatch,

    /// No encoding, message variant or verification mode accepted the signature
    #[error("Signature verification failed")]
    BadSignature,

    /// Missing, forged, expired or revoked session token
    #[error("No active session")]
    NoSession,

    /// Anything else. Details are logged, never returned to the caller.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidPayload(_) => "invalid_payload",
            AuthError::NonceNotFound => "nonce_not_found",
            AuthError::NonceExpired => "nonce_expired",
            AuthError::DomainMismatch { .. } => "domain_mismatch",
            AuthError::AddressMismatch => "address_mismatch",
            AuthError::BadSignature => "bad_signature",
            AuthError::NoSession => "no_session",
            AuthError::Internal(_) => "internal_error",
        }
    }

    /// Message safe to hand back to a client
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Internal(_) => "An internal error occurred".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Failure of a nonce or session storage backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(AuthError::InvalidPayload("x".into()).code(), "invalid_payload");
        assert_eq!(AuthError::NonceNotFound.code(), "nonce_not_found");
        assert_eq!(AuthError::NonceExpired.code(), "nonce_expired");
        assert_eq!(
            AuthError::DomainMismatch {
                expected: "a".into(),
                actual: "b".into()
            }
            .code(),
            "domain_mismatch"
        );
        assert_eq!(AuthError::AddressMismatch.code(), "address_mismatch");
        assert_eq!(AuthError::BadSignature.code(), "bad_signature");
        assert_eq!(AuthError::NoSession.code(), "no_session");
        assert_eq!(AuthError::Internal("x".into()).code(), "internal_error");
    }

    #[test]
    fn test_internal_details_are_not_public() {
        let err: AuthError = StoreError::Unavailable("redis://secret-host down".into()).into();
        assert_eq!(err.code(), "internal_error");
        assert!(!err.public_message().contains("secret-host"));
    }
}
