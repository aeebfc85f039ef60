// common/src/models/session.rs
use serde::{Deserialize, Serialize};

/// Claims carried inside a signed session token.
///
/// Field order is part of the token format: the HMAC is computed over the
/// JSON serialization of this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    /// Unique session identifier
    pub sid: String,
    /// Wallet address that proved control of its key
    pub addr: String,
    /// First 16 hex chars of sha256(lowercase(addr))
    #[serde(rename = "walletHash")]
    pub wallet_hash: String,
    /// Issued at, epoch milliseconds
    pub iat: i64,
    /// Expires at, epoch milliseconds. Always greater than `iat`.
    pub exp: i64,
    /// Ordered, duplicate-free capability list
    pub caps: Vec<String>,
}

impl SessionPayload {
    /// A session is dead once `exp` is reached
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.exp <= now_ms
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        self.caps.iter().any(|c| c == cap)
    }
}

/// Request body for `POST /api/auth/nonce`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceRequest {
    pub address: String,
}

/// Challenge handed to the wallet for signing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub address: String,
    pub nonce: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub message: String,
    pub domain: String,
}

/// Request body for `POST /api/auth/verify`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub signature: String,
}

/// Successful wallet verification. The session token itself travels in the cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub address: String,
    pub wallet_hash: String,
    pub expires_at: i64,
    pub capabilities: Vec<String>,
}

/// Response structure for the session inspection endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoResponse {
    pub address: String,
    pub wallet_hash: String,
    pub capabilities: Vec<String>,
    pub expires_at: i64,
    // Omit sid and token material
}

impl From<&SessionPayload> for SessionInfoResponse {
    fn from(payload: &SessionPayload) -> Self {
        Self {
            address: payload.addr.clone(),
            wallet_hash: payload.wallet_hash.clone(),
            capabilities: payload.caps.clone(),
            expires_at: payload.exp,
        }
    }
}

impl From<&SessionPayload> for VerifyResponse {
    fn from(payload: &SessionPayload) -> Self {
        Self {
            success: true,
            address: payload.addr.clone(),
            wallet_hash: payload.wallet_hash.clone(),
            expires_at: payload.exp,
            capabilities: payload.caps.clone(),
        }
    }
}

/// Error body returned for every failed auth operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable error code, e.g. "nonce_expired"
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payload() -> SessionPayload {
        SessionPayload {
            sid: "sid-1".into(),
            addr: "addr".into(),
            wallet_hash: "0123456789abcdef".into(),
            iat: 1_000,
            exp: 2_000,
            caps: vec!["config.read".into(), "config.write".into()],
        }
    }

    #[test]
    fn test_payload_json_field_names() {
        let json = serde_json::to_string(&payload()).unwrap();
        assert_eq!(
            json,
            r#"{"sid":"sid-1","addr":"addr","walletHash":"0123456789abcdef","iat":1000,"exp":2000,"caps":["config.read","config.write"]}"#
        );
    }

    #[test]
    fn test_expiry_is_inclusive_of_exp() {
        let p = payload();
        assert!(!p.is_expired(1_999));
        assert!(p.is_expired(2_000));
    }

    #[test]
    fn test_session_info_omits_sid() {
        let info = SessionInfoResponse::from(&payload());
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("sid").is_none());
        assert_eq!(json["walletHash"], "0123456789abcdef");
        assert_eq!(json["expiresAt"], 2000);
    }

    #[test]
    fn test_verify_request_missing_fields_default_to_empty() {
        let req: VerifyRequest = serde_json::from_str(r#"{"address":"a"}"#).unwrap();
        assert_eq!(req.public_key, "");
        assert_eq!(req.signature, "");
    }
}
