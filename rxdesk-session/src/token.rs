//! JWT payload inspection
//!
//! Tokens are never verified here; the backend owns signatures. The client
//! only reads the payload to decide whether a token is worth sending.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

const PAYLOAD_CONFIG: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, PAYLOAD_CONFIG);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, PAYLOAD_CONFIG);

/// Registered claims the client cares about; everything else lands in `extra`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    pub exp: Option<f64>,
    pub iat: Option<f64>,
    pub user_id: Option<Value>,
    pub token_type: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl TokenClaims {
    /// Expiry as whole seconds since the epoch
    pub fn expires_at(&self) -> Option<i64> {
        self.exp.filter(|exp| exp.is_finite()).map(|exp| exp as i64)
    }
}

/// Decode the payload segment of a JWT, `None` for anything malformed
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut segments = token.split('.');
    let (_header, payload) = (segments.next()?, segments.next()?);
    if payload.is_empty() {
        return None;
    }

    let bytes = URL_SAFE_LENIENT
        .decode(payload)
        .or_else(|_| STANDARD_LENIENT.decode(payload))
        .ok()?;

    serde_json::from_slice(&bytes).ok()
}

/// Whether a token is expired; absent or unreadable tokens count as expired
pub fn is_token_expired(token: Option<&str>) -> bool {
    is_token_expired_at(token, Utc::now().timestamp())
}

/// Same as [`is_token_expired`] against an explicit clock, in epoch seconds
pub fn is_token_expired_at(token: Option<&str>, now: i64) -> bool {
    let Some(token) = token else {
        return true;
    };

    match decode_claims(token).and_then(|claims| claims.expires_at()) {
        Some(exp) => exp <= now,
        None => true,
    }
}

/// Seconds until the token expires; negative when already expired
pub fn seconds_until_expiry(token: &str) -> Option<i64> {
    let exp = decode_claims(token)?.expires_at()?;
    Some(exp - Utc::now().timestamp())
}

#[cfg(test)]
pub(crate) fn encode_test_token(payload: &serde_json::Value) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.signature")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_and_malformed_tokens_are_expired() {
        assert!(is_token_expired(None));
        assert!(is_token_expired(Some("not-a-jwt")));
        assert!(is_token_expired(Some("a.b")));
        assert!(is_token_expired(Some("header..sig")));
        assert!(is_token_expired(Some("header.%%%%.sig")));
    }

    #[test]
    fn test_payload_without_exp_is_expired() {
        let token = encode_test_token(&json!({ "user_id": 7 }));
        assert!(decode_claims(&token).is_some());
        assert!(is_token_expired(Some(&token)));
    }

    #[test]
    fn test_non_json_payload_is_expired() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let token = format!("h.{}.s", URL_SAFE_NO_PAD.encode("plain text"));
        assert!(is_token_expired(Some(&token)));
    }

    #[test]
    fn test_expiry_against_clock() {
        let now = Utc::now().timestamp();
        let past = encode_test_token(&json!({ "exp": now - 60 }));
        let future = encode_test_token(&json!({ "exp": now + 3600 }));

        assert!(is_token_expired(Some(&past)));
        assert!(!is_token_expired(Some(&future)));
        assert!(is_token_expired_at(Some(&future), now + 3600));
    }

    #[test]
    fn test_padded_standard_payload_decodes() {
        use base64::engine::general_purpose::STANDARD;
        let payload = STANDARD.encode(r#"{"exp":4102444800,"token_type":"access"}"#);
        let token = format!("h.{payload}.s");

        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.expires_at(), Some(4_102_444_800));
        assert_eq!(claims.token_type.as_deref(), Some("access"));
        assert!(!is_token_expired(Some(&token)));
    }

    #[test]
    fn test_extra_claims_are_kept() {
        let token = encode_test_token(&json!({ "exp": 1, "role": "admin" }));
        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.extra.get("role"), Some(&json!("admin")));
        assert!(seconds_until_expiry(&token).unwrap() < 0);
    }
}
