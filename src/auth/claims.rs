//! Unverified JWT payload inspection.
//!
//! Nothing here checks signatures. The payload is only read to decide whether
//! a token is worth sending; any token that cannot be read is treated as
//! expired so the client falls back to re-authentication.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::Utc;
use serde_json::{Map, Value};

use super::error::AuthError;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode the middle segment of a compact JWT as a JSON object.
///
/// # Errors
///
/// Returns [`AuthError::InvalidResponse`] when the token has no payload
/// segment, the segment is not base64url, or it does not hold a JSON object.
pub fn decode_payload(token: &str) -> Result<Map<String, Value>, AuthError> {
    let segment = token
        .split('.')
        .nth(1)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::InvalidResponse("token has no payload segment".to_string()))?;
    let bytes = URL_SAFE_LENIENT
        .decode(segment)
        .map_err(|e| AuthError::InvalidResponse(format!("token payload is not base64url: {e}")))?;
    match serde_json::from_slice::<Value>(&bytes)? {
        Value::Object(claims) => Ok(claims),
        _ => Err(AuthError::InvalidResponse(
            "token payload is not a JSON object".to_string(),
        )),
    }
}

/// Read the `exp` claim, in seconds since the epoch.
///
/// `Ok(None)` means the payload decoded but carries no expiry.
pub fn expiry(token: &str) -> Result<Option<i64>, AuthError> {
    let claims = decode_payload(token)?;
    match claims.get("exp") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.floor() as i64))
            .map(Some)
            .ok_or_else(|| AuthError::InvalidResponse("exp claim out of range".to_string())),
        Some(_) => Err(AuthError::InvalidResponse(
            "exp claim is not a number".to_string(),
        )),
    }
}

/// Whether `token` should be considered expired right now.
pub fn is_token_expired(token: &str) -> bool {
    is_token_expired_at(token, Utc::now().timestamp())
}

/// Whether `token` should be considered expired at `now` (epoch seconds).
///
/// Fails closed: an unreadable payload counts as expired. A readable payload
/// without `exp` does not.
pub fn is_token_expired_at(token: &str, now: i64) -> bool {
    match expiry(token) {
        Ok(Some(exp)) => exp < now,
        Ok(None) => false,
        Err(err) => {
            tracing::debug!(error = %err, "Failed to decode token; treating as expired");
            true
        }
    }
}
