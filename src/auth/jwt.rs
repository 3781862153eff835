// Bearer token claim decoding
//
// Reads the expiry claim out of a compact JWT without verifying the
// signature. The token is only ever sent back to the service that issued it.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde_json::Value;

use crate::error::{ApiError, Result};

/// Claim names carrying the expiry, in lookup order
const EXPIRY_CLAIMS: [&str; 2] = ["exp", "expirationTime"];

/// Extract the expiry timestamp (seconds since epoch) from a bearer token
///
/// Accepts payloads with or without base64 padding, in either the URL-safe or
/// the standard alphabet. Reads `exp`, falling back to `expirationTime` when
/// `exp` is missing or not a number.
pub fn decode_expiry(token: &str) -> Result<f64> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => {
            return Err(ApiError::Decode(
                "token must have header, payload and signature segments".to_string(),
            ))
        }
    };

    let padded = pad_base64(payload);
    let bytes = URL_SAFE
        .decode(padded.as_bytes())
        .or_else(|e| STANDARD.decode(padded.as_bytes()).map_err(|_| e))
        .map_err(|e| ApiError::Decode(format!("payload is not valid base64: {}", e)))?;

    let claims: Value = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::Decode(format!("payload is not valid JSON: {}", e)))?;

    let claims = claims
        .as_object()
        .ok_or_else(|| ApiError::Decode("payload is not a JSON object".to_string()))?;

    EXPIRY_CLAIMS
        .iter()
        .find_map(|name| claims.get(*name).and_then(Value::as_f64))
        .ok_or_else(|| ApiError::Decode("token has no numeric exp or expirationTime claim".to_string()))
}

/// Pad a base64 segment with `=` up to a multiple of four characters
fn pad_base64(segment: &str) -> String {
    let missing = (4 - segment.len() % 4) % 4;
    let mut padded = String::with_capacity(segment.len() + missing);
    padded.push_str(segment);
    padded.extend(std::iter::repeat('=').take(missing));
    padded
}
