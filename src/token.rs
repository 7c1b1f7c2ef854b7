//! Bearer token expiry decoding
//!
//! Tokens are JWTs issued by the server. Only the payload's `exp` claim is
//! read and the signature is never checked: the decoded expiry drives the
//! client's own proactive logout and nothing else. Trust decisions stay with
//! the server.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Seconds subtracted from the expiry before any "still valid" comparison
pub const EXPIRY_BUFFER_SECS: i64 = 10;

const PAYLOAD_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const PAYLOAD_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Why a token's expiry could not be read
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("token has no payload segment")]
    Malformed,

    #[error("payload is not base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not a JSON claims object: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("token has no expiry claim")]
    MissingExpiry,

    #[error("expiry claim out of range")]
    OutOfRange,
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<f64>,
}

/// Read the absolute expiry instant embedded in `token`
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, DecodeError> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or(DecodeError::Malformed)?;

    let bytes = match PAYLOAD_URL_SAFE.decode(payload) {
        Ok(bytes) => bytes,
        Err(_) => PAYLOAD_STANDARD.decode(payload)?,
    };

    let claims: ExpiryClaim = serde_json::from_slice(&bytes)?;
    let exp = claims.exp.ok_or(DecodeError::MissingExpiry)?;
    if !exp.is_finite() {
        return Err(DecodeError::OutOfRange);
    }

    DateTime::from_timestamp_millis((exp * 1000.0) as i64).ok_or(DecodeError::OutOfRange)
}

/// Whether `token` must be treated as expired at `now`
///
/// True when the expiry cannot be decoded, or when `now` has reached
/// `expiry - buffer_secs`. An expiry too close to the representable range
/// for the buffer to be subtracted also counts as expired.
pub fn is_expired_at(token: &str, now: DateTime<Utc>, buffer_secs: i64) -> bool {
    let Ok(expiry) = decode_expiry(token) else {
        return true;
    };
    match TimeDelta::try_seconds(buffer_secs).and_then(|buffer| expiry.checked_sub_signed(buffer)) {
        Some(valid_until) => now >= valid_until,
        None => true,
    }
}

/// [`is_expired_at`] with the standard buffer
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    is_expired_at(token, now, EXPIRY_BUFFER_SECS)
}
