//! Shared helpers for unit tests

use crate::types::{Identity, Role};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// A JWT-shaped token with the given claims and a junk signature
pub fn unsigned_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

pub fn token_expiring_at(expiry: DateTime<Utc>) -> String {
    unsigned_token(&serde_json::json!({ "sub": "user@example.com", "exp": expiry.timestamp() }))
}

pub fn identity(id: i64, role: Role) -> Identity {
    Identity {
        id,
        email: format!("user{id}@example.com"),
        first_name: "Test".to_string(),
        last_name: format!("User{id}"),
        role,
        phone: None,
        shipping_address: None,
        billing_address: None,
        extra: BTreeMap::new(),
    }
}

/// Let paused tokio time run forward and give woken tasks a chance to run
pub async fn settle(by: Duration) {
    tokio::time::sleep(by).await;
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
