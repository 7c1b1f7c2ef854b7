//! Type definitions for sessions, identities and the storefront wire format

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Account role, as issued by the server
///
/// Capabilities form a partial order: an administrator can do everything a
/// manager can. Customers are disjoint from both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Manager,
    Administrator,
}

impl Role {
    /// Whether an account holding `self` may use something gated on `required`
    pub fn satisfies(self, required: Role) -> bool {
        matches!(
            (self, required),
            (Role::Customer, Role::Customer)
                | (Role::Manager, Role::Manager)
                | (Role::Administrator, Role::Manager)
                | (Role::Administrator, Role::Administrator)
        )
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Customer => "CUSTOMER",
            Role::Manager => "MANAGER",
            Role::Administrator => "ADMINISTRATOR",
        };
        f.write_str(name)
    }
}

/// The signed-in user, as returned by the auth endpoints and persisted locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<String>,
    /// Remaining server fields are carried through untouched
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Identity {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Authentication tokens (access + refresh)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
}

/// The authenticated identity held by the client
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub tokens: AuthTokens,
    pub identity: Identity,
    /// Decoded from the access token; `None` when the token carries no
    /// readable expiry and only the server can end the session
    pub expires_at: Option<DateTime<Utc>>,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The user logged out
    Explicit,
    /// The token expired locally or the server rejected it
    Expired,
}

/// Server response envelope shared by every endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: Identity,
}

impl AuthResponse {
    pub fn tokens(&self) -> AuthTokens {
        AuthTokens {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

/// Shopping cart as served by `/cart`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub total_items: u32,
    #[serde(default)]
    pub subtotal: f64,
    #[serde(default)]
    pub estimated_tax: f64,
    #[serde(default)]
    pub estimated_shipping: f64,
    #[serde(default)]
    pub estimated_total: f64,
}

impl Cart {
    /// The empty cart every session starts from
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(default)]
    pub id: Option<i64>,
    pub book_id: i64,
    #[serde(default)]
    pub book_title: String,
    #[serde(default)]
    pub book_author: Option<String>,
    #[serde(default)]
    pub book_isbn: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub price: f64,
    pub quantity: u32,
    #[serde(default)]
    pub line_total: f64,
    #[serde(default)]
    pub available_stock: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItemRequest {
    pub book_id: i64,
    pub quantity: u32,
}

/// Payment methods accepted at checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[default]
    CashOnDelivery,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub shipping_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    #[serde(default)]
    pub order_number: Option<String>,
    pub status: String,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub subtotal: f64,
    #[serde(default)]
    pub tax: f64,
    #[serde(default)]
    pub shipping_cost: f64,
    #[serde(default)]
    pub total: f64,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub book_id: i64,
    #[serde(default)]
    pub book_title: String,
    pub quantity: u32,
    #[serde(default)]
    pub price_at_purchase: f64,
    #[serde(default)]
    pub line_total: f64,
}
