//! Bookstore Rust Client
//!
//! Session and client-state management for the bookstore storefront:
//! bearer-token sessions that persist across runs, automatic logout shortly
//! before the token expires, a cart cache that never outlives its session,
//! and an API gateway that ends the session when the server rejects it.

pub mod auth_client;
pub mod cart;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod orders;
pub mod scheduler;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

#[cfg(test)]
mod testing;

pub use auth_client::{AuthClient, AuthClientHttp};
pub use cart::CartManager;
pub use client::BookstoreClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ClientConfig;
pub use error::{Result, SessionError, StorageError};
pub use gateway::ApiGateway;
pub use orders::OrdersClient;
pub use scheduler::{ArmOutcome, LogoutScheduler};
pub use session::{Credential, RestoreOutcome, SessionListener, SessionManager};
pub use storage::{CredentialStore, FileStore, MemoryStore};
pub use types::{AuthTokens, Cart, EndReason, Identity, Role, Session};
