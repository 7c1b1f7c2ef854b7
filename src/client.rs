//! The client context handed to the UI layer
//!
//! One `BookstoreClient` per application instance: it owns the single
//! session slot, restores it at start-up and cancels the logout timer at
//! teardown.

use crate::auth_client::{AuthClient, AuthClientHttp};
use crate::cart::CartManager;
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::error::{Result, SessionError};
use crate::gateway::ApiGateway;
use crate::orders::OrdersClient;
use crate::session::{RestoreOutcome, SessionManager};
use crate::storage::{CredentialStore, FileStore, MemoryStore};
use crate::types::{Identity, RegisterRequest, Role};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::info;

pub struct BookstoreClient {
    session: Arc<SessionManager>,
    gateway: Arc<ApiGateway>,
    auth: Arc<AuthClientHttp>,
    cart: Arc<CartManager>,
    orders: OrdersClient,
}

impl BookstoreClient {
    /// Build a client and restore any persisted session
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: ClientConfig) -> Result<(Self, RestoreOutcome)> {
        let client = Self::new(config)?;
        let outcome = client.restore()?;
        Ok((client, outcome))
    }

    /// Build a client over the storage named by the config
    pub fn new(config: ClientConfig) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match &config.storage_path {
            Some(path) => Arc::new(FileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };
        Self::with_parts(config, store, Arc::new(SystemClock))
    }

    /// Build a client over explicit storage and clock
    pub fn with_parts(config: ClientConfig, store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| SessionError::Configuration(format!("no tokio runtime for logout timers: {e}")))?;

        let session = SessionManager::new(&config, store, clock, runtime);
        let gateway = Arc::new(ApiGateway::new(config, Arc::clone(&session))?);
        let auth = AuthClientHttp::new(Arc::clone(&gateway));
        let cart = CartManager::new(Arc::clone(&gateway));
        let orders = OrdersClient::new(Arc::clone(&gateway), Arc::clone(&cart));

        Ok(Self {
            session,
            gateway,
            auth,
            cart,
            orders,
        })
    }

    /// Read back the session persisted by a previous run
    pub fn restore(&self) -> Result<RestoreOutcome> {
        let outcome = self.session.restore()?;
        match &outcome {
            RestoreOutcome::Absent => info!("Starting signed out"),
            RestoreOutcome::Expired => info!("Previous session expired"),
            RestoreOutcome::Restored(session) => info!(user_id = session.identity.id, "Resuming session"),
        }
        Ok(outcome)
    }

    /// Application teardown: stop the logout timer
    pub fn shutdown(&self) {
        self.session.shutdown();
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn gateway(&self) -> &Arc<ApiGateway> {
        &self.gateway
    }

    pub fn auth(&self) -> &Arc<AuthClientHttp> {
        &self.auth
    }

    pub fn cart(&self) -> &Arc<CartManager> {
        &self.cart
    }

    pub fn orders(&self) -> &OrdersClient {
        &self.orders
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity> {
        self.auth.login(email, password).await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<Identity> {
        self.auth.register(request).await
    }

    pub fn logout(&self) {
        self.auth.logout();
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.session.current_identity()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.session.has_role(role)
    }

    pub fn is_at_least(&self, role: Role) -> bool {
        self.session.is_at_least(role)
    }

    pub fn session_expired(&self) -> bool {
        self.session.session_expired()
    }

    pub fn dismiss_expired_notice(&self) {
        self.session.dismiss_expired_notice();
    }

    /// Watch the signed-in identity
    pub fn watch_identity(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}

impl Drop for BookstoreClient {
    fn drop(&mut self) {
        self.session.shutdown();
    }
}
