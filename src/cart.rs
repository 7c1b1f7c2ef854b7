//! Session-scoped cart cache
//!
//! The cart only ever belongs to the current session. It is reset to the
//! empty baseline whenever the session ends or a different identity signs
//! in, and after checkout. Server responses that arrive for a session that
//! has since ended are dropped instead of being cached.

use crate::error::{Result, SessionError};
use crate::gateway::ApiGateway;
use crate::session::{SessionListener, SessionManager};
use crate::types::{AddCartItemRequest, Cart, EndReason, Identity};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Default)]
struct CartState {
    cart: Cart,
    /// Identity the cached cart was fetched for
    owner: Option<i64>,
}

/// Cart cache coordinated with the session lifecycle
pub struct CartManager {
    gateway: Arc<ApiGateway>,
    state: Mutex<CartState>,
}

impl CartManager {
    /// Create the cart cache and subscribe it to session transitions
    pub fn new(gateway: Arc<ApiGateway>) -> Arc<Self> {
        let manager = Arc::new(Self {
            gateway,
            state: Mutex::new(CartState::default()),
        });
        let listener: Arc<dyn SessionListener> = manager.clone();
        manager.session().add_listener(&listener);
        manager
    }

    fn session(&self) -> &Arc<SessionManager> {
        self.gateway.session()
    }

    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached cart
    pub fn snapshot(&self) -> Cart {
        self.lock().cart.clone()
    }

    pub fn item_count(&self) -> u32 {
        self.lock().cart.total_items
    }

    fn reset(&self) {
        let mut state = self.lock();
        state.cart = Cart::empty();
        state.owner = None;
    }

    /// Cache a server cart, provided the session it was fetched under is
    /// still the current one
    fn install(&self, epoch: u64, cart: Cart) -> Result<Cart> {
        let mut state = self.lock();
        let current = self.session().credential().map(|credential| credential.epoch);
        if current != Some(epoch) {
            debug!(epoch, "Discarding cart fetched for an ended session");
            return Err(SessionError::AuthorizationExpired);
        }
        state.owner = self.session().current_identity().map(|identity| identity.id);
        state.cart = cart.clone();
        Ok(cart)
    }

    fn epoch(&self) -> Result<u64> {
        self.session()
            .credential()
            .map(|credential| credential.epoch)
            .ok_or(SessionError::AuthorizationExpired)
    }

    /// Reload the cart from the server
    ///
    /// Only customers have carts; everyone else sees the empty baseline.
    pub async fn fetch(&self) -> Result<Cart> {
        if !self.session().is_customer() {
            self.reset();
            return Ok(Cart::empty());
        }
        let epoch = self.epoch()?;
        let cart: Cart = self.gateway.get("/cart").await?;
        self.install(epoch, cart)
    }

    pub async fn add_item(&self, book_id: i64, quantity: u32) -> Result<Cart> {
        let epoch = self.epoch()?;
        let cart: Cart = self
            .gateway
            .post("/cart/items", &AddCartItemRequest { book_id, quantity })
            .await?;
        self.install(epoch, cart)
    }

    pub async fn update_quantity(&self, book_id: i64, quantity: u32) -> Result<Cart> {
        let epoch = self.epoch()?;
        let cart: Cart = self
            .gateway
            .put_with_query(&format!("/cart/items/{book_id}"), &[("quantity", quantity)])
            .await?;
        self.install(epoch, cart)
    }

    pub async fn remove_item(&self, book_id: i64) -> Result<Cart> {
        let epoch = self.epoch()?;
        let cart: Cart = self.gateway.delete(&format!("/cart/items/{book_id}")).await?;
        self.install(epoch, cart)
    }

    /// Empty the cart on the server, then locally
    pub async fn clear(&self) -> Result<()> {
        self.gateway.delete::<serde_json::Value>("/cart/clear").await?;
        self.reset();
        Ok(())
    }

    /// Reset after an order was placed
    ///
    /// The server consumed the cart when creating the order, so no clear
    /// request is sent; one arriving after the next add-to-cart would wipe it.
    pub fn on_checkout_completed(&self) {
        self.reset();
        debug!("Cart reset after checkout");
    }
}

impl SessionListener for CartManager {
    fn on_session_started(&self, identity: &Identity) {
        let mut state = self.lock();
        if state.owner.is_some_and(|owner| owner != identity.id) {
            info!(user_id = identity.id, "Identity changed, resetting cart");
            state.cart = Cart::empty();
            state.owner = None;
        }
    }

    fn on_session_ended(&self, reason: EndReason) {
        self.reset();
        debug!(?reason, "Cart reset after session end");
    }
}
