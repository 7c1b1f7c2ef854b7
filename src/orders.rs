//! Checkout and order tracking

use crate::cart::CartManager;
use crate::error::Result;
use crate::gateway::ApiGateway;
use crate::types::{CheckoutRequest, Order, PaymentMethod};
use std::sync::Arc;
use tracing::info;

/// Customer-facing order endpoints
pub struct OrdersClient {
    gateway: Arc<ApiGateway>,
    cart: Arc<CartManager>,
}

impl OrdersClient {
    pub fn new(gateway: Arc<ApiGateway>, cart: Arc<CartManager>) -> Self {
        Self { gateway, cart }
    }

    /// Turn the server-side cart into an order
    ///
    /// On success the local cart is reset without a further request.
    pub async fn checkout(&self, shipping_address: &str, notes: Option<&str>) -> Result<Order> {
        let request = CheckoutRequest {
            shipping_address: shipping_address.to_string(),
            notes: notes.map(str::to_string).filter(|notes| !notes.trim().is_empty()),
            payment_method: PaymentMethod::CashOnDelivery,
        };

        let order: Order = self.gateway.post("/orders/checkout", &request).await?;
        self.cart.on_checkout_completed();
        info!(order_id = order.id, "Order placed");
        Ok(order)
    }

    pub async fn my_orders(&self) -> Result<Vec<Order>> {
        self.gateway.get("/orders").await
    }

    pub async fn get(&self, order_id: i64) -> Result<Order> {
        self.gateway.get(&format!("/orders/{order_id}")).await
    }

    pub async fn cancel(&self, order_id: i64) -> Result<Order> {
        self.gateway.post_empty(&format!("/orders/{order_id}/cancel")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::ClientConfig;
    use crate::error::SessionError;
    use crate::session::SessionManager;
    use crate::storage::MemoryStore;
    use crate::testing::{identity, token_expiring_at};
    use crate::types::{AuthTokens, Cart, Role};
    use chrono::{TimeDelta, Utc};
    use serde_json::json;
    use tokio::runtime::Handle;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(server: &MockServer) -> (OrdersClient, Arc<CartManager>) {
        let config = ClientConfig::new(format!("{}/api", server.uri()));
        let session = SessionManager::new(&config, Arc::new(MemoryStore::new()), Arc::new(SystemClock), Handle::current());
        session
            .establish(
                AuthTokens {
                    access_token: token_expiring_at(Utc::now() + TimeDelta::seconds(3600)),
                    refresh_token: "refresh".to_string(),
                },
                identity(1, Role::Customer),
            )
            .unwrap();
        let gateway = Arc::new(ApiGateway::new(config, session).unwrap());
        let cart = CartManager::new(Arc::clone(&gateway));
        (OrdersClient::new(gateway, Arc::clone(&cart)), cart)
    }

    fn order_body(status: &str) -> serde_json::Value {
        json!({
            "success": true,
            "data": {
                "id": 77,
                "orderNumber": "ORD-77",
                "status": status,
                "items": [{ "bookId": 42, "bookTitle": "Dune", "quantity": 2, "priceAtPurchase": 10.0, "lineTotal": 20.0 }],
                "subtotal": 20.0,
                "tax": 1.6,
                "shippingCost": 5.99,
                "total": 27.59,
                "shippingAddress": "1 Main St",
                "paymentMethod": "CASH_ON_DELIVERY"
            }
        })
    }

    #[tokio::test]
    async fn test_checkout_resets_cart() {
        let server = MockServer::start().await;
        let (orders, cart) = setup(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/cart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "items": [{ "bookId": 42, "price": 10.0, "quantity": 2 }], "totalItems": 2, "subtotal": 20.0 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/orders/checkout"))
            .and(body_json(json!({ "shippingAddress": "1 Main St", "paymentMethod": "CASH_ON_DELIVERY" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(order_body("PENDING")))
            .expect(1)
            .mount(&server)
            .await;

        cart.fetch().await.unwrap();
        assert_eq!(cart.item_count(), 2);

        let order = orders.checkout("1 Main St", Some("  ")).await.unwrap();
        assert_eq!(order.order_number.as_deref(), Some("ORD-77"));
        assert_eq!(cart.snapshot(), Cart::empty());
    }

    #[tokio::test]
    async fn test_failed_checkout_keeps_cart() {
        let server = MockServer::start().await;
        let (orders, cart) = setup(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/cart/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "items": [{ "bookId": 42, "price": 10.0, "quantity": 1 }], "totalItems": 1, "subtotal": 10.0 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/orders/checkout"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "success": false,
                "message": "Insufficient stock for book: Dune"
            })))
            .mount(&server)
            .await;

        cart.add_item(42, 1).await.unwrap();
        assert!(matches!(
            orders.checkout("1 Main St", None).await,
            Err(SessionError::Api { status: 400, .. })
        ));
        assert_eq!(cart.item_count(), 1);
    }

    #[tokio::test]
    async fn test_order_queries() {
        let server = MockServer::start().await;
        let (orders, _cart) = setup(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [order_body("SHIPPED")["data"].clone()]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/orders/77/cancel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(order_body("CANCELLED")))
            .mount(&server)
            .await;

        let mine = orders.my_orders().await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].status, "SHIPPED");

        let cancelled = orders.cancel(77).await.unwrap();
        assert_eq!(cancelled.status, "CANCELLED");
    }
}
