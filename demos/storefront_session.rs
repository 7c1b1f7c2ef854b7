//! Storefront session example
//!
//! Usage:
//!   BOOKSTORE_API_URL=http://localhost:8080 \
//!   BOOKSTORE_EMAIL=customer@bookstore.com BOOKSTORE_PASSWORD=password123 \
//!   cargo run --example storefront_session

use bookstore_client::{BookstoreClient, ClientConfig, RestoreOutcome, Role};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = ClientConfig::from_env()?.with_request_timeout(Duration::from_secs(10));
    let email = std::env::var("BOOKSTORE_EMAIL").unwrap_or_else(|_| "customer@bookstore.com".to_string());
    let password = std::env::var("BOOKSTORE_PASSWORD").unwrap_or_else(|_| "password123".to_string());

    println!("=== Bookstore Client Example ===");
    println!("API: {}", config.api_base_url);
    println!();

    let (client, outcome) = BookstoreClient::start(config)?;
    match outcome {
        RestoreOutcome::Restored(session) => {
            println!("✓ Resumed session for {}", session.identity.display_name());
        }
        RestoreOutcome::Expired => println!("! Your session has expired. Please log in again."),
        RestoreOutcome::Absent => println!("No saved session"),
    }
    client.dismiss_expired_notice();

    if !client.is_authenticated() {
        println!("Logging in as {email}...");
        let identity = client.login(&email, &password).await?;
        println!("✓ Logged in as {} ({})", identity.display_name(), identity.role);
    }

    if let Some(session) = client.session().current_session() {
        match session.expires_at {
            Some(expires_at) => println!("  Token expires at {expires_at}"),
            None => println!("  Token carries no readable expiry"),
        }
    }
    println!();

    if client.has_role(Role::Customer) {
        let cart = client.cart().fetch().await?;
        println!("Cart: {} item(s), subtotal ${:.2}", cart.total_items, cart.subtotal);
        for item in &cart.items {
            println!("  - {} x{} (${:.2})", item.book_title, item.quantity, item.line_total);
        }

        let orders = client.orders().my_orders().await?;
        println!("Orders: {}", orders.len());
        for order in &orders {
            println!("  - #{} {} ${:.2}", order.id, order.status, order.total);
        }
    } else if client.is_at_least(Role::Manager) {
        println!("Back-office account: inventory, orders and reports are available");
    }
    println!();

    // Watch for the automatic logout
    let mut identity = client.watch_identity();
    println!("Waiting up to 60 seconds for the session to change (Ctrl+C to exit)...");
    match tokio::time::timeout(Duration::from_secs(60), identity.changed()).await {
        Ok(Ok(())) if identity.borrow().is_none() => {
            println!("Session ended (expired: {})", client.session_expired());
        }
        _ => println!("Session still active"),
    }

    client.logout();
    client.shutdown();
    println!("Done!");

    Ok(())
}
