//! Authentication client: login, registration, logout and token refresh

use crate::error::{Result, SessionError};
use crate::gateway::ApiGateway;
use crate::session::SessionManager;
use crate::types::{AuthResponse, EndReason, Identity, LoginRequest, RegisterRequest};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Authentication operations exposed to the UI layer
pub trait AuthClient: Send + Sync + 'static {
    /// Sign in with email and password
    ///
    /// Fails with `InvalidCredentials` when the server rejects the pair;
    /// network and other server failures propagate unchanged.
    fn login(&self, email: &str, password: &str) -> impl Future<Output = Result<Identity>> + Send;

    /// Create an account and sign in as it
    ///
    /// Fails with `ValidationFailed` carrying the server's field messages.
    fn register(&self, request: &RegisterRequest) -> impl Future<Output = Result<Identity>> + Send;

    /// Explicit logout
    fn logout(&self);
}

/// Authentication client talking to the storefront API
pub struct AuthClientHttp {
    gateway: Arc<ApiGateway>,
}

impl AuthClientHttp {
    pub fn new(gateway: Arc<ApiGateway>) -> Arc<Self> {
        Arc::new(Self { gateway })
    }

    fn session(&self) -> &Arc<SessionManager> {
        self.gateway.session()
    }

    fn establish(&self, response: AuthResponse) -> Result<Identity> {
        let session = self.session().establish(response.tokens(), response.user)?;
        Ok(session.identity)
    }

    /// Exchange the refresh token for a new token pair
    ///
    /// A rejected refresh token ends the session as expired.
    pub async fn refresh(&self) -> Result<Identity> {
        let epoch = self
            .session()
            .credential()
            .map(|credential| credential.epoch)
            .ok_or(SessionError::AuthorizationExpired)?;
        let refresh_token = self.session().refresh_token().ok_or(SessionError::AuthorizationExpired)?;

        let response: AuthResponse = match self.gateway.post_with_bearer("/auth/refresh", &refresh_token).await {
            Ok(response) => response,
            Err(SessionError::Unauthorized(message)) => {
                warn!(error = %message, "Refresh token rejected");
                self.session().terminate_epoch(epoch, EndReason::Expired);
                return Err(SessionError::AuthorizationExpired);
            }
            Err(e) => return Err(e),
        };

        let identity = self.establish(response)?;
        info!(user_id = identity.id, "Access token refreshed");
        Ok(identity)
    }
}

impl AuthClient for AuthClientHttp {
    async fn login(&self, email: &str, password: &str) -> Result<Identity> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response: AuthResponse = match self.gateway.post_anonymous("/auth/login", &request).await {
            Ok(response) => response,
            Err(SessionError::Unauthorized(message)) => {
                return Err(SessionError::InvalidCredentials(message));
            }
            Err(e) => return Err(e),
        };

        let identity = self.establish(response)?;
        info!(user_id = identity.id, role = %identity.role, "Logged in");
        Ok(identity)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<Identity> {
        let response: AuthResponse = match self.gateway.post_anonymous("/auth/register", request).await {
            Ok(response) => response,
            // Duplicate email
            Err(SessionError::Api { status: 409, message }) => {
                let fields = BTreeMap::from([("email".to_string(), message.clone())]);
                return Err(SessionError::ValidationFailed { message, fields });
            }
            Err(e) => return Err(e),
        };

        let identity = self.establish(response)?;
        info!(user_id = identity.id, "Registered");
        Ok(identity)
    }

    fn logout(&self) {
        if self.session().terminate(EndReason::Explicit) {
            info!("Logged out");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::ClientConfig;
    use crate::storage::{CredentialStore, MemoryStore, ACCESS_TOKEN_KEY, IDENTITY_KEY};
    use crate::testing::token_expiring_at;
    use crate::types::Role;
    use chrono::{TimeDelta, Utc};
    use serde_json::json;
    use tokio::runtime::Handle;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, store: MemoryStore) -> Arc<AuthClientHttp> {
        let config = ClientConfig::new(format!("{}/api", server.uri()));
        let session = SessionManager::new(&config, Arc::new(store), Arc::new(SystemClock), Handle::current());
        AuthClientHttp::new(Arc::new(ApiGateway::new(config, session).unwrap()))
    }

    fn auth_body(access_token: &str, refresh_token: &str, role: &str) -> serde_json::Value {
        json!({
            "success": true,
            "message": "Login successful",
            "data": {
                "accessToken": access_token,
                "refreshToken": refresh_token,
                "tokenType": "Bearer",
                "expiresIn": 3600000,
                "user": {
                    "id": 5,
                    "email": "ann@example.com",
                    "firstName": "Ann",
                    "lastName": "Lee",
                    "role": role,
                    "isActive": true,
                    "isLocked": false
                }
            }
        })
    }

    #[tokio::test]
    async fn test_login_establishes_session() {
        let server = MockServer::start().await;
        let store = MemoryStore::new();
        let client = client(&server, store.clone());
        let access_token = token_expiring_at(Utc::now() + TimeDelta::seconds(3600));

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({ "email": "ann@example.com", "password": "secret123" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body(&access_token, "refresh-1", "CUSTOMER")))
            .expect(1)
            .mount(&server)
            .await;

        let identity = client.login("ann@example.com", "secret123").await.unwrap();
        assert_eq!(identity.id, 5);
        assert_eq!(identity.role, Role::Customer);

        assert!(client.session().is_authenticated());
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), Some(access_token));
        assert!(store.get(IDENTITY_KEY).unwrap().unwrap().contains("\"firstName\":\"Ann\""));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        let client = client(&server, MemoryStore::new());

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "success": false,
                "message": "Invalid email or password"
            })))
            .mount(&server)
            .await;

        match client.login("ann@example.com", "wrong").await {
            Err(SessionError::InvalidCredentials(message)) => assert_eq!(message, "Invalid email or password"),
            other => panic!("expected invalid credentials, got {other:?}"),
        }
        assert!(!client.session().is_authenticated());
        assert!(!client.session().session_expired());
    }

    #[tokio::test]
    async fn test_login_locked_account_propagates() {
        let server = MockServer::start().await;
        let client = client(&server, MemoryStore::new());

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(423).set_body_json(json!({
                "success": false,
                "message": "Your account is locked"
            })))
            .mount(&server)
            .await;

        assert!(matches!(
            client.login("ann@example.com", "secret123").await,
            Err(SessionError::Api { status: 423, .. })
        ));
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let server = MockServer::start().await;
        let client = client(&server, MemoryStore::new());

        Mock::given(method("POST"))
            .and(path("/api/auth/register"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "success": false,
                "message": "Email already registered: ann@example.com"
            })))
            .mount(&server)
            .await;

        let request = RegisterRequest {
            email: "ann@example.com".to_string(),
            password: "secret123".to_string(),
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            phone: None,
        };
        match client.register(&request).await {
            Err(SessionError::ValidationFailed { fields, .. }) => {
                assert_eq!(fields["email"], "Email already registered: ann@example.com");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_register_signs_in() {
        let server = MockServer::start().await;
        let client = client(&server, MemoryStore::new());
        let access_token = token_expiring_at(Utc::now() + TimeDelta::seconds(3600));

        Mock::given(method("POST"))
            .and(path("/api/auth/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(auth_body(&access_token, "refresh-1", "CUSTOMER")))
            .mount(&server)
            .await;

        let request = RegisterRequest {
            email: "ann@example.com".to_string(),
            password: "secret123".to_string(),
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            phone: Some("555-0100".to_string()),
        };
        client.register(&request).await.unwrap();
        assert!(client.session().is_customer());
    }

    #[tokio::test]
    async fn test_refresh_replaces_tokens() {
        let server = MockServer::start().await;
        let client = client(&server, MemoryStore::new());
        let first = token_expiring_at(Utc::now() + TimeDelta::seconds(600));
        let second = token_expiring_at(Utc::now() + TimeDelta::seconds(3600));

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body(&first, "refresh-1", "MANAGER")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .and(header("authorization", "Bearer refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body(&second, "refresh-2", "MANAGER")))
            .expect(1)
            .mount(&server)
            .await;

        client.login("ann@example.com", "secret123").await.unwrap();
        client.refresh().await.unwrap();

        let session = client.session().current_session().unwrap();
        assert_eq!(session.tokens.access_token, second);
        assert_eq!(session.tokens.refresh_token, "refresh-2");
    }

    #[tokio::test]
    async fn test_rejected_refresh_expires_session() {
        let server = MockServer::start().await;
        let client = client(&server, MemoryStore::new());
        let access_token = token_expiring_at(Utc::now() + TimeDelta::seconds(600));

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body(&access_token, "refresh-1", "CUSTOMER")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        client.login("ann@example.com", "secret123").await.unwrap();
        assert!(matches!(client.refresh().await, Err(SessionError::AuthorizationExpired)));
        assert!(!client.session().is_authenticated());
        assert!(client.session().session_expired());
    }

    #[tokio::test]
    async fn test_logout() {
        let server = MockServer::start().await;
        let store = MemoryStore::new();
        let client = client(&server, store.clone());
        let access_token = token_expiring_at(Utc::now() + TimeDelta::seconds(3600));

        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body(&access_token, "refresh-1", "CUSTOMER")))
            .mount(&server)
            .await;

        client.login("ann@example.com", "secret123").await.unwrap();
        client.logout();

        assert!(!client.session().is_authenticated());
        assert!(!client.session().session_expired());
        assert!(store.is_empty());
    }
}
