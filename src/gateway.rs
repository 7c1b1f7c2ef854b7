//! HTTP boundary to the storefront API
//!
//! Attaches the current session's bearer token to outgoing requests, unwraps
//! the `{success, message, data}` envelope, and turns a 401 on an
//! authenticated request into an expired-session termination. Navigation in
//! response is left to the UI, which observes the session ending.

use crate::config::ClientConfig;
use crate::error::{Result, SessionError};
use crate::session::{Credential, SessionManager};
use crate::types::{ApiEnvelope, EndReason};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which credential a request carries
enum Auth<'a> {
    /// The current session's access token, if any
    Session,
    /// No credential at all (login, registration)
    Anonymous,
    /// An explicit token, e.g. the refresh token
    Bearer(&'a str),
}

/// API client bound to one session manager
pub struct ApiGateway {
    config: ClientConfig,
    http_client: Client,
    session: Arc<SessionManager>,
}

impl ApiGateway {
    pub fn new(config: ClientConfig, session: Arc<SessionManager>) -> Result<Self> {
        config.validate()?;
        let http_client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            config,
            http_client,
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http_client.request(method, self.config.endpoint(path))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(self.request(Method::GET, path), Auth::Session).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.execute(self.request(Method::GET, path).query(query), Auth::Session).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.request(Method::POST, path).json(body), Auth::Session).await
    }

    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(self.request(Method::POST, path), Auth::Session).await
    }

    pub async fn put_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        self.execute(self.request(Method::PUT, path).query(query), Auth::Session).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(self.request(Method::DELETE, path), Auth::Session).await
    }

    /// POST without any credential
    pub async fn post_anonymous<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(self.request(Method::POST, path).json(body), Auth::Anonymous).await
    }

    /// POST with an explicit bearer token in place of the session's
    pub async fn post_with_bearer<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T> {
        self.execute(self.request(Method::POST, path), Auth::Bearer(token)).await
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, auth: Auth<'_>) -> Result<T> {
        let credential: Option<Credential> = match auth {
            Auth::Session => self.session.credential(),
            Auth::Anonymous | Auth::Bearer(_) => None,
        };

        let request = match (&credential, &auth) {
            (Some(credential), _) => request.bearer_auth(&credential.access_token),
            (None, Auth::Bearer(token)) => request.bearer_auth(token),
            (None, _) => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let url = response.url().path().to_string();
        let body = response.bytes().await?;

        if status.is_success() {
            debug!(%status, path = %url, "API request succeeded");
            return decode_data(&body);
        }

        let envelope: Option<ApiEnvelope<Value>> = serde_json::from_slice(&body).ok();
        let message = envelope
            .as_ref()
            .and_then(|envelope| envelope.message.clone())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        if status == StatusCode::UNAUTHORIZED {
            if let Some(credential) = credential {
                if self.session.terminate_epoch(credential.epoch, EndReason::Expired) {
                    warn!(path = %url, "Server rejected the session credential, session ended");
                }
            }
            return Err(SessionError::Unauthorized(message));
        }

        if status == StatusCode::BAD_REQUEST {
            if let Some(fields) = envelope.and_then(|envelope| envelope.data).and_then(field_errors) {
                return Err(SessionError::ValidationFailed { message, fields });
            }
        }

        warn!(%status, path = %url, error = %message, "API request failed");
        Err(SessionError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn decode_data<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_value(Value::Null)?);
    }
    let envelope: ApiEnvelope<Value> = serde_json::from_slice(body)?;
    Ok(serde_json::from_value(envelope.data.unwrap_or(Value::Null))?)
}

/// Per-field messages, when `data` is an object of strings
fn field_errors(data: Value) -> Option<BTreeMap<String, String>> {
    let Value::Object(map) = data else {
        return None;
    };
    let fields: BTreeMap<String, String> = map
        .into_iter()
        .filter_map(|(field, message)| match message {
            Value::String(message) => Some((field, message)),
            _ => None,
        })
        .collect();
    (!fields.is_empty()).then_some(fields)
}
