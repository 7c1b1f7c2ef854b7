//! Client configuration

use crate::error::{Result, SessionError};
use crate::scheduler::LOGOUT_MARGIN_SECS;
use crate::token::EXPIRY_BUFFER_SECS;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the server origin (without the `/api` suffix)
pub const API_URL_ENV: &str = "BOOKSTORE_API_URL";

/// Environment variable naming the file credentials persist to
pub const STORAGE_PATH_ENV: &str = "BOOKSTORE_SESSION_FILE";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Upper bound for the expiry buffer and the logout margin
pub const MAX_WINDOW_SECS: i64 = 86_400;

/// Configuration for the bookstore client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to, including the `/api` prefix
    pub api_base_url: String,

    /// Seconds subtracted from token expiry before any validity check
    /// Default: 10 seconds
    pub expiry_buffer_secs: i64,

    /// Seconds before token expiry at which the client logs itself out
    /// Default: 30 seconds
    pub logout_margin_secs: i64,

    /// Timeout applied to every HTTP request
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// JSON file credentials persist to; in-memory only when `None`
    pub storage_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            expiry_buffer_secs: EXPIRY_BUFFER_SECS,
            logout_margin_secs: LOGOUT_MARGIN_SECS,
            request_timeout: Duration::from_secs(30),
            storage_path: None,
        }
    }
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// Build from `BOOKSTORE_API_URL` and `BOOKSTORE_SESSION_FILE`
    ///
    /// The server origin gets `/api` appended; without it the local default
    /// is used.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(origin) = std::env::var(API_URL_ENV) {
            let origin = origin.trim().trim_end_matches('/');
            if origin.is_empty() {
                return Err(SessionError::Configuration(format!("{API_URL_ENV} is empty")));
            }
            config.api_base_url = format!("{origin}/api");
        }

        if let Ok(path) = std::env::var(STORAGE_PATH_ENV) {
            if !path.trim().is_empty() {
                config.storage_path = Some(PathBuf::from(path));
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(SessionError::Configuration(format!(
                "API base URL must be http(s): {}",
                self.api_base_url
            )));
        }
        for (name, secs) in [
            ("expiry buffer", self.expiry_buffer_secs),
            ("logout margin", self.logout_margin_secs),
        ] {
            if !(0..=MAX_WINDOW_SECS).contains(&secs) {
                return Err(SessionError::Configuration(format!(
                    "{name} must be between 0 and {MAX_WINDOW_SECS} seconds, got {secs}"
                )));
            }
        }
        Ok(())
    }

    /// Join an endpoint path onto the base URL
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.expiry_buffer_secs, 10);
        assert_eq!(config.logout_margin_secs, 30);
        assert!(config.storage_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_join() {
        let config = ClientConfig::new("https://shop.example.com/api/");
        assert_eq!(config.endpoint("/auth/login"), "https://shop.example.com/api/auth/login");
        assert_eq!(config.endpoint("cart"), "https://shop.example.com/api/cart");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ClientConfig::new("ftp://nope").validate().is_err());

        let mut config = ClientConfig::default();
        config.logout_margin_secs = -1;
        assert!(matches!(config.validate(), Err(SessionError::Configuration(_))));

        let mut config = ClientConfig::default();
        config.expiry_buffer_secs = i64::MAX;
        assert!(matches!(config.validate(), Err(SessionError::Configuration(_))));

        let mut config = ClientConfig::default();
        config.logout_margin_secs = MAX_WINDOW_SECS + 1;
        assert!(matches!(config.validate(), Err(SessionError::Configuration(_))));

        config.logout_margin_secs = MAX_WINDOW_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = ClientConfig::new("https://shop.example.com/api")
            .with_storage_path("/tmp/bookstore-session.json")
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.storage_path, Some(PathBuf::from("/tmp/bookstore-session.json")));
        assert!(config.validate().is_ok());
    }
}
