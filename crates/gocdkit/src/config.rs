//! Connection settings for one GoCD server

use crate::error::ConfigError;
use base64::{Engine, engine::general_purpose::STANDARD};
use std::time::Duration;

/// Default per-call timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How to reach and authenticate against a GoCD server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GocdConfig {
    /// Server URL, with or without the trailing `/go`
    pub server: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Accept any TLS certificate
    pub skip_ssl_check: bool,
    /// Upper bound on each remote call
    pub timeout: Duration,
}

impl GocdConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            username: None,
            password: None,
            skip_ssl_check: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_skip_ssl_check(mut self, skip: bool) -> Self {
        self.skip_ssl_check = skip;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the settings are usable before opening a client
    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = self.server.trim();
        if server.is_empty() {
            return Err(ConfigError::MissingServer);
        }
        if !(server.starts_with("http://") || server.starts_with("https://")) {
            return Err(ConfigError::InvalidServer(server.to_string()));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::PartialCredentials);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Base URL ending in `/go`, without a trailing slash.
    ///
    /// Accepts both `http://host:8153` and `http://host:8153/go/`.
    pub fn base_url(&self) -> String {
        let trimmed = self.server.trim().trim_end_matches('/');
        if trimmed.ends_with("/go") {
            trimmed.to_string()
        } else {
            format!("{trimmed}/go")
        }
    }

    /// `Authorization` header value for basic auth, if credentials are set
    pub fn authorization(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                let token = STANDARD.encode(format!("{user}:{pass}"));
                Some(format!("Basic {token}"))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(
            GocdConfig::new("http://127.0.0.1:8153/go/").base_url(),
            "http://127.0.0.1:8153/go"
        );
        assert_eq!(
            GocdConfig::new("https://ci.example.com").base_url(),
            "https://ci.example.com/go"
        );
        assert_eq!(
            GocdConfig::new("https://ci.example.com/go").base_url(),
            "https://ci.example.com/go"
        );
    }

    #[test]
    fn test_authorization_header() {
        let config = GocdConfig::new("http://localhost:8153").with_credentials("admin", "badger");
        assert_eq!(
            config.authorization().as_deref(),
            Some("Basic YWRtaW46YmFkZ2Vy")
        );
        assert!(GocdConfig::new("http://localhost:8153").authorization().is_none());
    }

    #[test]
    fn test_validate() {
        assert!(GocdConfig::new("http://localhost:8153").validate().is_ok());
        assert!(matches!(
            GocdConfig::new("").validate(),
            Err(ConfigError::MissingServer)
        ));
        assert!(matches!(
            GocdConfig::new("localhost:8153").validate(),
            Err(ConfigError::InvalidServer(_))
        ));

        let mut partial = GocdConfig::new("http://localhost:8153");
        partial.username = Some("admin".into());
        assert!(matches!(
            partial.validate(),
            Err(ConfigError::PartialCredentials)
        ));

        let zero = GocdConfig::new("http://localhost:8153").with_timeout(Duration::ZERO);
        assert!(matches!(zero.validate(), Err(ConfigError::ZeroTimeout)));
    }
}
