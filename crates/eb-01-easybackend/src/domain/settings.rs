//! Connection settings with validation.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default OAuth realm.
pub const DEFAULT_REALM: &str = "easybackend";

/// Default OAuth client id.
pub const DEFAULT_CLIENT_ID: &str = "easy-client";

/// Default pause between mailbox checks on the backend.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 3_000;

/// Default largest unit sent in one request.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Settings errors. All of them are fatal for the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("API server URL is missing")]
    MissingApiServer,

    #[error("Invalid {field} URL {url}: {reason}")]
    InvalidUrl {
        field: &'static str,
        url: String,
        reason: String,
    },

    #[error("{field} URL must use https: {url}")]
    InsecureScheme { field: &'static str, url: String },

    #[error("{field} is missing")]
    Missing { field: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Settings for one easybackend connection.
///
/// The auth server defaults to the API server. URLs without a port use the
/// scheme's default (443 for https).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EasyBackendSettings {
    /// Base URL of the easybackend API
    pub api_server: String,
    /// Base URL of the identity provider; `None` uses `api_server`
    pub auth_server: Option<String>,
    /// OAuth realm
    pub realm: String,
    /// OAuth client id
    pub client_id: String,
    /// Optional OAuth client secret
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    /// Account name for the password grant
    pub username: String,
    /// Account password for the password grant
    #[serde(skip_serializing)]
    pub password: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Connection establishment timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Largest unit sent in one request
    pub max_message_size: usize,
    /// Poll interval in milliseconds
    pub check_interval_ms: u64,
    /// Accept plain http URLs (local test servers only)
    pub allow_insecure_http: bool,
    /// HTTP proxy for API and auth requests; `None` uses the proxy
    /// environment variables
    pub proxy: Option<String>,
}

impl Default for EasyBackendSettings {
    fn default() -> Self {
        Self {
            api_server: String::new(),
            auth_server: None,
            realm: DEFAULT_REALM.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            client_secret: None,
            username: String::new(),
            password: String::new(),
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            allow_insecure_http: false,
            proxy: None,
        }
    }
}

impl fmt::Debug for EasyBackendSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EasyBackendSettings")
            .field("api_server", &self.api_server)
            .field("auth_server", &self.auth_server)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("max_message_size", &self.max_message_size)
            .field("check_interval_ms", &self.check_interval_ms)
            .field("proxy", &self.proxy)
            .finish_non_exhaustive()
    }
}

impl EasyBackendSettings {
    /// Settings for `api_server` with the given account and defaults elsewhere.
    #[must_use]
    pub fn new(
        api_server: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            api_server: api_server.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.api_url()?;
        self.token_endpoint()?;
        self.proxy_url()?;

        if self.username.trim().is_empty() {
            return Err(SettingsError::Missing { field: "username" });
        }
        if self.realm.trim().is_empty() {
            return Err(SettingsError::Missing { field: "realm" });
        }
        if self.client_id.trim().is_empty() {
            return Err(SettingsError::Missing { field: "client_id" });
        }
        for (field, value) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("check_interval_ms", self.check_interval_ms),
        ] {
            if value == 0 {
                return Err(SettingsError::Zero { field });
            }
        }
        if self.max_message_size == 0 {
            return Err(SettingsError::Zero {
                field: "max_message_size",
            });
        }
        Ok(())
    }

    /// Parsed API base URL, always ending in `/`.
    pub fn api_url(&self) -> Result<Url, SettingsError> {
        if self.api_server.trim().is_empty() {
            return Err(SettingsError::MissingApiServer);
        }
        self.parse_base("api_server", &self.api_server)
    }

    /// Parsed auth base URL, falling back to the API server.
    pub fn auth_url(&self) -> Result<Url, SettingsError> {
        match self.auth_server.as_deref().map(str::trim) {
            Some(server) if !server.is_empty() => self.parse_base("auth_server", server),
            _ => self.api_url(),
        }
    }

    /// `{auth}/auth/realms/{realm}/protocol/openid-connect/token`
    pub fn token_endpoint(&self) -> Result<Url, SettingsError> {
        let mut url = self.auth_url()?;
        let base = url.to_string();
        url.path_segments_mut()
            .map_err(|()| SettingsError::InvalidUrl {
                field: "auth_server",
                url: base,
                reason: "cannot be a base".into(),
            })?
            .pop_if_empty()
            .extend([
                "auth",
                "realms",
                self.realm.as_str(),
                "protocol",
                "openid-connect",
                "token",
            ]);
        Ok(url)
    }

    /// Parsed proxy URL, `None` if unset. Only `http` and `https` proxies
    /// are supported.
    pub fn proxy_url(&self) -> Result<Option<Url>, SettingsError> {
        let Some(raw) = self.proxy.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        let invalid = |reason: String| SettingsError::InvalidUrl {
            field: "proxy",
            url: raw.to_string(),
            reason,
        };
        let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if url.host_str().is_none() {
            return Err(invalid("no host".into()));
        }
        Ok(Some(url))
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    fn parse_base(&self, field: &'static str, raw: &str) -> Result<Url, SettingsError> {
        let mut url = Url::parse(raw.trim()).map_err(|e| SettingsError::InvalidUrl {
            field,
            url: raw.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_http => {}
            "http" => {
                return Err(SettingsError::InsecureScheme {
                    field,
                    url: raw.to_string(),
                })
            }
            other => {
                return Err(SettingsError::InvalidUrl {
                    field,
                    url: raw.to_string(),
                    reason: format!("unsupported scheme {other}"),
                })
            }
        }

        if url.cannot_be_a_base() || url.host_str().is_none() {
            return Err(SettingsError::InvalidUrl {
                field,
                url: raw.to_string(),
                reason: "no host".into(),
            });
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EasyBackendSettings {
        EasyBackendSettings::new("https://backend.example.org", "alice", "secret")
    }

    #[test]
    fn test_valid_settings() {
        let settings = settings();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.api_url().unwrap().port_or_known_default(), Some(443));
    }

    #[test]
    fn test_missing_api_server_fatal() {
        let settings = EasyBackendSettings::default();
        assert_eq!(settings.validate(), Err(SettingsError::MissingApiServer));
    }

    #[test]
    fn test_http_rejected_unless_allowed() {
        let mut settings = settings();
        settings.api_server = "http://localhost:8080".into();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InsecureScheme { .. })
        ));

        settings.allow_insecure_http = true;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_garbage_url_rejected() {
        let mut settings = settings();
        settings.api_server = "not a url".into();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidUrl { field: "api_server", .. })
        ));
    }

    #[test]
    fn test_token_endpoint_defaults_to_api_server() {
        let settings = settings();
        assert_eq!(
            settings.token_endpoint().unwrap().as_str(),
            "https://backend.example.org/auth/realms/easybackend/protocol/openid-connect/token"
        );
    }

    #[test]
    fn test_token_endpoint_keeps_base_path() {
        let mut settings = settings();
        settings.auth_server = Some("https://id.example.org:8443/kc".into());
        settings.realm = "study".into();
        assert_eq!(
            settings.token_endpoint().unwrap().as_str(),
            "https://id.example.org:8443/kc/auth/realms/study/protocol/openid-connect/token"
        );
    }

    #[test]
    fn test_proxy_url() {
        let mut settings = settings();
        assert_eq!(settings.proxy_url(), Ok(None));

        settings.proxy = Some("http://proxy.example.org:3128".into());
        assert!(settings.validate().is_ok());
        assert_eq!(
            settings.proxy_url().unwrap().unwrap().port(),
            Some(3128)
        );

        settings.proxy = Some("socks5://proxy.example.org:1080".into());
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::InvalidUrl { field: "proxy", .. })
        ));
    }

    #[test]
    fn test_missing_username() {
        let settings = EasyBackendSettings::new("https://backend.example.org", " ", "pw");
        assert_eq!(
            settings.validate(),
            Err(SettingsError::Missing { field: "username" })
        );
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", settings());
        assert!(!rendered.contains("secret"));
    }
}
