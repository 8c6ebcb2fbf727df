//! OAuth2 resource owner password grant against a Keycloak-style realm.

use crate::domain::{AuthError, BearerToken, EasyBackendSettings, SettingsError};
use crate::ports::outbound::TokenProvider;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Fetches tokens with `grant_type=password`.
pub struct PasswordGrantProvider {
    client: Client,
    endpoint: Url,
    client_id: String,
    client_secret: Option<String>,
    username: String,
    password: String,
}

impl PasswordGrantProvider {
    /// Create a provider for the token endpoint described by `settings`.
    ///
    /// # Errors
    ///
    /// `SettingsError` if the auth URL is invalid.
    pub fn new(client: Client, settings: &EasyBackendSettings) -> Result<Self, SettingsError> {
        Ok(Self {
            client,
            endpoint: settings.token_endpoint()?,
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            username: settings.username.clone(),
            password: settings.password.clone(),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TokenProvider for PasswordGrantProvider {
    async fn fetch_token(&self) -> Result<BearerToken, AuthError> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("scope", "openid"),
            ("grant_type", "password"),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];
        if let Some(secret) = self.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        debug!(endpoint = %self.endpoint, username = %self.username, "Requesting token");

        let response = self
            .client
            .post(self.endpoint.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                return Err(AuthError::InvalidCredentials)
            }
            status if !status.is_success() => {
                return Err(AuthError::Status {
                    status: status.as_u16(),
                })
            }
            _ => {}
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::MalformedResponse(e.to_string()))?;

        match body.access_token {
            Some(token) if !token.is_empty() => Ok(BearerToken::new(token)),
            _ => Err(AuthError::MalformedResponse(
                "access_token missing".to_string(),
            )),
        }
    }
}
