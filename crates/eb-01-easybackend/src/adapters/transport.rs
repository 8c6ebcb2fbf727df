//! # easybackend Transport
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list | `GET api/easybackend/receive/{scope}` |
//! | send | `POST api/easybackend/send/{scope}/{receiver}` |
//! | delete | `DELETE api/easybackend/message/{id}` |
//! | purge | `DELETE api/easybackend/message` |
//! | initial | `GET api/easybackend/list/_round0` |
//!
//! Every request carries the bearer token and follows the retry contract of
//! [`with_token_retry`]. Status 418 on send is the fatal
//! duplicate-initial-message conflict.

use crate::adapters::password_grant::PasswordGrantProvider;
use crate::adapters::wire::parse_items;
use crate::auth::{with_token_retry, TokenCache};
use crate::domain::{EasyBackendSettings, SettingsError};
use crate::ports::outbound::TokenProvider;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Proxy, Response, StatusCode, Url};
use serde_json::Value;
use shared_bus::{MessageFilter, ReceivedUnit, Receipt, TransportAdapter, TransportError};
use shared_types::{codec, CodecError, Participant, Round, Scope, WireUnit};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Status the backend uses for a second initial message in one scope.
pub const STATUS_DUPLICATE_INITIAL_MESSAGE: u16 = 418;

impl From<SettingsError> for TransportError {
    fn from(e: SettingsError) -> Self {
        TransportError::Settings(e.to_string())
    }
}

/// [`TransportAdapter`] over the easybackend REST API.
pub struct EasyBackendTransport {
    client: Client,
    base: Url,
    tokens: Arc<TokenCache>,
}

impl EasyBackendTransport {
    /// Connect with the password grant described by `settings`.
    ///
    /// # Errors
    ///
    /// `TransportError::Settings` if the settings are invalid.
    pub fn new(settings: &EasyBackendSettings) -> Result<Self, TransportError> {
        settings.validate()?;
        let client = build_client(settings)?;
        let provider = PasswordGrantProvider::new(client.clone(), settings)?;
        Ok(Self {
            client,
            base: settings.api_url()?,
            tokens: Arc::new(TokenCache::new(Arc::new(provider))),
        })
    }

    /// Connect with a custom token source.
    ///
    /// # Errors
    ///
    /// `TransportError::Settings` if the API URL is invalid.
    pub fn with_token_provider(
        settings: &EasyBackendSettings,
        provider: Arc<dyn TokenProvider>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(settings)?,
            base: settings.api_url()?,
            tokens: Arc::new(TokenCache::new(provider)),
        })
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| TransportError::Settings("API URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["api", "easybackend"])
            .extend(segments);
        Ok(url)
    }

    async fn call(
        &self,
        method: Method,
        url: &Url,
        body: Option<&str>,
    ) -> Result<Response, TransportError> {
        with_token_retry(&self.tokens, |token| {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(token.as_str());
            if let Some(body) = body {
                request = request
                    .header(CONTENT_TYPE, "text/plain")
                    .body(body.to_string());
            }

            async move {
                let response = request.send().await.map_err(map_request_error)?;
                let status = response.status();
                if status == StatusCode::UNAUTHORIZED {
                    return Err(TransportError::Unauthenticated);
                }
                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    return Err(TransportError::Http {
                        status: status.as_u16(),
                        message,
                    });
                }
                Ok(response)
            }
        })
        .await
    }

    async fn fetch_items(&self, url: &Url) -> Result<Vec<ReceivedUnit>, TransportError> {
        let response = self.call(Method::GET, url, None).await?;
        let items: Vec<Value> = response
            .json()
            .await
            .map_err(|e| TransportError::Codec(CodecError::Deserialize(e.to_string())))?;
        Ok(parse_items(items))
    }
}

fn build_client(settings: &EasyBackendSettings) -> Result<Client, TransportError> {
    let mut builder = Client::builder()
        .timeout(settings.request_timeout())
        .connect_timeout(settings.connect_timeout());
    if let Some(proxy) = settings
        .proxy_url()
        .map_err(|e| TransportError::Settings(e.to_string()))?
    {
        debug!(proxy = %proxy, "Using HTTP proxy");
        builder = builder.proxy(
            Proxy::all(proxy).map_err(|e| TransportError::Settings(e.to_string()))?,
        );
    }
    builder
        .build()
        .map_err(|e| TransportError::Settings(e.to_string()))
}

fn map_request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}

#[async_trait]
impl TransportAdapter for EasyBackendTransport {
    fn name(&self) -> &'static str {
        "easybackend"
    }

    async fn list_messages(
        &self,
        scope: &Scope,
        _participant: &Participant,
    ) -> Result<Vec<ReceivedUnit>, TransportError> {
        let url = self.endpoint(&["receive", scope.name()])?;
        let units = self.fetch_items(&url).await?;
        debug!(scope = %scope, count = units.len(), "Received units");
        Ok(units)
    }

    async fn send_message(
        &self,
        scope: &Scope,
        receiver: &Participant,
        unit: &WireUnit,
    ) -> Result<(), TransportError> {
        let body = codec::encode_unit(unit)?;
        let url = self.endpoint(&["send", scope.name(), receiver.identifier()])?;

        match self.call(Method::POST, &url, Some(&body)).await {
            Ok(_) => Ok(()),
            Err(TransportError::Http { status, .. })
                if status == STATUS_DUPLICATE_INITIAL_MESSAGE =>
            {
                let err = TransportError::DuplicateInitialMessage {
                    scope: scope.name().to_string(),
                    receiver: receiver.identifier().to_string(),
                };
                error!(error = %err, "Backend rejected initial message");
                Err(err)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_message(&self, receipt: &Receipt) -> Result<(), TransportError> {
        let id: i64 = receipt
            .as_str()
            .parse()
            .map_err(|_| TransportError::InvalidReceipt(receipt.to_string()))?;
        let url = self.endpoint(&["message", &id.to_string()])?;
        self.call(Method::DELETE, &url, None).await?;
        Ok(())
    }

    /// Deletes every message of the account; the backend has no filtered purge.
    async fn purge(&self, _filter: &MessageFilter) -> Result<(), TransportError> {
        let url = self.endpoint(&["message"])?;
        self.call(Method::DELETE, &url, None).await?;
        info!("Purged all backend messages");
        Ok(())
    }

    async fn list_initial_messages(
        &self,
        _participant: &Participant,
    ) -> Result<Vec<ReceivedUnit>, TransportError> {
        let url = self.endpoint(&["list", Round::Initial.tag()])?;
        self.fetch_items(&url).await
    }
}
