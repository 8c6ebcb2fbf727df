//! Outbound ports (SPI) for the easybackend transport.

use crate::domain::{AuthError, BearerToken};
use async_trait::async_trait;

/// Source of fresh bearer tokens (identity provider).
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Acquire a new token. Every call performs a fresh exchange.
    async fn fetch_token(&self) -> Result<BearerToken, AuthError>;
}
