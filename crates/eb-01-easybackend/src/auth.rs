//! # Authentication Handler
//!
//! Caches the bearer token and renews it when the backend answers 401.
//!
//! ## Renewal
//!
//! Renewal holds the cache lock for the whole token exchange, so concurrent
//! callers that hit a 401 with the same stale token wait for one exchange
//! and then share its result:
//!
//! ```text
//! task A: 401 with T1 ──→ renew_after_rejection(T1) ──→ fetch ──→ T2
//! task B: 401 with T1 ──→ renew_after_rejection(T1) ──(waits)──→ T2 (no fetch)
//! ```
//!
//! ## Retry contract
//!
//! [`with_token_retry`] runs an operation, renews once on
//! `TransportError::Unauthenticated` and retries exactly once. Any other
//! error, including the duplicate-initial-message conflict, is returned
//! without renewal.

use crate::domain::{AuthError, BearerToken};
use crate::ports::outbound::TokenProvider;
use shared_bus::TransportError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Bearer token cache with single-flight renewal.
pub struct TokenCache {
    provider: Arc<dyn TokenProvider>,
    current: Mutex<Option<BearerToken>>,
    renewals: AtomicU64,
}

impl TokenCache {
    #[must_use]
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self {
            provider,
            current: Mutex::new(None),
            renewals: AtomicU64::new(0),
        }
    }

    /// Cached token, acquiring one first if none is cached.
    ///
    /// # Errors
    ///
    /// `AuthError` if the initial acquisition fails.
    pub async fn get_token(&self) -> Result<BearerToken, AuthError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            return Ok(token.clone());
        }

        let token = self.provider.fetch_token().await?;
        debug!("Bearer token acquired");
        *current = Some(token.clone());
        Ok(token)
    }

    /// Unconditionally replace the cached token with a fresh one.
    ///
    /// # Errors
    ///
    /// `AuthError` if the exchange fails; the cache is cleared in that case.
    pub async fn renew_token(&self) -> Result<BearerToken, AuthError> {
        let mut current = self.current.lock().await;
        self.renew_locked(&mut current).await
    }

    /// Renew after `rejected` was refused by the backend.
    ///
    /// If another caller already replaced `rejected`, its token is returned
    /// without a new exchange.
    ///
    /// # Errors
    ///
    /// `AuthError` if the exchange fails.
    pub async fn renew_after_rejection(
        &self,
        rejected: &BearerToken,
    ) -> Result<BearerToken, AuthError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref().filter(|token| *token != rejected) {
            debug!("Token already renewed by a concurrent request");
            return Ok(token.clone());
        }
        self.renew_locked(&mut current).await
    }

    /// Drop the cached token.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }

    /// Number of renewals performed (initial acquisition excluded).
    #[must_use]
    pub fn renewal_count(&self) -> u64 {
        self.renewals.load(Ordering::Relaxed)
    }

    async fn renew_locked(
        &self,
        current: &mut Option<BearerToken>,
    ) -> Result<BearerToken, AuthError> {
        match self.provider.fetch_token().await {
            Ok(token) => {
                self.renewals.fetch_add(1, Ordering::Relaxed);
                info!("Bearer token renewed");
                *current = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                warn!(error = %e, "Unable to renew bearer token");
                *current = None;
                Err(e)
            }
        }
    }
}

/// Run `operation` with the cached token; on 401 renew once and retry once.
///
/// # Errors
///
/// - `TransportError::Auth` if no token can be obtained
/// - the operation's error otherwise, including a second 401
pub async fn with_token_retry<T, F, Fut>(
    tokens: &TokenCache,
    mut operation: F,
) -> Result<T, TransportError>
where
    F: FnMut(BearerToken) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let token = tokens.get_token().await?;

    match operation(token.clone()).await {
        Err(TransportError::Unauthenticated) => {
            debug!("Request unauthenticated, renewing token and retrying once");
            let fresh = tokens.renew_after_rejection(&token).await?;
            operation(fresh).await
        }
        other => other,
    }
}
