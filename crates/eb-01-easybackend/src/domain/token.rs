//! Bearer token and authentication errors.

use shared_bus::TransportError;
use std::fmt;
use thiserror::Error;

/// OAuth2 access token sent as `Authorization: Bearer {token}`.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

/// Token acquisition failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Identity provider rejected username or password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Unexpected status from the token endpoint.
    #[error("Token endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// Token endpoint unreachable.
    #[error("Network error: {0}")]
    Network(String),

    /// Response did not contain an access token.
    #[error("Malformed token response: {0}")]
    MalformedResponse(String),
}

impl From<AuthError> for TransportError {
    fn from(e: AuthError) -> Self {
        TransportError::Auth(e.to_string())
    }
}
