//! # easybackend Transport
//!
//! Carries bus units over the easybackend REST API. Requests are
//! authenticated with a bearer token obtained through the OAuth2 password
//! grant; a 401 renews the token once and retries the request once.
//!
//! ## Architecture
//!
//! - **Domain Layer:** connection settings and token value types
//! - **Ports Layer:** the [`TokenProvider`] seam
//! - **Auth:** token cache with single-flight renewal
//! - **Adapters Layer:** password grant client and the [`EasyBackendTransport`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use eb_01_easybackend::{EasyBackendSettings, EasyBackendTransport};
//! use shared_bus::{Bus, BusConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = EasyBackendSettings::new("https://backend.example.org", "alice", "secret");
//! let transport = EasyBackendTransport::new(&settings)?;
//! let bus = Bus::new(BusConfig::default(), Arc::new(transport))?;
//! # drop(bus);
//! # Ok(())
//! # }
//! ```

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod auth;
pub mod domain;
pub mod ports;

// =============================================================================
// ADAPTERS
// =============================================================================

pub mod adapters;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use adapters::transport::STATUS_DUPLICATE_INITIAL_MESSAGE;
pub use adapters::{EasyBackendTransport, PasswordGrantProvider};
pub use auth::{with_token_retry, TokenCache};
pub use domain::{AuthError, BearerToken, EasyBackendSettings, SettingsError};
pub use ports::outbound::TokenProvider;
