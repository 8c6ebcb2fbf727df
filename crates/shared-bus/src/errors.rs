//! # Bus Errors
//!
//! Error taxonomy shared by the bus core and the transport adapters.
//!
//! | Class | Examples | Handling |
//! |-------|----------|----------|
//! | Transient | 401, timeouts, connection refused | retried by the adapter or the next poll cycle |
//! | Fatal | duplicate initial message, bad settings | surfaced immediately, never retried |
//! | Per-item | undecodable inbound item | logged and skipped by the adapter |

use shared_types::{CodecError, MessageId};
use thiserror::Error;

/// Failure of a transport adapter operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Backend rejected the credentials (HTTP 401).
    #[error("Unauthenticated")]
    Unauthenticated,

    /// A second initial message for the same scope and receiver (HTTP 418).
    #[error("Tried to add an illegal second initial message for scope {scope} and receiver {receiver}")]
    DuplicateInitialMessage { scope: String, receiver: String },

    /// Unexpected HTTP status.
    #[error("HTTP return code {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection level failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Request did not finish within the configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Outbound unit could not be encoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Token acquisition failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Connection settings are unusable.
    #[error("Invalid settings: {0}")]
    Settings(String),

    /// Mail store failure.
    #[error("Mailbox error: {0}")]
    Mailbox(String),

    /// Receipt does not belong to this transport.
    #[error("Invalid receipt: {0}")]
    InvalidReceipt(String),

    /// Operation not offered by this transport.
    #[error("Operation not supported by transport: {0}")]
    Unsupported(&'static str),
}

impl TransportError {
    /// Errors that must not be retried.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DuplicateInitialMessage { .. } | Self::Settings(_) | Self::Unsupported(_)
        )
    }

    /// Errors expected to clear up on a later attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unauthenticated | Self::Network(_) | Self::Timeout(_) | Self::Mailbox(_) => {
                true
            }
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Failure of a bus operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Message could not be serialized or reassembled bytes could not be decoded.
    #[error("Encoding error: {0}")]
    Encoding(#[from] CodecError),

    /// Fragment disagrees with fragments already stored for its message.
    #[error("Fragment for message {message_id} declares {received} fragments, expected {expected}")]
    InconsistentFragment {
        message_id: MessageId,
        expected: u32,
        received: u32,
    },

    /// Fragments announce or carry more than one message may hold.
    #[error("Fragments of message {message_id} exceed the limit of {limit} bytes")]
    FragmentLimit { message_id: MessageId, limit: usize },

    /// Message needs more fragments than the wire format can number.
    #[error("Message of {size} bytes needs too many fragments")]
    TooManyFragments { size: usize },

    /// Transport failure.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The bus has been stopped.
    #[error("Bus is stopped")]
    Stopped,

    /// Lifecycle operation not valid in the current state.
    #[error("Invalid bus state: expected {expected}, was {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Operation requires a Tokio runtime.
    #[error("No Tokio runtime available")]
    NoRuntime,

    /// Background task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    /// Invalid bus configuration.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl BusError {
    /// Whether the failure is fatal for the caller's round logic.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_fatal(),
            Self::Config(_) | Self::TooManyFragments { .. } => true,
            _ => false,
        }
    }
}

/// Bus configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}
