//! # Transport Port
//!
//! The interface every backend implements. The bus core depends only on
//! [`TransportAdapter`]; concrete backends are injected at construction.
//!
//! Inbound units come paired with a [`Receipt`], the handle the transport
//! needs to delete the underlying item once the message was delivered.

use crate::errors::TransportError;
use async_trait::async_trait;
use shared_types::{Participant, Scope, WireUnit};
use std::fmt;
use std::sync::Arc;

/// Transport handle of a received item (backend id, mail uid, local slot).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receipt(String);

impl Receipt {
    #[must_use]
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Receipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decoded wire unit and the receipt to acknowledge it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedUnit {
    pub unit: WireUnit,
    pub receipt: Receipt,
}

impl ReceivedUnit {
    #[must_use]
    pub fn new(unit: WireUnit, receipt: Receipt) -> Self {
        Self { unit, receipt }
    }
}

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Selects stored items by their description (mail subject, scope name).
#[derive(Clone)]
pub struct MessageFilter {
    predicate: Option<Predicate>,
}

impl MessageFilter {
    /// Accept everything.
    #[must_use]
    pub fn all() -> Self {
        Self { predicate: None }
    }

    /// Accept descriptions matching `predicate`.
    pub fn new(predicate: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Accept descriptions containing `pattern`.
    #[must_use]
    pub fn containing(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        Self::new(move |description| description.contains(&pattern))
    }

    #[must_use]
    pub fn accepts(&self, description: &str) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(description))
    }
}

impl Default for MessageFilter {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Debug for MessageFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageFilter")
            .field("matches_all", &self.predicate.is_none())
            .finish()
    }
}

/// Backend-specific network operations scoped by [`Scope`] and [`Participant`].
///
/// Implementations bound every call by their request timeout. Inbound items
/// that fail to decode are logged and skipped, never returned as errors.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// Fetch all pending units for `participant` within `scope`.
    async fn list_messages(
        &self,
        scope: &Scope,
        participant: &Participant,
    ) -> Result<Vec<ReceivedUnit>, TransportError>;

    /// Deliver one unit to `receiver` within `scope`.
    async fn send_message(
        &self,
        scope: &Scope,
        receiver: &Participant,
        unit: &WireUnit,
    ) -> Result<(), TransportError>;

    /// Remove the item behind `receipt`.
    async fn delete_message(&self, receipt: &Receipt) -> Result<(), TransportError>;

    /// Make preceding deletions permanent (mailbox expunge).
    async fn finalize_deletion(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Remove every stored item the filter accepts.
    async fn purge(&self, filter: &MessageFilter) -> Result<(), TransportError>;

    /// List initial-round units visible to `participant`.
    async fn list_initial_messages(
        &self,
        _participant: &Participant,
    ) -> Result<Vec<ReceivedUnit>, TransportError> {
        Err(TransportError::Unsupported("list_initial_messages"))
    }
}
