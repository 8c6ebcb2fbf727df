//! # Local Transport
//!
//! In-process exchange for buses living in the same process (a single
//! machine running every participant, tests). Units are stored in their
//! Base64 wire form so the codec is exercised exactly as over HTTP.

use crate::errors::TransportError;
use crate::transport::{MessageFilter, ReceivedUnit, Receipt, TransportAdapter};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{codec, Participant, Scope, WireUnit};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct StoredItem {
    scope: Scope,
    receiver: String,
    content: String,
}

/// Shared store of pending items, ordered by arrival.
#[derive(Debug, Default)]
pub struct LocalExchange {
    items: Mutex<BTreeMap<u64, StoredItem>>,
    next_id: AtomicU64,
}

impl LocalExchange {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw content for `receiver_id` within `scope`. Returns the item id.
    pub fn deposit(&self, scope: &Scope, receiver_id: &str, content: String) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.items.lock().insert(
            id,
            StoredItem {
                scope: scope.clone(),
                receiver: receiver_id.to_string(),
                content,
            },
        );
        id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    fn select(&self, accept: impl Fn(&StoredItem) -> bool) -> Vec<(u64, String)> {
        self.items
            .lock()
            .iter()
            .filter(|(_, item)| accept(item))
            .map(|(id, item)| (*id, item.content.clone()))
            .collect()
    }
}

/// [`TransportAdapter`] over a [`LocalExchange`].
#[derive(Debug, Clone)]
pub struct LocalTransport {
    exchange: Arc<LocalExchange>,
}

impl LocalTransport {
    #[must_use]
    pub fn new(exchange: Arc<LocalExchange>) -> Self {
        Self { exchange }
    }

    #[must_use]
    pub fn exchange(&self) -> &Arc<LocalExchange> {
        &self.exchange
    }

    fn decode_all(items: Vec<(u64, String)>) -> Vec<ReceivedUnit> {
        items
            .into_iter()
            .filter_map(|(id, content)| match codec::decode_unit(&content) {
                Ok(unit) => Some(ReceivedUnit::new(unit, Receipt::new(id.to_string()))),
                Err(e) => {
                    warn!(transport = "local", item = id, error = %e, "Skipping undecodable item");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl TransportAdapter for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn list_messages(
        &self,
        scope: &Scope,
        participant: &Participant,
    ) -> Result<Vec<ReceivedUnit>, TransportError> {
        let items = self
            .exchange
            .select(|item| &item.scope == scope && item.receiver == participant.identifier());
        Ok(Self::decode_all(items))
    }

    async fn send_message(
        &self,
        scope: &Scope,
        receiver: &Participant,
        unit: &WireUnit,
    ) -> Result<(), TransportError> {
        let content = codec::encode_unit(unit)?;
        let id = self.exchange.deposit(scope, receiver.identifier(), content);
        debug!(transport = "local", item = id, scope = %scope, "Stored unit");
        Ok(())
    }

    async fn delete_message(&self, receipt: &Receipt) -> Result<(), TransportError> {
        let id: u64 = receipt
            .as_str()
            .parse()
            .map_err(|_| TransportError::InvalidReceipt(receipt.to_string()))?;
        self.exchange.items.lock().remove(&id);
        Ok(())
    }

    async fn purge(&self, filter: &MessageFilter) -> Result<(), TransportError> {
        self.exchange
            .items
            .lock()
            .retain(|_, item| !filter.accepts(item.scope.name()));
        Ok(())
    }

    async fn list_initial_messages(
        &self,
        participant: &Participant,
    ) -> Result<Vec<ReceivedUnit>, TransportError> {
        let items = self
            .exchange
            .select(|item| item.scope.is_initial() && item.receiver == participant.identifier());
        Ok(Self::decode_all(items))
    }
}
