//! # Message Manager
//!
//! Converts between one logical message and the size-bounded units a
//! transport carries.
//!
//! ## Reassembly
//!
//! ```text
//! fragment(id, 1/3) ──┐
//! fragment(id, 0/3) ──┼──→ partial[id] = [0, 1, 2] ──→ Message(id)
//! fragment(id, 2/3) ──┘        (removed on completion)
//! ```
//!
//! - A duplicate fragment overwrites its slot
//! - A fragment whose `total` disagrees with the stored entry is rejected
//! - Slots are stored sparsely; a message may announce at most
//!   [`MAX_DECODED_SIZE`] fragments and carry at most as many bytes
//! - Units of an already delivered message are dropped
//! - Receipts of rejected units are queued for deletion like redeliveries
//! - Partial entries older than the configured TTL are evicted

use crate::completed_cache::CompletedMessageCache;
use crate::config::BusConfig;
use crate::errors::BusError;
use crate::transport::{ReceivedUnit, Receipt, TransportAdapter};
use parking_lot::Mutex;
use shared_types::codec::{self, MAX_DECODED_SIZE};
use shared_types::{BusMessage, BusMessageFragment, CodecError, Message, MessageId, WireUnit};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// Minimum time between opportunistic evictions during merges.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// A completely received message plus the receipts of all its units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassembled {
    message: BusMessage,
    receipts: Vec<Receipt>,
    expunge: bool,
}

impl Reassembled {
    #[must_use]
    pub fn message(&self) -> &BusMessage {
        &self.message
    }

    #[must_use]
    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    /// Whether the transport items should be deleted on acknowledgement.
    #[must_use]
    pub fn expunge(&self) -> bool {
        self.expunge
    }

    #[must_use]
    pub fn into_parts(self) -> (BusMessage, Vec<Receipt>) {
        (self.message, self.receipts)
    }

    /// Delete the underlying transport items if this message was merged
    /// with `expunge`. Returns the number of items deleted.
    pub async fn acknowledge(&self, transport: &dyn TransportAdapter) -> usize {
        if !self.expunge {
            return 0;
        }
        delete_receipts(transport, &self.receipts).await
    }
}

/// Best-effort deletion of `receipts` followed by one finalization.
///
/// Failures are logged; returns the number of successful deletions.
pub async fn delete_receipts(transport: &dyn TransportAdapter, receipts: &[Receipt]) -> usize {
    if receipts.is_empty() {
        return 0;
    }

    let mut deleted = 0;
    for receipt in receipts {
        match transport.delete_message(receipt).await {
            Ok(()) => deleted += 1,
            Err(e) => error!(
                transport = transport.name(),
                receipt = %receipt,
                error = %e,
                "Unable to delete message fragment"
            ),
        }
    }

    if let Err(e) = transport.finalize_deletion().await {
        error!(transport = transport.name(), error = %e, "Unable to finalize deletion");
    }
    deleted
}

struct PartialMessage {
    total: u32,
    chunks: BTreeMap<u32, Vec<u8>>,
    bytes: usize,
    receipts: Vec<Receipt>,
    first_seen: Instant,
}

impl PartialMessage {
    fn new(total: u32) -> Self {
        Self {
            total,
            chunks: BTreeMap::new(),
            bytes: 0,
            receipts: Vec::new(),
            first_seen: Instant::now(),
        }
    }

    fn received(&self) -> usize {
        self.chunks.len()
    }

    fn is_complete(&self) -> bool {
        self.chunks.len() == self.total as usize
    }
}

struct ReassemblyState {
    partial: HashMap<MessageId, PartialMessage>,
    completed: CompletedMessageCache,
    stale: Vec<Receipt>,
    last_eviction: Instant,
}

/// Splits outgoing messages and reassembles incoming fragments.
///
/// Safe for concurrent use; all state sits behind one mutex.
pub struct MessageManager {
    max_message_size: usize,
    partial_ttl: Duration,
    state: Mutex<ReassemblyState>,
}

impl MessageManager {
    /// Create a manager with default TTLs.
    #[must_use]
    pub fn new(max_message_size: usize) -> Self {
        let defaults = BusConfig::default();
        Self::with_ttl(
            max_message_size,
            defaults.partial_ttl(),
            defaults.completed_ttl(),
        )
    }

    /// Create a manager from bus configuration.
    #[must_use]
    pub fn from_config(config: &BusConfig) -> Self {
        Self::with_ttl(
            config.max_message_size,
            config.partial_ttl(),
            config.completed_ttl(),
        )
    }

    #[must_use]
    pub fn with_ttl(max_message_size: usize, partial_ttl: Duration, completed_ttl: Duration) -> Self {
        Self {
            max_message_size: max_message_size.max(1),
            partial_ttl,
            state: Mutex::new(ReassemblyState {
                partial: HashMap::new(),
                completed: CompletedMessageCache::with_config(completed_ttl, EVICTION_INTERVAL),
                stale: Vec::new(),
                last_eviction: Instant::now(),
            }),
        }
    }

    #[must_use]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Split a message into wire units no larger than the size limit.
    ///
    /// A message whose serialized form fits is returned unchanged as a
    /// single unit.
    ///
    /// # Errors
    ///
    /// - `BusError::Encoding` if the message cannot be serialized
    /// - `BusError::TooManyFragments` if the fragment count overflows
    pub fn split_message(&self, bus_message: &BusMessage) -> Result<Vec<WireUnit>, BusError> {
        let bytes = codec::to_bytes(&bus_message.message)?;
        if bytes.len() <= self.max_message_size {
            return Ok(vec![WireUnit::Message(bus_message.clone())]);
        }

        let size = bytes.len();
        let total = u32::try_from(size.div_ceil(self.max_message_size))
            .map_err(|_| BusError::TooManyFragments { size })?;
        let id = bus_message.message.id();

        debug!(message_id = %id, size, fragments = total, "Splitting message");

        (0..total)
            .zip(bytes.chunks(self.max_message_size))
            .map(|(index, chunk)| {
                BusMessageFragment::new(
                    bus_message.scope.clone(),
                    bus_message.receiver.clone(),
                    id,
                    index,
                    total,
                    chunk.to_vec(),
                )
                .map(WireUnit::Fragment)
                .map_err(|e| BusError::Encoding(CodecError::Invalid(e)))
            })
            .collect()
    }

    /// Feed one received unit into reassembly.
    ///
    /// Returns `Ok(None)` while a message is still incomplete or when the
    /// unit belongs to a message that was already delivered. With `expunge`
    /// the completed id is remembered so redeliveries are dropped, and the
    /// receipts of dropped redeliveries are queued for deletion
    /// (see [`MessageManager::take_stale_receipts`]).
    ///
    /// # Errors
    ///
    /// - `BusError::InconsistentFragment` if the fragment's total disagrees
    ///   with fragments already stored for the same message
    /// - `BusError::FragmentLimit` if the fragments announce or carry more
    ///   than [`MAX_DECODED_SIZE`]
    /// - `BusError::Encoding` if the reassembled bytes do not decode
    ///
    /// With `expunge`, the receipts of rejected units are queued for
    /// deletion so the same units are not reported again on the next poll.
    pub fn merge_message(
        &self,
        received: ReceivedUnit,
        expunge: bool,
    ) -> Result<Option<Reassembled>, BusError> {
        let ReceivedUnit { unit, receipt } = received;
        let id = unit.message_id();
        let mut state = self.state.lock();

        if state.last_eviction.elapsed() >= EVICTION_INTERVAL {
            state.evict(self.partial_ttl);
        }

        if state.completed.contains(&id) {
            debug!(message_id = %id, "Dropping unit of already delivered message");
            if expunge {
                state.stale.push(receipt);
            }
            return Ok(None);
        }

        match unit {
            WireUnit::Message(message) => {
                if expunge {
                    state.completed.insert(id);
                }
                Ok(Some(Reassembled {
                    message,
                    receipts: vec![receipt],
                    expunge,
                }))
            }
            WireUnit::Fragment(fragment) => state.merge_fragment(fragment, receipt, expunge),
        }
    }

    /// Forget that `id` was completed so a redelivery is merged again.
    pub fn release(&self, id: &MessageId) {
        self.state.lock().completed.remove(id);
    }

    /// Receipts of dropped redeliveries and rejected units awaiting deletion.
    pub fn take_stale_receipts(&self) -> Vec<Receipt> {
        std::mem::take(&mut self.state.lock().stale)
    }

    /// Evict partial reassemblies older than the partial TTL and expired
    /// completed ids. Returns the number of evicted partial messages.
    pub fn evict_expired(&self) -> usize {
        self.state.lock().evict(self.partial_ttl)
    }

    /// Number of messages with fragments still missing.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().partial.len()
    }
}

impl ReassemblyState {
    fn merge_fragment(
        &mut self,
        fragment: BusMessageFragment,
        receipt: Receipt,
        expunge: bool,
    ) -> Result<Option<Reassembled>, BusError> {
        let id = fragment.parent_id();
        let total = fragment.total();
        let index = fragment.index();

        if total as usize > MAX_DECODED_SIZE {
            warn!(message_id = %id, total, "Rejecting fragment with oversized total");
            self.discard(expunge, vec![receipt]);
            return Err(BusError::FragmentLimit {
                message_id: id,
                limit: MAX_DECODED_SIZE,
            });
        }

        let entry = self
            .partial
            .entry(id)
            .or_insert_with(|| PartialMessage::new(total));

        if entry.total != total {
            let expected = entry.total;
            self.discard(expunge, vec![receipt]);
            return Err(BusError::InconsistentFragment {
                message_id: id,
                expected,
                received: total,
            });
        }

        let scope = fragment.scope().clone();
        let receiver = fragment.receiver().clone();
        let chunk = fragment.into_chunk();
        let replaced = entry.chunks.get(&index).map_or(0, Vec::len);
        entry.bytes = entry.bytes - replaced + chunk.len();
        entry.chunks.insert(index, chunk);
        entry.receipts.push(receipt);

        trace!(message_id = %id, index, received = entry.received(), total, "Stored fragment");

        if entry.bytes > MAX_DECODED_SIZE {
            warn!(message_id = %id, bytes = entry.bytes, "Dropping oversized partial message");
            if let Some(entry) = self.partial.remove(&id) {
                self.discard(expunge, entry.receipts);
            }
            return Err(BusError::FragmentLimit {
                message_id: id,
                limit: MAX_DECODED_SIZE,
            });
        }

        if !entry.is_complete() {
            return Ok(None);
        }
        let Some(entry) = self.partial.remove(&id) else {
            return Ok(None);
        };

        let bytes: Vec<u8> = entry.chunks.into_values().flatten().collect();
        let message = match decode_reassembled(&bytes) {
            Ok(message) => message,
            Err(e) => {
                self.discard(expunge, entry.receipts);
                return Err(e.into());
            }
        };
        if message.id() != id {
            warn!(parent_id = %id, message_id = %message.id(), "Fragment parent id differs from message id");
        }

        if expunge {
            self.completed.insert(id);
        }

        debug!(message_id = %id, fragments = total, "Message reassembled");

        Ok(Some(Reassembled {
            message: BusMessage::new(message, scope, receiver),
            receipts: entry.receipts,
            expunge,
        }))
    }

    fn discard(&mut self, expunge: bool, receipts: Vec<Receipt>) {
        if expunge {
            self.stale.extend(receipts);
        }
    }

    fn evict(&mut self, partial_ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.partial.len();
        self.partial.retain(|id, entry| {
            let keep = now.saturating_duration_since(entry.first_seen) < partial_ttl;
            if !keep {
                warn!(
                    message_id = %id,
                    received = entry.received(),
                    total = entry.total,
                    "Evicting incomplete message"
                );
            }
            keep
        });
        self.completed.garbage_collect(now);
        self.last_eviction = now;
        before - self.partial.len()
    }
}

fn decode_reassembled(bytes: &[u8]) -> Result<Message, CodecError> {
    let message: Message = codec::from_bytes(bytes)?;
    if let Some(sender) = message.sender() {
        sender.validate()?;
    }
    Ok(message)
}
