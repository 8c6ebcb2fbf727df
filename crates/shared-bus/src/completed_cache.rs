//! # Completed Message Cache
//!
//! Remembers ids of messages already delivered and acknowledged so that a
//! late redelivery of one of their units is dropped instead of starting a
//! new reassembly.
//!
//! - Ids stay in the cache for the configured retention window
//! - Expired ids are garbage-collected lazily on insert

use shared_types::MessageId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Time-bounded set of completed message ids.
#[derive(Debug)]
pub struct CompletedMessageCache {
    /// Map of message id -> completion time.
    completed: HashMap<MessageId, Instant>,

    /// How long an id is remembered.
    retention: Duration,

    /// Last garbage collection.
    last_gc: Instant,

    /// Minimum time between garbage collections.
    gc_interval: Duration,
}

impl CompletedMessageCache {
    /// Default retention: one hour.
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60);

    #[must_use]
    pub fn new() -> Self {
        Self::with_config(Self::DEFAULT_RETENTION, Self::DEFAULT_GC_INTERVAL)
    }

    #[must_use]
    pub fn with_config(retention: Duration, gc_interval: Duration) -> Self {
        Self {
            completed: HashMap::new(),
            retention,
            last_gc: Instant::now(),
            gc_interval,
        }
    }

    /// Record `id` as completed. Returns `false` if it was already known.
    pub fn insert(&mut self, id: MessageId) -> bool {
        let now = Instant::now();
        if now.saturating_duration_since(self.last_gc) >= self.gc_interval {
            self.garbage_collect(now);
        }
        self.completed.insert(id, now).is_none()
    }

    /// Forget `id`, e.g. when delivery did not happen after all.
    pub fn remove(&mut self, id: &MessageId) -> bool {
        self.completed.remove(id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: &MessageId) -> bool {
        self.completed
            .get(id)
            .is_some_and(|at| at.elapsed() < self.retention)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// Drop ids older than the retention window. Returns how many were removed.
    pub fn garbage_collect(&mut self, now: Instant) -> usize {
        let before = self.completed.len();
        let retention = self.retention;
        self.completed
            .retain(|_, at| now.saturating_duration_since(*at) < retention);
        self.last_gc = now;
        before - self.completed.len()
    }
}

impl Default for CompletedMessageCache {
    fn default() -> Self {
        Self::new()
    }
}
