//! # Initial Message Manager
//!
//! Read-only view on round-0 messages. A participant browses the initial
//! messages addressed to them and picks one before joining a study, so
//! nothing is deleted until [`InitialMessageManager::delete`] is called for
//! the confirmed message.

use crate::errors::BusError;
use crate::message_manager::{delete_receipts, MessageManager};
use crate::transport::{Receipt, TransportAdapter};
use shared_types::{BusMessage, Participant};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Initial message together with the receipts needed to delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialMessage {
    pub message: BusMessage,
    pub receipts: Vec<Receipt>,
}

/// Periodically lists initial messages without consuming them.
pub struct InitialMessageManager {
    transport: Arc<dyn TransportAdapter>,
    participant: Participant,
    max_message_size: usize,
    check_interval: Duration,
    shutdown: watch::Sender<bool>,
}

impl InitialMessageManager {
    #[must_use]
    pub fn new(
        transport: Arc<dyn TransportAdapter>,
        participant: Participant,
        max_message_size: usize,
        check_interval: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            transport,
            participant,
            max_message_size,
            check_interval,
            shutdown,
        }
    }

    /// List and reassemble all initial messages currently stored.
    ///
    /// Units that fail to merge are logged and skipped.
    ///
    /// # Errors
    ///
    /// `BusError::Transport` if listing fails.
    pub async fn retrieve_messages(&self) -> Result<Vec<InitialMessage>, BusError> {
        let units = self
            .transport
            .list_initial_messages(&self.participant)
            .await?;

        let manager = MessageManager::new(self.max_message_size);
        let mut messages = Vec::new();
        for received in units {
            match manager.merge_message(received, false) {
                Ok(Some(reassembled)) => {
                    let (message, receipts) = reassembled.into_parts();
                    messages.push(InitialMessage { message, receipts });
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Skipping initial message unit"),
            }
        }

        if manager.pending_count() > 0 {
            debug!(
                incomplete = manager.pending_count(),
                "Initial messages with missing fragments"
            );
        }
        Ok(messages)
    }

    /// Delete a confirmed initial message. Returns the number of removed items.
    pub async fn delete(&self, initial: &InitialMessage) -> usize {
        delete_receipts(self.transport.as_ref(), &initial.receipts).await
    }

    /// Retrieve messages every `check_interval` and pass them to `on_update`
    /// until [`InitialMessageManager::stop`] is called.
    ///
    /// # Errors
    ///
    /// The first retrieval error; it ends the loop.
    pub async fn run<F>(&self, mut on_update: F) -> Result<(), BusError>
    where
        F: FnMut(Vec<InitialMessage>) + Send,
    {
        let mut shutdown = self.shutdown.subscribe();
        info!(participant = %self.participant, "Watching initial messages");

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            match self.retrieve_messages().await {
                Ok(messages) => on_update(messages),
                Err(e) => {
                    error!(error = %e, "Unable to retrieve initial messages");
                    return Err(e);
                }
            }

            tokio::select! {
                () = tokio::time::sleep(self.check_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// End a running [`InitialMessageManager::run`] loop.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}
