//! # Bus Core
//!
//! Polling engine shared by all transports.
//!
//! ## Lifecycle
//!
//! ```text
//! Created ──start()──→ Running ──stop()──→ Stopped
//!    │                                        ↑
//!    └──────────────stop()────────────────────┘
//! ```
//!
//! While running, one poll task lists pending units for every registered
//! `(scope, participant)`, reassembles them, hands complete messages to the
//! registered listeners and then deletes the delivered transport items.
//! Sends run on separate tasks, at most `send_concurrency` at a time.

use crate::config::BusConfig;
use crate::errors::BusError;
use crate::listener::MessageListener;
use crate::message_manager::{delete_receipts, MessageManager, Reassembled};
use crate::transport::{MessageFilter, TransportAdapter};
use parking_lot::{Mutex, RwLock};
use shared_types::{BusMessage, Message, MessageId, Participant, Scope};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`Bus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Created,
    Running,
    Stopped,
}

impl BusState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BusState::Created => "created",
            BusState::Running => "running",
            BusState::Stopped => "stopped",
        }
    }
}

type Listeners = Vec<Arc<dyn MessageListener>>;
type Subscriptions = HashMap<Scope, HashMap<Participant, Listeners>>;

struct BusInner {
    config: BusConfig,
    transport: Arc<dyn TransportAdapter>,
    manager: MessageManager,
    subscriptions: RwLock<Subscriptions>,
    send_permits: Semaphore,
}

/// Message bus over one transport.
pub struct Bus {
    inner: Arc<BusInner>,
    state: Mutex<BusState>,
    shutdown: watch::Sender<bool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl Bus {
    /// Create a bus in the `Created` state.
    ///
    /// # Errors
    ///
    /// `BusError::Config` if the configuration is invalid.
    pub fn new(config: BusConfig, transport: Arc<dyn TransportAdapter>) -> Result<Self, BusError> {
        config.validate()?;
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(BusInner {
                manager: MessageManager::from_config(&config),
                send_permits: Semaphore::new(config.send_concurrency),
                subscriptions: RwLock::new(HashMap::new()),
                transport,
                config,
            }),
            state: Mutex::new(BusState::Created),
            shutdown,
            poll_task: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn state(&self) -> BusState {
        *self.state.lock()
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn TransportAdapter> {
        &self.inner.transport
    }

    /// Spawn the poll task on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `BusError::InvalidState` unless the bus is `Created`
    /// - `BusError::NoRuntime` outside a Tokio runtime
    pub fn start(&self) -> Result<(), BusError> {
        let mut state = self.state.lock();
        if *state != BusState::Created {
            return Err(BusError::InvalidState {
                expected: BusState::Created.as_str(),
                actual: state.as_str(),
            });
        }

        let runtime = Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        let task = runtime.spawn(poll_loop(
            Arc::clone(&self.inner),
            self.shutdown.subscribe(),
        ));
        *self.poll_task.lock() = Some(task);
        *state = BusState::Running;

        info!(
            transport = self.inner.transport.name(),
            poll_interval_ms = self.inner.config.poll_interval_ms,
            "Bus started"
        );
        Ok(())
    }

    /// Register `listener` for messages to `participant` within `scope`.
    ///
    /// Takes effect from the next poll cycle.
    pub fn receive(&self, scope: Scope, participant: Participant, listener: Arc<dyn MessageListener>) {
        debug!(scope = %scope, participant = %participant, "Registering listener");
        self.inner
            .subscriptions
            .write()
            .entry(scope)
            .or_default()
            .entry(participant)
            .or_default()
            .push(listener);
    }

    /// Send `message` to `receiver` within `scope` in the background.
    ///
    /// The returned handle resolves once every unit of the message has been
    /// handed to the transport, or with the first failure. Callers impose
    /// their own timeout on it.
    ///
    /// # Errors
    ///
    /// - `BusError::Stopped` once the bus has been stopped
    /// - `BusError::NoRuntime` outside a Tokio runtime
    pub fn send(
        &self,
        message: Message,
        scope: Scope,
        receiver: Participant,
    ) -> Result<SendHandle, BusError> {
        if *self.state.lock() == BusState::Stopped {
            return Err(BusError::Stopped);
        }
        let runtime = Handle::try_current().map_err(|_| BusError::NoRuntime)?;

        let message_id = message.id();
        let inner = Arc::clone(&self.inner);
        let task = runtime.spawn(async move {
            inner
                .send_units(BusMessage::new(message, scope, receiver))
                .await
        });

        Ok(SendHandle { message_id, task })
    }

    /// Remove stored messages accepted by `filter`.
    ///
    /// # Errors
    ///
    /// `BusError::Transport` if the transport fails or does not support purging.
    pub async fn purge(&self, filter: &MessageFilter) -> Result<(), BusError> {
        info!(transport = self.inner.transport.name(), "Purging messages");
        self.inner.transport.purge(filter).await?;
        Ok(())
    }

    /// Signal the poll task to exit and reject further sends.
    ///
    /// Does not wait; safe to call from a listener.
    pub fn request_stop(&self) {
        *self.state.lock() = BusState::Stopped;
        self.shutdown.send_replace(true);
    }

    /// Stop the bus and wait up to `stop_timeout` for the poll task.
    ///
    /// Sends already submitted run to completion. A poll task that does not
    /// finish in time is aborted.
    pub async fn stop(&self) {
        self.request_stop();

        let task = self.poll_task.lock().take();
        let Some(mut task) = task else {
            return;
        };

        match tokio::time::timeout(self.inner.config.stop_timeout(), &mut task).await {
            Ok(Ok(())) => info!(transport = self.inner.transport.name(), "Bus stopped"),
            Ok(Err(e)) => warn!(error = %e, "Poll task ended abnormally"),
            Err(_) => {
                warn!(
                    timeout_ms = self.inner.config.stop_timeout_ms,
                    "Poll task did not stop in time, aborting"
                );
                task.abort();
            }
        }
    }

    /// Whether the poll task exists and has not terminated.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.poll_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Completion handle of [`Bus::send`].
pub struct SendHandle {
    message_id: MessageId,
    task: JoinHandle<Result<(), BusError>>,
}

impl SendHandle {
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        self.message_id
    }
}

impl Future for SendHandle {
    type Output = Result<(), BusError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.task)
            .poll(cx)
            .map(|joined| joined.unwrap_or_else(|e| Err(BusError::TaskFailed(e.to_string()))))
    }
}

async fn poll_loop(inner: Arc<BusInner>, mut shutdown: watch::Receiver<bool>) {
    debug!(transport = inner.transport.name(), "Poll loop running");

    loop {
        if *shutdown.borrow() {
            break;
        }

        inner.poll_cycle(&shutdown).await;

        tokio::select! {
            () = tokio::time::sleep(inner.config.poll_interval()) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!(transport = inner.transport.name(), "Poll loop exited");
}

impl BusInner {
    async fn send_units(&self, bus_message: BusMessage) -> Result<(), BusError> {
        let _permit = self
            .send_permits
            .acquire()
            .await
            .map_err(|_| BusError::Stopped)?;

        let units = self.manager.split_message(&bus_message)?;
        let message_id = bus_message.message.id();

        for unit in &units {
            if let Err(e) = self
                .transport
                .send_message(&bus_message.scope, &bus_message.receiver, unit)
                .await
            {
                error!(
                    transport = self.transport.name(),
                    message_id = %message_id,
                    scope = %bus_message.scope,
                    error = %e,
                    "Unable to send message"
                );
                return Err(e.into());
            }
        }

        debug!(
            message_id = %message_id,
            scope = %bus_message.scope,
            units = units.len(),
            "Message sent"
        );
        Ok(())
    }

    async fn poll_cycle(&self, shutdown: &watch::Receiver<bool>) {
        let targets: Vec<(Scope, Participant)> = self
            .subscriptions
            .read()
            .iter()
            .flat_map(|(scope, participants)| {
                participants
                    .iter()
                    .filter(|(_, listeners)| !listeners.is_empty())
                    .map(move |(participant, _)| (scope.clone(), participant.clone()))
            })
            .collect();

        for (scope, participant) in targets {
            if *shutdown.borrow() {
                return;
            }

            let units = match self.transport.list_messages(&scope, &participant).await {
                Ok(units) => units,
                Err(e) => {
                    warn!(
                        transport = self.transport.name(),
                        scope = %scope,
                        participant = %participant,
                        error = %e,
                        "Unable to receive messages"
                    );
                    self.notify_error(&e.into());
                    continue;
                }
            };

            for received in units {
                if *shutdown.borrow() {
                    return;
                }
                match self.manager.merge_message(received, true) {
                    Ok(Some(reassembled)) => self.deliver(&scope, &participant, reassembled).await,
                    Ok(None) => {}
                    Err(e) => {
                        warn!(scope = %scope, error = %e, "Unable to merge message");
                        self.notify_error(&e);
                    }
                }
            }
        }

        let stale = self.manager.take_stale_receipts();
        if !stale.is_empty() {
            debug!(count = stale.len(), "Deleting redelivered and rejected units");
            delete_receipts(self.transport.as_ref(), &stale).await;
        }
        self.manager.evict_expired();
    }

    async fn deliver(&self, scope: &Scope, participant: &Participant, reassembled: Reassembled) {
        let message_id = reassembled.message().message.id();
        let listeners: Listeners = self
            .subscriptions
            .read()
            .get(scope)
            .and_then(|participants| participants.get(participant))
            .cloned()
            .unwrap_or_default();

        if listeners.is_empty() {
            debug!(message_id = %message_id, scope = %scope, "No listener, keeping message");
            self.manager.release(&message_id);
            return;
        }

        for listener in &listeners {
            listener.receive(reassembled.message().message.clone());
        }
        reassembled.acknowledge(self.transport.as_ref()).await;

        debug!(
            message_id = %message_id,
            scope = %scope,
            listeners = listeners.len(),
            "Message delivered"
        );
    }

    fn notify_error(&self, error: &BusError) {
        let listeners: Listeners = self
            .subscriptions
            .read()
            .values()
            .flat_map(|participants| participants.values().flatten().cloned())
            .collect();
        for listener in listeners {
            listener.receive_error(error);
        }
    }
}
