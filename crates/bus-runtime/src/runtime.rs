//! # Bus Runtime
//!
//! Wires the configured transport into a [`Bus`] for one participant and
//! implements the `easybus` commands on top of it.

use crate::config::{RuntimeConfig, TransportKind};
use anyhow::{Context, Result};
use eb_01_easybackend::EasyBackendTransport;
use eb_02_email::{
    DirectoryMailStore, EmailSettings, EmailTransport, ImapSmtpMailStore, InMemoryMailStore,
    MailStore,
};
use shared_bus::{
    Bus, BusError, InitialMessage, InitialMessageManager, LocalExchange, LocalTransport,
    MessageFilter, MessageListener, TransportAdapter,
};
use shared_types::{Message, Participant, Scope};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Build the transport selected by `config`.
///
/// # Errors
///
/// Fails if the selected section is missing or its settings are invalid.
pub async fn build_transport(config: &RuntimeConfig) -> Result<Arc<dyn TransportAdapter>> {
    match config.transport {
        TransportKind::Easybackend => {
            let settings = config
                .easybackend
                .as_ref()
                .context("Missing [easybackend] section")?;
            let transport = EasyBackendTransport::new(settings)
                .context("Unable to configure easybackend transport")?;
            Ok(Arc::new(transport))
        }
        TransportKind::Email => {
            let settings = config.email.as_ref().context("Missing [email] section")?;
            let store = mail_store(settings).await?;
            let transport =
                EmailTransport::new(settings, store).context("Unable to configure email transport")?;
            Ok(Arc::new(transport))
        }
        TransportKind::Local => Ok(Arc::new(LocalTransport::new(Arc::new(LocalExchange::new())))),
    }
}

/// Mail server if configured, else the mailbox directory, else a
/// process-local mailbox.
async fn mail_store(settings: &EmailSettings) -> Result<Arc<dyn MailStore>> {
    if let Some(server) = &settings.server {
        info!(imap = %server.imap_server, smtp = %server.smtp_server, "Using mail server");
        let store = ImapSmtpMailStore::connect(server, &settings.email_address)
            .context("Unable to configure mail server")?;
        return Ok(Arc::new(store));
    }
    match &settings.mailbox_dir {
        Some(dir) => Ok(Arc::new(
            DirectoryMailStore::open(dir.clone())
                .await
                .with_context(|| format!("Unable to open mailbox {}", dir.display()))?,
        )),
        None => {
            warn!("No mail server or mailbox_dir configured, using a process-local mailbox");
            Ok(Arc::new(InMemoryMailStore::new()))
        }
    }
}

/// Forwards received messages to the command loop.
struct ChannelListener {
    scope: Scope,
    tx: mpsc::UnboundedSender<(Scope, Message)>,
}

impl MessageListener for ChannelListener {
    fn receive(&self, message: Message) {
        if self.tx.send((self.scope.clone(), message)).is_err() {
            warn!(scope = %self.scope, "Listener channel closed, dropping message");
        }
    }

    fn receive_error(&self, error: &BusError) {
        error!(scope = %self.scope, error = %error, "Receiving failed");
    }
}

/// A bus bound to the configured participant.
pub struct BusRuntime {
    participant: Participant,
    bus: Bus,
    transport: Arc<dyn TransportAdapter>,
    max_message_size: usize,
}

impl BusRuntime {
    /// Connect the configured transport. The bus is not started yet.
    ///
    /// # Errors
    ///
    /// Fails on invalid participant, transport or bus settings.
    pub async fn connect(config: &RuntimeConfig) -> Result<Self> {
        let transport = build_transport(config).await?;
        Self::with_transport(config, transport)
    }

    /// Use an already built transport.
    ///
    /// # Errors
    ///
    /// Fails on invalid participant or bus settings.
    pub fn with_transport(
        config: &RuntimeConfig,
        transport: Arc<dyn TransportAdapter>,
    ) -> Result<Self> {
        let participant = config
            .participant
            .to_participant()
            .context("Invalid participant")?;
        let bus_config = config.bus_config();
        let max_message_size = bus_config.max_message_size;
        let bus = Bus::new(bus_config, Arc::clone(&transport)).context("Invalid bus settings")?;
        info!(
            participant = %participant,
            transport = transport.name(),
            "Bus runtime ready"
        );
        Ok(Self {
            participant,
            bus,
            transport,
            max_message_size,
        })
    }

    #[must_use]
    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Receive on `scopes` until `shutdown` resolves or `count` messages arrived.
    ///
    /// Payloads are written to `output` as `{message id}.bin` when set.
    /// Returns the number of messages received.
    ///
    /// # Errors
    ///
    /// Fails if the bus cannot start or a payload cannot be written.
    pub async fn listen(
        &self,
        scopes: &[String],
        output: Option<&Path>,
        count: Option<usize>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<usize> {
        if let Some(dir) = output {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Unable to create {}", dir.display()))?;
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        for scope in scopes {
            let scope = Scope::new(scope.as_str());
            let listener = ChannelListener {
                scope: scope.clone(),
                tx: tx.clone(),
            };
            self.bus
                .receive(scope, self.participant.clone(), Arc::new(listener));
        }
        drop(tx);

        self.bus.start().context("Unable to start bus")?;
        info!(participant = %self.participant, scopes = scopes.len(), "Listening");

        tokio::pin!(shutdown);
        let mut received = 0usize;
        let result = loop {
            if count.is_some_and(|limit| received >= limit) {
                break Ok(());
            }
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }
                next = rx.recv() => {
                    let Some((scope, message)) = next else {
                        break Ok(());
                    };
                    received += 1;
                    info!(
                        scope = %scope,
                        message_id = %message.id(),
                        sender = ?message.sender().map(ToString::to_string),
                        bytes = message.payload().len(),
                        "Message received"
                    );
                    if let Some(dir) = output {
                        if let Err(e) = write_payload(dir, &message).await {
                            break Err(e);
                        }
                    }
                }
            }
        };

        self.bus.stop().await;
        result.map(|()| received)
    }

    /// Send the contents of `file` to `receiver` within `scope` and wait for it.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or the transport rejects the message.
    pub async fn send_file(&self, scope: &str, receiver: Participant, file: &Path) -> Result<()> {
        let payload = tokio::fs::read(file)
            .await
            .with_context(|| format!("Unable to read {}", file.display()))?;
        self.send_payload(scope, receiver, payload).await
    }

    /// Send `payload` to `receiver` within `scope` and wait for it.
    ///
    /// # Errors
    ///
    /// Fails if the transport rejects the message.
    pub async fn send_payload(
        &self,
        scope: &str,
        receiver: Participant,
        payload: Vec<u8>,
    ) -> Result<()> {
        let message = Message::new(payload).with_sender(self.participant.clone());
        let handle = self
            .bus
            .send(message, Scope::new(scope), receiver.clone())?;
        let message_id = handle.message_id();
        handle
            .await
            .with_context(|| format!("Sending message {message_id} failed"))?;
        info!(message_id = %message_id, scope, receiver = %receiver, "Message sent");
        Ok(())
    }

    /// Delete every stored message of this account.
    ///
    /// # Errors
    ///
    /// Fails if the transport rejects the purge.
    pub async fn purge(&self) -> Result<()> {
        self.bus
            .purge(&MessageFilter::all())
            .await
            .context("Purge failed")
    }

    /// Initial messages currently addressed to this participant.
    ///
    /// # Errors
    ///
    /// Fails if listing fails or the transport has no initial messages.
    pub async fn initial_messages(&self) -> Result<Vec<InitialMessage>> {
        let manager = InitialMessageManager::new(
            Arc::clone(&self.transport),
            self.participant.clone(),
            self.max_message_size,
            self.bus.config().poll_interval(),
        );
        let messages = manager
            .retrieve_messages()
            .await
            .context("Unable to list initial messages")?;
        for initial in &messages {
            info!(
                scope = %initial.message.scope,
                message_id = %initial.message.message.id(),
                sender = ?initial.message.message.sender().map(ToString::to_string),
                bytes = initial.message.message.payload().len(),
                "Initial message"
            );
        }
        Ok(messages)
    }

    /// Stop the bus.
    pub async fn shutdown(&self) {
        self.bus.stop().await;
    }
}

async fn write_payload(dir: &Path, message: &Message) -> Result<PathBuf> {
    let path = dir.join(format!("{}.bin", message.id()));
    tokio::fs::write(&path, message.payload())
        .await
        .with_context(|| format!("Unable to write {}", path.display()))?;
    Ok(path)
}
