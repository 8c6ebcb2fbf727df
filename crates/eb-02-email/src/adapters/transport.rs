//! # Email Transport
//!
//! Every unit travels as one mail: the subject names scope and receiver, the
//! attachment carries `GZIP(bincode(unit))`. Receipts are mail uids.
//! Deleting only flags a mail; `finalize_deletion` expunges.

use crate::domain::{create_subject, parse_participant, parse_scope, subject, EmailSettings};
use crate::ports::outbound::{MailStore, OutgoingMail, StoredMail};
use async_trait::async_trait;
use shared_bus::{MessageFilter, ReceivedUnit, Receipt, TransportAdapter, TransportError};
use shared_types::{codec, Participant, Scope, WireUnit};
use std::sync::Arc;
use tracing::{debug, info, warn};

const BODY: &str = "This is an automatically generated message from EasySMPC. \
                    Please do not reply or delete it.";

/// [`TransportAdapter`] over a [`MailStore`].
pub struct EmailTransport {
    store: Arc<dyn MailStore>,
    address: String,
    shared_mailbox: bool,
}

impl EmailTransport {
    /// # Errors
    ///
    /// `TransportError::Settings` if the settings are invalid.
    pub fn new(settings: &EmailSettings, store: Arc<dyn MailStore>) -> Result<Self, TransportError> {
        settings
            .validate()
            .map_err(|e| TransportError::Settings(e.to_string()))?;
        Ok(Self {
            store,
            address: settings.email_address.clone(),
            shared_mailbox: settings.shared_mailbox,
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn MailStore> {
        &self.store
    }

    /// Decoded units of all tagged mails whose subject satisfies `accept`.
    async fn collect(
        &self,
        accept: impl Fn(&Scope, &Participant) -> bool + Send,
    ) -> Result<Vec<ReceivedUnit>, TransportError> {
        let mails = self.store.list().await?;
        Ok(mails
            .into_iter()
            .filter(|mail| subject::has_prefix(&mail.subject))
            .filter_map(|mail| {
                let scope = parse_scope(&mail.subject)?;
                let participant = parse_participant(&mail.subject)?;
                accept(&scope, &participant).then_some(mail)
            })
            .filter_map(decode_mail)
            .collect())
    }
}

fn decode_mail(mail: StoredMail) -> Option<ReceivedUnit> {
    let Some(attachment) = mail.attachment else {
        debug!(uid = mail.uid, "Skipping mail without attachment");
        return None;
    };
    match codec::decode_unit_gzip(&attachment) {
        Ok(unit) => Some(ReceivedUnit::new(unit, Receipt::new(mail.uid.to_string()))),
        Err(e) => {
            warn!(uid = mail.uid, error = %e, "Skipping undecodable mail");
            None
        }
    }
}

#[async_trait]
impl TransportAdapter for EmailTransport {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn list_messages(
        &self,
        scope: &Scope,
        participant: &Participant,
    ) -> Result<Vec<ReceivedUnit>, TransportError> {
        self.collect(|s, p| s == scope && p == participant).await
    }

    async fn send_message(
        &self,
        scope: &Scope,
        receiver: &Participant,
        unit: &WireUnit,
    ) -> Result<(), TransportError> {
        let recipient = if self.shared_mailbox {
            self.address.clone()
        } else {
            receiver.identifier().to_string()
        };
        let mail = OutgoingMail {
            sender: self.address.clone(),
            recipient,
            subject: create_subject(scope, receiver),
            body: BODY.to_string(),
            attachment: Some(codec::encode_unit_gzip(unit)?),
        };
        let uid = self.store.append(mail).await?;
        debug!(uid = ?uid, scope = %scope, receiver = %receiver, "Mail sent");
        Ok(())
    }

    async fn delete_message(&self, receipt: &Receipt) -> Result<(), TransportError> {
        let uid: u64 = receipt
            .as_str()
            .parse()
            .map_err(|_| TransportError::InvalidReceipt(receipt.to_string()))?;
        self.store.mark_deleted(uid).await?;
        Ok(())
    }

    async fn finalize_deletion(&self) -> Result<(), TransportError> {
        let removed = self.store.expunge().await?;
        debug!(removed, "Expunged mails");
        Ok(())
    }

    /// Deletes every tagged mail whose subject the filter accepts.
    async fn purge(&self, filter: &MessageFilter) -> Result<(), TransportError> {
        let mut marked = 0usize;
        for mail in self.store.list().await? {
            if subject::has_prefix(&mail.subject) && filter.accepts(&mail.subject) {
                self.store.mark_deleted(mail.uid).await?;
                marked += 1;
            }
        }
        if marked > 0 {
            self.store.expunge().await?;
        }
        info!(purged = marked, "Purged mails");
        Ok(())
    }

    async fn list_initial_messages(
        &self,
        participant: &Participant,
    ) -> Result<Vec<ReceivedUnit>, TransportError> {
        self.collect(|s, p| s.is_initial() && p == participant).await
    }
}
