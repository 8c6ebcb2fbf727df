//! Mailbox on a real mail server: IMAP for reading and deleting, SMTP for
//! sending.
//!
//! Listing fetches header blocks first and downloads full mails only for
//! subjects carrying the bus prefix.

use crate::adapters::imap::ImapClient;
use crate::adapters::mime;
use crate::adapters::smtp::SmtpSubmitter;
use crate::domain::{subject, MailServerSettings};
use crate::ports::outbound::{
    MailError, MailStore, MailSubmitter, MailboxClient, OutgoingMail, StoredMail,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// [`MailStore`] over an IMAP inbox and an SMTP relay.
pub struct ImapSmtpMailStore {
    mailbox: Arc<dyn MailboxClient>,
    submitter: Arc<dyn MailSubmitter>,
}

impl ImapSmtpMailStore {
    #[must_use]
    pub fn new(mailbox: Arc<dyn MailboxClient>, submitter: Arc<dyn MailSubmitter>) -> Self {
        Self { mailbox, submitter }
    }

    /// Store on the servers in `settings`, logging in as `address` unless
    /// other user names are configured. Connections are opened lazily.
    ///
    /// # Errors
    ///
    /// `MailError::Io` if the settings are invalid or TLS cannot be set up.
    pub fn connect(settings: &MailServerSettings, address: &str) -> Result<Self, MailError> {
        settings
            .validate()
            .map_err(|e| MailError::Io(e.to_string()))?;
        Ok(Self::new(
            Arc::new(ImapClient::new(settings, address)?),
            Arc::new(SmtpSubmitter::new(settings, address)?),
        ))
    }
}

#[async_trait]
impl MailStore for ImapSmtpMailStore {
    async fn list(&self) -> Result<Vec<StoredMail>, MailError> {
        let mut mails = BTreeMap::new();
        let mut tagged = Vec::new();
        for (uid, header) in self.mailbox.headers().await? {
            match mime::parse_headers(uid, &header) {
                Ok((subject, _)) if subject::has_prefix(&subject) => tagged.push(uid),
                Ok((subject, recipient)) => {
                    mails.insert(
                        uid,
                        StoredMail {
                            uid,
                            recipient,
                            subject,
                            attachment: None,
                        },
                    );
                }
                Err(e) => warn!(uid, error = %e, "Skipping mail with unreadable headers"),
            }
        }

        for (uid, raw) in self.mailbox.fetch(&tagged).await? {
            match mime::parse(uid, &raw) {
                Ok(mail) => {
                    mails.insert(uid, mail);
                }
                Err(e) => warn!(uid, error = %e, "Skipping unreadable mail"),
            }
        }
        debug!(listed = mails.len(), downloaded = tagged.len(), "Listed server mailbox");
        Ok(mails.into_values().collect())
    }

    async fn append(&self, mail: OutgoingMail) -> Result<Option<u64>, MailError> {
        let raw = mime::compose(&mail)?;
        self.submitter
            .submit(&mail.sender, &mail.recipient, &raw)
            .await?;
        Ok(None)
    }

    async fn mark_deleted(&self, uid: u64) -> Result<(), MailError> {
        self.mailbox.flag_deleted(uid).await
    }

    async fn expunge(&self) -> Result<usize, MailError> {
        self.mailbox.expunge().await
    }
}
