//! Outbound ports: the mailbox the transport reads from and writes to, and
//! the two protocol clients a server-backed mailbox is built from.
//!
//! [`ImapSmtpMailStore`](crate::ImapSmtpMailStore) implements [`MailStore`]
//! by mapping `list` to [`MailboxClient`] fetches, `append` to
//! [`MailSubmitter`], and `mark_deleted`/`expunge` to the IMAP flag and
//! expunge commands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared_bus::TransportError;
use thiserror::Error;

/// Mailbox errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    #[error("Mailbox I/O failed: {0}")]
    Io(String),

    #[error("Mail {0} not found")]
    NotFound(u64),

    #[error("Mail {uid} is corrupt: {reason}")]
    Corrupt { uid: u64, reason: String },
}

impl From<MailError> for TransportError {
    fn from(e: MailError) -> Self {
        TransportError::Mailbox(e.to_string())
    }
}

/// Mail to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMail {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachment: Option<Vec<u8>>,
}

/// Mail found in the mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMail {
    pub uid: u64,
    pub recipient: String,
    pub subject: String,
    pub attachment: Option<Vec<u8>>,
}

/// Mailbox with IMAP-like delete semantics.
///
/// `mark_deleted` only flags a mail; it stays listed until `expunge`.
#[async_trait]
pub trait MailStore: Send + Sync {
    /// All mails not yet expunged, in arrival order.
    async fn list(&self) -> Result<Vec<StoredMail>, MailError>;

    /// Submit a mail. Returns its uid when the store assigns one on
    /// submission; SMTP submission does not.
    async fn append(&self, mail: OutgoingMail) -> Result<Option<u64>, MailError>;

    /// Flag a mail for removal.
    async fn mark_deleted(&self, uid: u64) -> Result<(), MailError>;

    /// Remove all flagged mails. Returns how many were removed.
    async fn expunge(&self) -> Result<usize, MailError>;
}

/// IMAP side of a server mailbox, working on raw RFC 5322 bytes.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Uid and header block of every mail in the inbox.
    async fn headers(&self) -> Result<Vec<(u64, Vec<u8>)>, MailError>;

    /// Full source of the mails with `uids`. Vanished uids are omitted.
    async fn fetch(&self, uids: &[u64]) -> Result<Vec<(u64, Vec<u8>)>, MailError>;

    /// Set the `\Deleted` flag.
    async fn flag_deleted(&self, uid: u64) -> Result<(), MailError>;

    /// Returns how many mails were removed.
    async fn expunge(&self) -> Result<usize, MailError>;
}

/// SMTP side of a server mailbox.
#[async_trait]
pub trait MailSubmitter: Send + Sync {
    async fn submit(&self, from: &str, to: &str, raw: &[u8]) -> Result<(), MailError>;
}
