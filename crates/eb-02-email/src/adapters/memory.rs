//! In-memory mailbox shared by every participant holding the same `Arc`.

use crate::ports::outbound::{MailError, MailStore, OutgoingMail, StoredMail};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;

struct Entry {
    mail: OutgoingMail,
    deleted: bool,
}

#[derive(Default)]
struct Mailbox {
    entries: BTreeMap<u64, Entry>,
    next_uid: u64,
}

/// [`MailStore`] kept in process memory.
#[derive(Default)]
pub struct InMemoryMailStore {
    mailbox: Mutex<Mailbox>,
}

impl InMemoryMailStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mails not yet expunged, flagged ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mailbox.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the mail is flagged for removal.
    #[must_use]
    pub fn is_marked_deleted(&self, uid: u64) -> bool {
        self.mailbox
            .lock()
            .entries
            .get(&uid)
            .is_some_and(|entry| entry.deleted)
    }
}

#[async_trait]
impl MailStore for InMemoryMailStore {
    async fn list(&self) -> Result<Vec<StoredMail>, MailError> {
        Ok(self
            .mailbox
            .lock()
            .entries
            .iter()
            .map(|(uid, entry)| StoredMail {
                uid: *uid,
                recipient: entry.mail.recipient.clone(),
                subject: entry.mail.subject.clone(),
                attachment: entry.mail.attachment.clone(),
            })
            .collect())
    }

    async fn append(&self, mail: OutgoingMail) -> Result<Option<u64>, MailError> {
        let mut mailbox = self.mailbox.lock();
        mailbox.next_uid += 1;
        let uid = mailbox.next_uid;
        mailbox.entries.insert(
            uid,
            Entry {
                mail,
                deleted: false,
            },
        );
        Ok(Some(uid))
    }

    async fn mark_deleted(&self, uid: u64) -> Result<(), MailError> {
        match self.mailbox.lock().entries.get_mut(&uid) {
            Some(entry) => {
                entry.deleted = true;
                Ok(())
            }
            None => Err(MailError::NotFound(uid)),
        }
    }

    async fn expunge(&self) -> Result<usize, MailError> {
        let mut mailbox = self.mailbox.lock();
        let before = mailbox.entries.len();
        mailbox.entries.retain(|_, entry| !entry.deleted);
        Ok(before - mailbox.entries.len())
    }
}
