//! File-backed mailbox.
//!
//! One directory shared by every participant process:
//!
//! ```text
//! {dir}/00000000000000000001.uid       uid claim
//! {dir}/00000000000000000001.mail      bincode(OutgoingMail)
//! {dir}/00000000000000000001.deleted   deletion flag
//! ```
//!
//! A uid is claimed by creating its `.uid` file exclusively. The mail is
//! written to a private temp file first and then hard-linked to its uid name,
//! so two processes never claim the same uid and readers never see a partial
//! mail. Expunge keeps the highest claim, so uids are never reused.

use crate::ports::outbound::{MailError, MailStore, OutgoingMail, StoredMail};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, warn};

const CLAIM_EXTENSION: &str = "uid";
const MAIL_EXTENSION: &str = "mail";
const DELETED_EXTENSION: &str = "deleted";
const TEMP_PREFIX: &str = ".incoming";

/// [`MailStore`] over a directory.
#[derive(Debug)]
pub struct DirectoryMailStore {
    dir: PathBuf,
    temp_counter: AtomicU64,
}

impl DirectoryMailStore {
    /// Open the mailbox at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// `MailError::Io` if the directory cannot be created.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, MailError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(io_error)?;
        debug!(dir = %dir.display(), "Opened mailbox directory");
        Ok(Self {
            dir,
            temp_counter: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn mail_path(&self, uid: u64) -> PathBuf {
        self.dir.join(format!("{uid:020}.{MAIL_EXTENSION}"))
    }

    fn claim_path(&self, uid: u64) -> PathBuf {
        self.dir.join(format!("{uid:020}.{CLAIM_EXTENSION}"))
    }

    fn deleted_path(&self, uid: u64) -> PathBuf {
        self.dir.join(format!("{uid:020}.{DELETED_EXTENSION}"))
    }

    /// Uids of all files with `extension`, ascending.
    async fn uids_with(&self, extension: &str) -> Result<Vec<u64>, MailError> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(io_error)?;
        let mut uids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            if let Some(uid) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                uids.push(uid);
            }
        }
        uids.sort_unstable();
        Ok(uids)
    }

    /// Highest uid ever handed out.
    async fn high_water_mark(&self) -> Result<u64, MailError> {
        let claimed = self.uids_with(CLAIM_EXTENSION).await?.last().copied();
        let stored = self.uids_with(MAIL_EXTENSION).await?.last().copied();
        Ok(claimed.max(stored).unwrap_or(0))
    }

    /// Exclusively create the claim file for `uid`. `Ok(false)` if taken.
    async fn claim(&self, uid: u64) -> Result<bool, MailError> {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.claim_path(uid))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn link_next(&self, temp: &Path) -> Result<u64, MailError> {
        let mut uid = self.high_water_mark().await?;
        loop {
            uid += 1;
            if !self.claim(uid).await? {
                continue;
            }
            match fs::hard_link(temp, self.mail_path(uid)).await {
                Ok(()) => return Ok(uid),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(io_error(e)),
            }
        }
    }

    async fn remove_if_present(path: &Path) -> Result<(), MailError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn read_mail(&self, uid: u64) -> Result<Option<OutgoingMail>, MailError> {
        let bytes = match fs::read(self.mail_path(uid)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };
        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|e| MailError::Corrupt {
                uid,
                reason: e.to_string(),
            })
    }
}

fn io_error(e: std::io::Error) -> MailError {
    MailError::Io(e.to_string())
}

#[async_trait]
impl MailStore for DirectoryMailStore {
    async fn list(&self) -> Result<Vec<StoredMail>, MailError> {
        let mut mails = Vec::new();
        for uid in self.uids_with(MAIL_EXTENSION).await? {
            match self.read_mail(uid).await {
                Ok(Some(mail)) => mails.push(StoredMail {
                    uid,
                    recipient: mail.recipient,
                    subject: mail.subject,
                    attachment: mail.attachment,
                }),
                // Expunged by another process since the directory scan
                Ok(None) => {}
                Err(e @ MailError::Corrupt { .. }) => {
                    warn!(uid, error = %e, "Skipping unreadable mail");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(mails)
    }

    async fn append(&self, mail: OutgoingMail) -> Result<Option<u64>, MailError> {
        let bytes = bincode::serialize(&mail).map_err(|e| MailError::Io(e.to_string()))?;

        let temp = self.dir.join(format!(
            "{TEMP_PREFIX}-{}-{}",
            std::process::id(),
            self.temp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, &bytes).await.map_err(io_error)?;

        let result = self.link_next(&temp).await.map(Some);

        if let Err(e) = fs::remove_file(&temp).await {
            warn!(path = %temp.display(), error = %e, "Unable to remove temp mail file");
        }
        result
    }

    async fn mark_deleted(&self, uid: u64) -> Result<(), MailError> {
        match fs::metadata(self.mail_path(uid)).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(MailError::NotFound(uid)),
            Err(e) => return Err(io_error(e)),
        }
        fs::write(self.deleted_path(uid), b"").await.map_err(io_error)
    }

    async fn expunge(&self) -> Result<usize, MailError> {
        let mut removed = 0;
        let highest_claim = self.uids_with(CLAIM_EXTENSION).await?.last().copied();
        for uid in self.uids_with(DELETED_EXTENSION).await? {
            match fs::remove_file(self.mail_path(uid)).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(e)),
            }
            Self::remove_if_present(&self.deleted_path(uid)).await?;
            if Some(uid) != highest_claim {
                Self::remove_if_present(&self.claim_path(uid)).await?;
            }
        }
        Ok(removed)
    }
}
