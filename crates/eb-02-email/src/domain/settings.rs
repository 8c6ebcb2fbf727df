//! Mailbox settings.

use serde::{Deserialize, Serialize};
use shared_types::is_email_valid;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default pause between mailbox checks.
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 30_000;

/// Default largest attachment sent in one mail.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default timeout for one IMAP or SMTP exchange.
pub const DEFAULT_SERVER_TIMEOUT_MS: u64 = 30_000;

pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_SMTP_PORT: u16 = 465;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmailSettingsError {
    #[error("Invalid e-mail address: {0}")]
    InvalidAddress(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("STARTTLS is only supported for SMTP")]
    ImapStartTls,
}

/// Connection security of a mail server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encryption {
    /// TLS from the first byte
    #[default]
    Tls,
    /// Plain connection upgraded with STARTTLS
    StartTls,
    /// No encryption
    Plain,
}

/// HTTP proxy reached with `CONNECT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
}

/// IMAP and SMTP servers of a real mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailServerSettings {
    pub imap_server: String,
    pub imap_port: u16,
    pub imap_encryption: Encryption,
    /// Defaults to the mailbox address
    pub imap_user: Option<String>,
    pub imap_password: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_encryption: Encryption,
    /// Defaults to the mailbox address
    pub smtp_user: Option<String>,
    /// Defaults to the IMAP password
    pub smtp_password: Option<String>,
    /// Proxy for the IMAP connection
    pub proxy: Option<ProxySettings>,
    pub timeout_ms: u64,
}

impl Default for MailServerSettings {
    fn default() -> Self {
        Self {
            imap_server: String::new(),
            imap_port: DEFAULT_IMAP_PORT,
            imap_encryption: Encryption::Tls,
            imap_user: None,
            imap_password: String::new(),
            smtp_server: String::new(),
            smtp_port: DEFAULT_SMTP_PORT,
            smtp_encryption: Encryption::Tls,
            smtp_user: None,
            smtp_password: None,
            proxy: None,
            timeout_ms: DEFAULT_SERVER_TIMEOUT_MS,
        }
    }
}

impl MailServerSettings {
    /// Servers with one password for both protocols.
    #[must_use]
    pub fn new(
        imap_server: impl Into<String>,
        smtp_server: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            imap_server: imap_server.into(),
            smtp_server: smtp_server.into(),
            imap_password: password.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), EmailSettingsError> {
        for (field, value) in [
            ("imap_server", &self.imap_server),
            ("smtp_server", &self.smtp_server),
        ] {
            if value.trim().is_empty() {
                return Err(EmailSettingsError::Empty { field });
            }
        }
        for (field, port) in [("imap_port", self.imap_port), ("smtp_port", self.smtp_port)] {
            if port == 0 {
                return Err(EmailSettingsError::Zero { field });
            }
        }
        if self.imap_encryption == Encryption::StartTls {
            return Err(EmailSettingsError::ImapStartTls);
        }
        if let Some(proxy) = &self.proxy {
            if proxy.host.trim().is_empty() {
                return Err(EmailSettingsError::Empty { field: "proxy.host" });
            }
            if proxy.port == 0 {
                return Err(EmailSettingsError::Zero { field: "proxy.port" });
            }
        }
        if self.timeout_ms == 0 {
            return Err(EmailSettingsError::Zero {
                field: "timeout_ms",
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn imap_user<'a>(&'a self, address: &'a str) -> &'a str {
        self.imap_user.as_deref().unwrap_or(address)
    }

    #[must_use]
    pub fn smtp_user<'a>(&'a self, address: &'a str) -> &'a str {
        self.smtp_user.as_deref().unwrap_or(address)
    }

    #[must_use]
    pub fn smtp_password(&self) -> &str {
        self.smtp_password.as_deref().unwrap_or(&self.imap_password)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Settings for one mailbox connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    /// Address this participant receives and sends with
    pub email_address: String,
    /// Every participant reads the same mailbox; mails go to `email_address`
    pub shared_mailbox: bool,
    /// Directory of the file-backed mail store
    pub mailbox_dir: Option<PathBuf>,
    /// IMAP/SMTP servers; takes precedence over `mailbox_dir`
    pub server: Option<MailServerSettings>,
    /// Largest attachment sent in one mail
    pub max_message_size: usize,
    /// Poll interval in milliseconds
    pub check_interval_ms: u64,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            email_address: String::new(),
            shared_mailbox: false,
            mailbox_dir: None,
            server: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
        }
    }
}

impl EmailSettings {
    #[must_use]
    pub fn new(email_address: impl Into<String>) -> Self {
        Self {
            email_address: email_address.into(),
            ..Default::default()
        }
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), EmailSettingsError> {
        if !is_email_valid(&self.email_address) {
            return Err(EmailSettingsError::InvalidAddress(
                self.email_address.clone(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(EmailSettingsError::Zero {
                field: "max_message_size",
            });
        }
        if self.check_interval_ms == 0 {
            return Err(EmailSettingsError::Zero {
                field: "check_interval_ms",
            });
        }
        if let Some(server) = &self.server {
            server.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}
