//! # Email Transport
//!
//! Carries bus units as mails. The mailbox itself sits behind the
//! [`MailStore`] port; the crate ships a store on a real IMAP/SMTP server,
//! an in-memory store and a directory-backed store that several processes
//! can share.
//!
//! ## Architecture
//!
//! - **Domain Layer:** subject encoding/parsing, mailbox settings
//! - **Ports Layer:** [`MailStore`] with flag-then-expunge deletion,
//!   [`MailboxClient`] and [`MailSubmitter`] for the two mail protocols
//! - **Adapters Layer:** [`ImapSmtpMailStore`] (async-imap and lettre, with an
//!   optional HTTP proxy for IMAP), [`InMemoryMailStore`],
//!   [`DirectoryMailStore`], [`EmailTransport`]

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::{
    DirectoryMailStore, EmailTransport, ImapClient, ImapSmtpMailStore, InMemoryMailStore,
    SmtpSubmitter,
};
pub use domain::{
    create_subject, parse_participant, parse_scope, EmailSettings, EmailSettingsError,
    Encryption, MailServerSettings, ProxySettings,
};
pub use ports::outbound::{
    MailError, MailStore, MailSubmitter, MailboxClient, OutgoingMail, StoredMail,
};
