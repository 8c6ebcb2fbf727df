//! Adapters implementing the ports.

pub mod directory;
pub mod imap;
pub mod memory;
pub mod mime;
pub mod proxy;
pub mod server;
pub mod smtp;
pub mod transport;

pub use directory::DirectoryMailStore;
pub use imap::ImapClient;
pub use memory::InMemoryMailStore;
pub use server::ImapSmtpMailStore;
pub use smtp::SmtpSubmitter;
pub use transport::EmailTransport;
