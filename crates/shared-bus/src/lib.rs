//! # Shared Bus - Polling Message Bus
//!
//! Transport-independent core of EasyBus.
//!
//! ## Architecture
//!
//! ```text
//!   send(message, scope, receiver)               listener.receive(message)
//!            │                                              ↑
//!            ▼                                              │
//!   ┌─────────────────┐   split    ┌──────────────────┐   merge
//!   │   Bus (sends)   │ ─────────→ │  MessageManager  │ ←───────┐
//!   └─────────────────┘            └──────────────────┘         │
//!            │ send_message                              ┌──────────────┐
//!            ▼                                           │ Bus (poll    │
//!   ┌──────────────────────────────────────────┐         │   task)      │
//!   │        dyn TransportAdapter              │ ──────→ └──────────────┘
//!   │  (easybackend HTTP, email, local)        │ list_messages
//!   └──────────────────────────────────────────┘
//! ```
//!
//! ## Delivery
//!
//! - Units larger than `max_message_size` travel as fragments
//! - A message is delivered once per id; redelivered units are dropped
//! - Transport items are deleted only after a listener received the message

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod completed_cache;
pub mod config;
pub mod errors;
pub mod initial;
pub mod listener;
pub mod local;
pub mod message_manager;
pub mod transport;

// Re-export main types
pub use bus::{Bus, BusState, SendHandle};
pub use completed_cache::CompletedMessageCache;
pub use config::BusConfig;
pub use errors::{BusError, ConfigError, TransportError};
pub use initial::{InitialMessage, InitialMessageManager};
pub use listener::MessageListener;
pub use local::{LocalExchange, LocalTransport};
pub use message_manager::{delete_receipts, MessageManager, Reassembled};
pub use transport::{MessageFilter, ReceivedUnit, Receipt, TransportAdapter};
