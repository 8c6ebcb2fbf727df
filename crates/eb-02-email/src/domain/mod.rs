//! # Domain Layer for the Email Transport
//!
//! Subject encoding and mailbox settings. No I/O.

mod settings;
pub mod subject;

pub use settings::*;
pub use subject::{create_subject, parse_participant, parse_scope};
