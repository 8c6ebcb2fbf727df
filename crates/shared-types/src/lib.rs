//! # Shared Types Crate
//!
//! Message model and wire codec used by the bus core and all transports.
//!
//! ## Design Principles
//!
//! - **Immutable values**: messages, fragments, scopes and participants are
//!   constructed once and only read afterwards.
//! - **One wire format**: every transport carries a [`WireUnit`], serialized
//!   with bincode and compressed with GZIP. Text transports add Base64.
//! - **Validated construction**: participants and fragments reject invalid
//!   input at construction and again after decoding.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod codec;
pub mod entities;
pub mod errors;

pub use codec::{decode_unit, decode_unit_gzip, encode_unit, encode_unit_gzip};
pub use entities::*;
pub use errors::*;
