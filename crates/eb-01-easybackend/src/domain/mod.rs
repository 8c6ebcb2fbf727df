//! # Domain Layer for the easybackend Transport
//!
//! Connection settings and credential value types. No I/O.

mod settings;
mod token;

pub use settings::*;
pub use token::*;
