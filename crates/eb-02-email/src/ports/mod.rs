//! Ports for the email transport.

pub mod outbound;
