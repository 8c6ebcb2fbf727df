//! Ports for the easybackend transport.

pub mod outbound;
