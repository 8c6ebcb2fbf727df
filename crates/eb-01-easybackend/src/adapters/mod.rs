//! Adapters implementing the ports over HTTP.

pub mod password_grant;
pub mod transport;
pub mod wire;

pub use password_grant::PasswordGrantProvider;
pub use transport::EasyBackendTransport;
