//! # EasyBus Test Suite
//!
//! Cross-crate integration tests.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── mock_backend.rs   # axum easybackend + password grant server
//! └── integration/
//!     ├── bus_flows.rs          # buses over the local exchange
//!     ├── easybackend_http.rs   # HTTP transport against the mock server
//!     ├── email_flows.rs        # buses over a shared mailbox directory
//!     └── runtime_flows.rs      # easybus runtime wiring
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p eb-tests
//! cargo test -p eb-tests integration::easybackend_http
//! ```

pub mod integration;
pub mod mock_backend;

pub use mock_backend::MockBackend;
