//! # EasyBus Runtime
//!
//! Library half of the `easybus` executable.
//!
//! ## Modular Structure
//!
//! - `config` - TOML configuration with `EASYBUS_*` environment overrides
//! - `cli` - command line definition
//! - `runtime` - transport wiring and the commands
//!
//! ## Startup Sequence
//!
//! 1. Parse arguments and install the tracing subscriber
//! 2. Load configuration (file, then environment)
//! 3. Connect the selected transport
//! 4. Run the command; `listen` runs until Ctrl+C

pub mod cli;
pub mod config;
pub mod runtime;

pub use cli::{Args, Command};
pub use config::{ConfigLoadError, ParticipantConfig, RuntimeConfig, TransportKind};
pub use runtime::{build_transport, BusRuntime};
