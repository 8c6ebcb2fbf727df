//! # Runtime Configuration
//!
//! Loaded from a TOML file, then patched from the environment:
//!
//! ```toml
//! transport = "easybackend"
//!
//! [participant]
//! name = "Alice"
//! email = "alice@example.org"
//!
//! [easybackend]
//! api_server = "https://backend.example.org"
//! username = "alice"
//! ```
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `EASYBUS_PASSWORD` | `easybackend.password` |
//! | `EASYBUS_API_SERVER` | `easybackend.api_server` |
//! | `EASYBUS_POLL_INTERVAL_MS` | `bus.poll_interval_ms` |
//!
//! Without a `[bus]` section the poll interval and maximum message size
//! follow the selected transport's settings.

use eb_01_easybackend::EasyBackendSettings;
use eb_02_email::EmailSettings;
use serde::{Deserialize, Serialize};
use shared_bus::BusConfig;
use shared_types::{ModelError, Participant};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const ENV_PASSWORD: &str = "EASYBUS_PASSWORD";
pub const ENV_API_SERVER: &str = "EASYBUS_API_SERVER";
pub const ENV_POLL_INTERVAL_MS: &str = "EASYBUS_POLL_INTERVAL_MS";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Unable to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value}")]
    InvalidOverride { var: &'static str, value: String },

    #[error("Transport {0} selected but its section is missing")]
    MissingSection(&'static str),

    #[error("Invalid participant: {0}")]
    Participant(#[from] ModelError),
}

/// Backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Easybackend,
    Email,
    /// In-process loopback; only useful for trying the runtime out.
    Local,
}

impl TransportKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportKind::Easybackend => "easybackend",
            TransportKind::Email => "email",
            TransportKind::Local => "local",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantConfig {
    pub name: String,
    pub email: String,
}

impl ParticipantConfig {
    /// # Errors
    ///
    /// `ModelError` if name or address is invalid.
    pub fn to_participant(&self) -> Result<Participant, ModelError> {
        Participant::email(self.name.clone(), self.email.clone())
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub transport: TransportKind,
    pub participant: ParticipantConfig,
    #[serde(default)]
    pub bus: Option<BusConfig>,
    #[serde(default)]
    pub easybackend: Option<EasyBackendSettings>,
    #[serde(default)]
    pub email: Option<EmailSettings>,
}

impl RuntimeConfig {
    /// Read `path`, apply environment overrides and check the result.
    ///
    /// # Errors
    ///
    /// `ConfigLoadError` if the file cannot be read or is inconsistent.
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.check()?;
        info!(path = %path.display(), transport = config.transport.as_str(), "Loaded configuration");
        Ok(config)
    }

    /// # Errors
    ///
    /// `ConfigLoadError::Parse` on malformed TOML.
    pub fn from_toml(text: &str) -> Result<Self, ConfigLoadError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `EASYBUS_*` overrides looked up through `lookup`.
    ///
    /// # Errors
    ///
    /// `ConfigLoadError::InvalidOverride` if a numeric override does not parse.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigLoadError> {
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.easybackend
                .get_or_insert_with(EasyBackendSettings::default)
                .password = password;
        }
        if let Some(api_server) = lookup(ENV_API_SERVER) {
            self.easybackend
                .get_or_insert_with(EasyBackendSettings::default)
                .api_server = api_server;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL_MS) {
            let interval = value
                .parse()
                .map_err(|_| ConfigLoadError::InvalidOverride {
                    var: ENV_POLL_INTERVAL_MS,
                    value,
                })?;
            let mut bus = self.bus_config();
            bus.poll_interval_ms = interval;
            self.bus = Some(bus);
        }
        Ok(())
    }

    /// Structural checks; transport settings are validated on connect.
    ///
    /// # Errors
    ///
    /// `ConfigLoadError` for an invalid participant or a missing section.
    pub fn check(&self) -> Result<(), ConfigLoadError> {
        self.participant.to_participant()?;
        match self.transport {
            TransportKind::Easybackend if self.easybackend.is_none() => {
                Err(ConfigLoadError::MissingSection("easybackend"))
            }
            TransportKind::Email if self.email.is_none() => {
                Err(ConfigLoadError::MissingSection("email"))
            }
            _ => Ok(()),
        }
    }

    /// Bus parameters, derived from the transport settings when `[bus]` is absent.
    #[must_use]
    pub fn bus_config(&self) -> BusConfig {
        if let Some(bus) = &self.bus {
            return bus.clone();
        }
        let mut bus = BusConfig::default();
        match self.transport {
            TransportKind::Easybackend => {
                if let Some(settings) = &self.easybackend {
                    bus.poll_interval_ms = settings.check_interval_ms;
                    bus.max_message_size = settings.max_message_size;
                }
            }
            TransportKind::Email => {
                if let Some(settings) = &self.email {
                    bus.poll_interval_ms = settings.check_interval_ms;
                    bus.max_message_size = settings.max_message_size;
                }
            }
            TransportKind::Local => {}
        }
        bus
    }
}
