//! Command line interface of `easybus`.

use clap::{Parser, Subcommand};
use shared_types::Participant;
use std::path::PathBuf;

/// EasyBus: exchange EasySMPC messages over easybackend, email or locally
#[derive(Parser, Debug)]
#[command(name = "easybus", version)]
#[command(about = "Message bus runtime for EasySMPC participants")]
pub struct Args {
    /// Configuration file
    #[arg(short, long, env = "EASYBUS_CONFIG", default_value = "bus.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive messages for this participant until interrupted
    Listen {
        /// Scope to listen on; repeatable
        #[arg(short, long = "scope", required = true)]
        scopes: Vec<String>,

        /// Write each received payload to this directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exit after this many messages
        #[arg(long)]
        count: Option<usize>,
    },

    /// Send a file as one message
    Send {
        #[arg(short, long)]
        scope: String,

        /// Receiver as NAME:EMAIL
        #[arg(short, long, value_parser = parse_receiver)]
        to: Participant,

        /// Payload file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Delete every stored message of this account
    Purge,

    /// List initial (round 0) messages addressed to this participant
    Initial,
}

/// Parse `NAME:EMAIL`.
///
/// # Errors
///
/// A message for clap if the separator is missing or the address is invalid.
pub fn parse_receiver(value: &str) -> Result<Participant, String> {
    let (name, email) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected NAME:EMAIL, got {value:?}"))?;
    Participant::email(name.trim(), email.trim()).map_err(|e| e.to_string())
}
