//! SMTP submission on lettre.

use crate::domain::{Encryption, MailServerSettings};
use crate::ports::outbound::{MailError, MailSubmitter};
use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::debug;

/// [`MailSubmitter`] over an authenticated SMTP relay.
pub struct SmtpSubmitter {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    server: String,
}

impl SmtpSubmitter {
    /// # Errors
    ///
    /// `MailError::Io` if the relay cannot be configured.
    pub fn new(settings: &MailServerSettings, address: &str) -> Result<Self, MailError> {
        let host = settings.smtp_server.as_str();
        let builder = match settings.smtp_encryption {
            Encryption::Tls => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(host).map_err(smtp_error)?
            }
            Encryption::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host).map_err(smtp_error)?
            }
            Encryption::Plain => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
        };
        let credentials = Credentials::new(
            settings.smtp_user(address).to_string(),
            settings.smtp_password().to_string(),
        );
        let transport = builder
            .port(settings.smtp_port)
            .credentials(credentials)
            .timeout(Some(settings.timeout()))
            .build();
        Ok(Self {
            transport,
            server: settings.smtp_server.clone(),
        })
    }
}

fn smtp_error(e: lettre::transport::smtp::Error) -> MailError {
    MailError::Io(format!("SMTP: {e}"))
}

fn address(text: &str) -> Result<Address, MailError> {
    text.parse()
        .map_err(|e| MailError::Io(format!("Invalid address {text}: {e}")))
}

#[async_trait]
impl MailSubmitter for SmtpSubmitter {
    async fn submit(&self, from: &str, to: &str, raw: &[u8]) -> Result<(), MailError> {
        let envelope = Envelope::new(Some(address(from)?), vec![address(to)?])
            .map_err(|e| MailError::Io(e.to_string()))?;
        self.transport
            .send_raw(&envelope, raw)
            .await
            .map_err(smtp_error)?;
        debug!(server = %self.server, to, bytes = raw.len(), "Mail submitted");
        Ok(())
    }
}
