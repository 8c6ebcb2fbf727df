//! IMAP access to the server inbox.
//!
//! Every operation opens its own session (connect, login, select `INBOX`)
//! and logs out afterwards. The `\Deleted` flag persists on the server, so
//! flagging and expunging may happen in different sessions.

use crate::adapters::proxy::connect_tunnel;
use crate::domain::{Encryption, MailServerSettings, ProxySettings};
use crate::ports::outbound::{MailError, MailboxClient};
use async_imap::types::Fetch;
use async_imap::{Client, Session};
use async_trait::async_trait;
use futures::TryStreamExt;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

const INBOX: &str = "INBOX";

/// Byte stream an IMAP session runs on.
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + Send + Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Debug> ImapStream for T {}

type ImapSession = Session<Box<dyn ImapStream>>;

/// [`MailboxClient`] on async-imap.
pub struct ImapClient {
    host: String,
    port: u16,
    encryption: Encryption,
    user: String,
    password: String,
    proxy: Option<ProxySettings>,
    timeout: Duration,
    tls: TlsConnector,
}

impl ImapClient {
    /// Prepare a client. No connection is made until the first operation.
    ///
    /// # Errors
    ///
    /// `MailError::Io` if the TLS configuration cannot be built.
    pub fn new(settings: &MailServerSettings, address: &str) -> Result<Self, MailError> {
        Ok(Self {
            host: settings.imap_server.clone(),
            port: settings.imap_port,
            encryption: settings.imap_encryption,
            user: settings.imap_user(address).to_string(),
            password: settings.imap_password.clone(),
            proxy: settings.proxy.clone(),
            timeout: settings.timeout(),
            tls: tls_connector()?,
        })
    }

    async fn connect(&self) -> Result<Box<dyn ImapStream>, MailError> {
        let tcp = match &self.proxy {
            Some(proxy) => {
                let mut tcp = TcpStream::connect((proxy.host.as_str(), proxy.port))
                    .await
                    .map_err(io_error)?;
                connect_tunnel(&mut tcp, &self.host, self.port).await?;
                tcp
            }
            None => TcpStream::connect((self.host.as_str(), self.port))
                .await
                .map_err(io_error)?,
        };

        match self.encryption {
            Encryption::Plain => Ok(Box::new(tcp)),
            Encryption::Tls | Encryption::StartTls => {
                let name = ServerName::try_from(self.host.clone())
                    .map_err(|e| MailError::Io(format!("Invalid IMAP host: {e}")))?;
                let tls = self.tls.connect(name, tcp).await.map_err(io_error)?;
                Ok(Box::new(tls))
            }
        }
    }

    /// Connect, log in and select the inbox. Returns the session and the
    /// number of mails in the inbox.
    async fn open(&self) -> Result<(ImapSession, u32), MailError> {
        let mut client = Client::new(self.connect().await?);
        match client.read_response().await {
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(io_error(e)),
            None => return Err(MailError::Io("IMAP server closed before greeting".into())),
        }

        let mut session = client
            .login(&self.user, &self.password)
            .await
            .map_err(|(e, _)| imap_error(e))?;
        let inbox = session.select(INBOX).await.map_err(imap_error)?;
        debug!(host = %self.host, exists = inbox.exists, "IMAP session opened");
        Ok((session, inbox.exists))
    }

    async fn close(mut session: ImapSession) {
        if let Err(e) = session.logout().await {
            warn!(error = %e, "IMAP logout failed");
        }
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, MailError>>,
    ) -> Result<T, MailError> {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| MailError::Io(format!("IMAP server {} timed out", self.host)))?
    }

    async fn uid_fetch(&self, set: String, query: &str) -> Result<Vec<Fetch>, MailError> {
        let (mut session, exists) = self.open().await?;
        if exists == 0 {
            Self::close(session).await;
            return Ok(Vec::new());
        }
        let fetched: Result<Vec<Fetch>, MailError> = async {
            session
                .uid_fetch(set, query)
                .await
                .map_err(imap_error)?
                .try_collect()
                .await
                .map_err(imap_error)
        }
        .await;
        Self::close(session).await;
        fetched
    }
}

fn tls_connector() -> Result<TlsConnector, MailError> {
    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = rustls::ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| MailError::Io(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

fn io_error(e: std::io::Error) -> MailError {
    MailError::Io(format!("IMAP connection: {e}"))
}

fn imap_error(e: async_imap::error::Error) -> MailError {
    MailError::Io(format!("IMAP: {e}"))
}

fn uid_of(fetch: &Fetch) -> Option<u64> {
    fetch.uid.map(u64::from)
}

#[async_trait]
impl MailboxClient for ImapClient {
    async fn headers(&self) -> Result<Vec<(u64, Vec<u8>)>, MailError> {
        let fetches = self
            .bounded(self.uid_fetch("1:*".to_string(), "(UID RFC822.HEADER)"))
            .await?;
        Ok(fetches
            .iter()
            .filter_map(|fetch| Some((uid_of(fetch)?, fetch.header()?.to_vec())))
            .collect())
    }

    async fn fetch(&self, uids: &[u64]) -> Result<Vec<(u64, Vec<u8>)>, MailError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let set = uids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let fetches = self.bounded(self.uid_fetch(set, "(UID BODY.PEEK[])")).await?;
        Ok(fetches
            .iter()
            .filter_map(|fetch| Some((uid_of(fetch)?, fetch.body()?.to_vec())))
            .collect())
    }

    async fn flag_deleted(&self, uid: u64) -> Result<(), MailError> {
        self.bounded(async {
            let (mut session, _) = self.open().await?;
            let stored: Result<Vec<Fetch>, MailError> = async {
                session
                    .uid_store(uid.to_string(), "+FLAGS.SILENT (\\Deleted)")
                    .await
                    .map_err(imap_error)?
                    .try_collect()
                    .await
                    .map_err(imap_error)
            }
            .await;
            Self::close(session).await;
            stored.map(|_| ())
        })
        .await
    }

    async fn expunge(&self) -> Result<usize, MailError> {
        self.bounded(async {
            let (mut session, _) = self.open().await?;
            let removed: Result<Vec<u32>, MailError> = async {
                session
                    .expunge()
                    .await
                    .map_err(imap_error)?
                    .try_collect()
                    .await
                    .map_err(imap_error)
            }
            .await;
            Self::close(session).await;
            removed.map(|seqs| seqs.len())
        })
        .await
    }
}
