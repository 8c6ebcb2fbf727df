//! HTTP `CONNECT` tunnel for mail connections behind a proxy.

use crate::ports::outbound::MailError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Largest proxy response head accepted.
const MAX_RESPONSE_HEAD: usize = 8 * 1024;

/// Ask the proxy on `stream` to open a tunnel to `host:port`.
///
/// Reads the response head byte by byte so nothing of the tunnelled
/// protocol is consumed.
///
/// # Errors
///
/// `MailError::Io` on I/O failure or when the proxy refuses.
pub async fn connect_tunnel<S>(stream: &mut S, host: &str, port: u16) -> Result<(), MailError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let target = format!("{host}:{port}");
    let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n\r\n");
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| MailError::Io(e.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|e| MailError::Io(e.to_string()))?;

    let mut head = Vec::with_capacity(128);
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_RESPONSE_HEAD {
            return Err(MailError::Io("Proxy response too long".into()));
        }
        let byte = stream
            .read_u8()
            .await
            .map_err(|e| MailError::Io(format!("Proxy closed connection: {e}")))?;
        head.push(byte);
    }

    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok());
    match status {
        Some(code) if (200..300).contains(&code) => {
            debug!(tunnel = %target, "Proxy tunnel established");
            Ok(())
        }
        _ => Err(MailError::Io(format!("Proxy refused tunnel: {status_line}"))),
    }
}
