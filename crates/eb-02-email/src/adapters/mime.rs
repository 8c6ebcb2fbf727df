//! RFC 5322 mails for server mailboxes.
//!
//! Outgoing mails are `multipart/mixed`: an inline text body plus the unit
//! as an `application/octet-stream` attachment named [`ATTACHMENT_NAME`].

use crate::ports::outbound::{MailError, OutgoingMail, StoredMail};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use mailparse::{DispositionType, MailHeader, MailHeaderMap, ParsedMail};

pub const ATTACHMENT_NAME: &str = "message";

const OCTET_STREAM: &str = "application/octet-stream";

fn invalid(reason: impl ToString) -> MailError {
    MailError::Io(reason.to_string())
}

/// Render `mail` as RFC 5322 bytes.
///
/// # Errors
///
/// `MailError::Io` if an address does not parse.
pub fn compose(mail: &OutgoingMail) -> Result<Vec<u8>, MailError> {
    let from: Mailbox = mail.sender.parse().map_err(invalid)?;
    let to: Mailbox = mail.recipient.parse().map_err(invalid)?;

    let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(mail.body.clone()));
    if let Some(attachment) = &mail.attachment {
        let content_type = ContentType::parse(OCTET_STREAM).map_err(invalid)?;
        parts = parts.singlepart(
            Attachment::new(ATTACHMENT_NAME.to_string()).body(attachment.clone(), content_type),
        );
    }

    let message = Message::builder()
        .from(from.clone())
        .sender(from)
        .to(to)
        .subject(mail.subject.clone())
        .multipart(parts)
        .map_err(invalid)?;
    Ok(message.formatted())
}

/// Subject and recipient from a header block.
///
/// # Errors
///
/// `MailError::Corrupt` if the headers do not parse.
pub fn parse_headers(uid: u64, raw: &[u8]) -> Result<(String, String), MailError> {
    let (headers, _) = mailparse::parse_headers(raw).map_err(|e| corrupt(uid, e))?;
    Ok((subject(&headers), recipient(&headers)))
}

/// Parse a full mail, decoding its first attachment.
///
/// # Errors
///
/// `MailError::Corrupt` if the mail or its attachment encoding is malformed.
pub fn parse(uid: u64, raw: &[u8]) -> Result<StoredMail, MailError> {
    let mail = mailparse::parse_mail(raw).map_err(|e| corrupt(uid, e))?;
    let attachment = match find_attachment(&mail) {
        Some(part) => Some(part.get_body_raw().map_err(|e| corrupt(uid, e))?),
        None => None,
    };
    Ok(StoredMail {
        uid,
        recipient: recipient(&mail.headers),
        subject: subject(&mail.headers),
        attachment,
    })
}

fn corrupt(uid: u64, e: impl ToString) -> MailError {
    MailError::Corrupt {
        uid,
        reason: e.to_string(),
    }
}

fn subject(headers: &[MailHeader]) -> String {
    headers.get_first_value("Subject").unwrap_or_default()
}

fn recipient(headers: &[MailHeader]) -> String {
    headers
        .get_first_header("To")
        .and_then(|header| mailparse::addrparse_header(header).ok())
        .and_then(|list| list.extract_single_info())
        .map(|info| info.addr)
        .unwrap_or_default()
}

fn find_attachment<'m, 'a>(mail: &'m ParsedMail<'a>) -> Option<&'m ParsedMail<'a>> {
    if matches!(
        mail.get_content_disposition().disposition,
        DispositionType::Attachment
    ) {
        return Some(mail);
    }
    mail.subparts.iter().find_map(find_attachment)
}
