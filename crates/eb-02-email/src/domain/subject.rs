//! Mail subjects carrying scope and receiver.
//!
//! ```text
//! [EasySMPC]BEGIN_NAME_SCOPE{scope}END_NAME_SCOPE BEGIN_NAME_PARTICIPANT{name}END_NAME_PARTICIPANT BEGIN_EMAIL_PARTICIPANT{email}END_EMAIL_PARTICIPANT
//! ```

use shared_types::{is_email_valid, Participant, Scope};

pub const SUBJECT_PREFIX: &str = "[EasySMPC]";
pub const SCOPE_START_TAG: &str = "BEGIN_NAME_SCOPE";
pub const SCOPE_END_TAG: &str = "END_NAME_SCOPE";
pub const NAME_START_TAG: &str = "BEGIN_NAME_PARTICIPANT";
pub const NAME_END_TAG: &str = "END_NAME_PARTICIPANT";
pub const EMAIL_START_TAG: &str = "BEGIN_EMAIL_PARTICIPANT";
pub const EMAIL_END_TAG: &str = "END_EMAIL_PARTICIPANT";

/// Subject for a mail in `scope` addressed to `receiver`.
#[must_use]
pub fn create_subject(scope: &Scope, receiver: &Participant) -> String {
    format!(
        "{SUBJECT_PREFIX}{SCOPE_START_TAG}{}{SCOPE_END_TAG} \
         {NAME_START_TAG}{}{NAME_END_TAG} \
         {EMAIL_START_TAG}{}{EMAIL_END_TAG}",
        scope.name(),
        receiver.name(),
        receiver.identifier(),
    )
}

/// Whether `subject` was written by [`create_subject`] (or looks like it).
#[must_use]
pub fn has_prefix(subject: &str) -> bool {
    subject.contains(SUBJECT_PREFIX)
}

/// Scope encoded in `subject`, `None` if absent or empty.
#[must_use]
pub fn parse_scope(subject: &str) -> Option<Scope> {
    between(subject, SCOPE_START_TAG, SCOPE_END_TAG).map(Scope::new)
}

/// Receiver encoded in `subject`, `None` if absent or invalid.
#[must_use]
pub fn parse_participant(subject: &str) -> Option<Participant> {
    let name = between(subject, NAME_START_TAG, NAME_END_TAG)?;
    let email = between(subject, EMAIL_START_TAG, EMAIL_END_TAG)?;
    if !is_email_valid(email) {
        return None;
    }
    Participant::email(name, email).ok()
}

fn between<'a>(text: &'a str, start_tag: &str, end_tag: &str) -> Option<&'a str> {
    let start = text.find(start_tag)? + start_tag.len();
    let end = start + text[start..].find(end_tag)?;
    let value = &text[start..end];
    (!value.is_empty()).then_some(value)
}
