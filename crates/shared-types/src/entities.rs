//! # Message Model
//!
//! Value types exchanged over the bus.
//!
//! - [`Scope`]: logical channel, usually `study id + round tag`
//! - [`Participant`]: addressable identity (name plus identifier)
//! - [`Message`]: the application message with its opaque payload
//! - [`BusMessage`]: a message addressed to a receiver within a scope
//! - [`BusMessageFragment`]: a bounded chunk of an oversized message
//! - [`WireUnit`]: what a transport actually carries

use crate::errors::ModelError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;
use uuid::Uuid;

#[allow(clippy::expect_used)]
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9_!#$%&'*+/=?`{|}~^-]+(?:\.[A-Za-z0-9_!#$%&'*+/=?`{|}~^-]+)*@(?:[a-zA-Z0-9-]+\.)+[a-zA-Z]{2,6}$",
    )
    .expect("email pattern compiles")
});

// =============================================================================
// SCOPE
// =============================================================================

/// Protocol rounds with their scope suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Round {
    /// Initial message distributing the study definition.
    Initial,
    /// Exchange of shares.
    First,
    /// Exchange of sums.
    Second,
}

impl Round {
    /// Suffix appended to a study id to form the round's scope.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Round::Initial => "_round0",
            Round::First => "_round1",
            Round::Second => "_round2",
        }
    }
}

/// Named channel partitioning the message space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scope(String);

impl Scope {
    /// Create a scope from a raw name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Scope of `round` within the study identified by `study_id`.
    #[must_use]
    pub fn for_round(study_id: &str, round: Round) -> Self {
        Self(format!("{study_id}{}", round.tag()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Whether this scope carries initial messages.
    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.0.contains(Round::Initial.tag())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// PARTICIPANT
// =============================================================================

/// Kind of identifier a participant is addressed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentifierKind {
    /// E-mail address, validated.
    Email,
    /// Backend-assigned identifier, only required to be non-empty.
    Opaque,
}

/// Addressable identity.
///
/// Two participants are equal when name and identifier match; the
/// identifier kind does not take part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    name: String,
    identifier: String,
    kind: IdentifierKind,
}

impl Participant {
    /// Create a participant addressed by e-mail.
    ///
    /// # Errors
    ///
    /// `ModelError::InvalidIdentifier` if `email` is not a valid address.
    pub fn email(name: impl Into<String>, email: impl Into<String>) -> Result<Self, ModelError> {
        let identifier = email.into();
        if !is_email_valid(&identifier) {
            return Err(ModelError::InvalidIdentifier { identifier });
        }
        Ok(Self {
            name: name.into(),
            identifier,
            kind: IdentifierKind::Email,
        })
    }

    /// Create a participant addressed by an opaque identifier.
    ///
    /// # Errors
    ///
    /// `ModelError::Empty` if `identifier` is empty.
    pub fn opaque(
        name: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let identifier = identifier.into();
        if identifier.trim().is_empty() {
            return Err(ModelError::Empty {
                field: "participant identifier",
            });
        }
        Ok(Self {
            name: name.into(),
            identifier,
            kind: IdentifierKind::Opaque,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    #[must_use]
    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    /// Re-check invariants of a value that bypassed the constructors.
    ///
    /// # Errors
    ///
    /// Same as the matching constructor.
    pub fn validate(&self) -> Result<(), ModelError> {
        match self.kind {
            IdentifierKind::Email if !is_email_valid(&self.identifier) => {
                Err(ModelError::InvalidIdentifier {
                    identifier: self.identifier.clone(),
                })
            }
            IdentifierKind::Opaque if self.identifier.trim().is_empty() => Err(ModelError::Empty {
                field: "participant identifier",
            }),
            _ => Ok(()),
        }
    }
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.identifier == other.identifier
    }
}

impl Eq for Participant {}

impl Hash for Participant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.identifier.hash(state);
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.identifier)
    }
}

/// Check an e-mail address against the accepted address pattern.
#[must_use]
pub fn is_email_valid(address: &str) -> bool {
    EMAIL_PATTERN.is_match(address)
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Identifier of a logical message; fragments carry their parent's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Application message with an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    sender: Option<Participant>,
    reply_id: Option<String>,
    payload: Vec<u8>,
}

impl Message {
    /// New message with a fresh id.
    #[must_use]
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id: MessageId::new(),
            sender: None,
            reply_id: None,
            payload: payload.into(),
        }
    }

    /// Set the participant replies should be addressed to.
    #[must_use]
    pub fn with_sender(mut self, sender: Participant) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Mark this message as a reply.
    #[must_use]
    pub fn with_reply_id(mut self, reply_id: impl Into<String>) -> Self {
        self.reply_id = Some(reply_id.into());
        self
    }

    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub fn sender(&self) -> Option<&Participant> {
        self.sender.as_ref()
    }

    #[must_use]
    pub fn reply_id(&self) -> Option<&str> {
        self.reply_id.as_deref()
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// A message addressed to a receiver within a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    pub scope: Scope,
    pub receiver: Participant,
    pub message: Message,
}

impl BusMessage {
    #[must_use]
    pub fn new(message: Message, scope: Scope, receiver: Participant) -> Self {
        Self {
            scope,
            receiver,
            message,
        }
    }
}

/// Bounded chunk of a serialized [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessageFragment {
    scope: Scope,
    receiver: Participant,
    parent_id: MessageId,
    index: u32,
    total: u32,
    chunk: Vec<u8>,
}

impl BusMessageFragment {
    /// Create a fragment.
    ///
    /// # Errors
    ///
    /// `ModelError::InvalidFragment` if `total` is zero or `index >= total`.
    pub fn new(
        scope: Scope,
        receiver: Participant,
        parent_id: MessageId,
        index: u32,
        total: u32,
        chunk: Vec<u8>,
    ) -> Result<Self, ModelError> {
        check_position(index, total)?;
        Ok(Self {
            scope,
            receiver,
            parent_id,
            index,
            total,
            chunk,
        })
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn receiver(&self) -> &Participant {
        &self.receiver
    }

    #[must_use]
    pub fn parent_id(&self) -> MessageId {
        self.parent_id
    }

    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn chunk(&self) -> &[u8] {
        &self.chunk
    }

    #[must_use]
    pub fn into_chunk(self) -> Vec<u8> {
        self.chunk
    }

    /// Re-check the position invariant after decoding.
    ///
    /// # Errors
    ///
    /// `ModelError::InvalidFragment` on a bad position.
    pub fn validate(&self) -> Result<(), ModelError> {
        check_position(self.index, self.total)
    }
}

fn check_position(index: u32, total: u32) -> Result<(), ModelError> {
    if total == 0 || index >= total {
        return Err(ModelError::InvalidFragment { index, total });
    }
    Ok(())
}

/// Unit carried by a transport: a whole message or one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireUnit {
    Message(BusMessage),
    Fragment(BusMessageFragment),
}

impl WireUnit {
    /// Id of the logical message this unit belongs to.
    #[must_use]
    pub fn message_id(&self) -> MessageId {
        match self {
            WireUnit::Message(m) => m.message.id(),
            WireUnit::Fragment(f) => f.parent_id(),
        }
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        match self {
            WireUnit::Message(m) => &m.scope,
            WireUnit::Fragment(f) => f.scope(),
        }
    }

    #[must_use]
    pub fn receiver(&self) -> &Participant {
        match self {
            WireUnit::Message(m) => &m.receiver,
            WireUnit::Fragment(f) => f.receiver(),
        }
    }

    #[must_use]
    pub fn is_fragment(&self) -> bool {
        matches!(self, WireUnit::Fragment(_))
    }

    /// Check invariants of a decoded unit.
    ///
    /// # Errors
    ///
    /// The first violated model invariant.
    pub fn validate(&self) -> Result<(), ModelError> {
        match self {
            WireUnit::Message(m) => {
                m.receiver.validate()?;
                if let Some(sender) = m.message.sender() {
                    sender.validate()?;
                }
                Ok(())
            }
            WireUnit::Fragment(f) => {
                f.receiver.validate()?;
                f.validate()
            }
        }
    }
}
