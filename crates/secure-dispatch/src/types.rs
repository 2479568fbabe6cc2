use jid::Jid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a message was protected before handoff to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeType {
    /// Not sent on this attempt; the caller retries later.
    Queued,
    /// Sent without pairwise protection (group broadcast).
    Outgoing,
    OutgoingEncrypted,
    OutgoingEncryptedVerified,
}

impl OutcomeType {
    pub fn is_queued(self) -> bool {
        self == OutcomeType::Queued
    }

    pub fn is_encrypted(self) -> bool {
        matches!(
            self,
            OutcomeType::OutgoingEncrypted | OutcomeType::OutgoingEncryptedVerified
        )
    }
}

impl fmt::Display for OutcomeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeType::Queued => "queued",
            OutcomeType::Outgoing => "outgoing",
            OutcomeType::OutgoingEncrypted => "outgoing_encrypted",
            OutcomeType::OutgoingEncryptedVerified => "outgoing_encrypted_verified",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairwiseSessionStatus {
    Plaintext,
    Handshaking,
    Encrypted,
}

/// Whether a resolved address supports group encryption.
///
/// `Supported` is absorbing: once observed it is kept for the life of the
/// conversation. `Unsupported` is tentative and re-queried on every send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionCapability {
    #[default]
    Unknown,
    Unsupported,
    Supported,
}

impl EncryptionCapability {
    pub fn is_supported(self) -> bool {
        self == EncryptionCapability::Supported
    }

    pub fn from_verdict(supported: bool) -> Self {
        if supported {
            EncryptionCapability::Supported
        } else {
            EncryptionCapability::Unsupported
        }
    }

    /// Fold a fresh oracle verdict into the cached value.
    pub fn merge(self, observed: EncryptionCapability) -> Self {
        match (self, observed) {
            (EncryptionCapability::Supported, _) => EncryptionCapability::Supported,
            (current, EncryptionCapability::Unknown) => current,
            (_, observed) => observed,
        }
    }
}

/// Key of a pairwise encryption session: our account and the remote address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId {
    pub local: Jid,
    pub remote: Jid,
}

impl SessionId {
    pub fn new(local: Jid, remote: Jid) -> Self {
        Self { local, remote }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.local, self.remote)
    }
}

/// Where a conversation is in its dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    #[default]
    Idle,
    Resolving,
    Dispatching,
    /// A pairwise handshake was requested and the last message was queued.
    AwaitingHandshake,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub from: Jid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Jid>,
    pub body: String,
    #[serde(with = "hex::serde", default)]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub is_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outcome: Option<OutcomeType>,
}

impl Message {
    pub fn new(from: Jid, body: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            from,
            to: None,
            body: body.into(),
            payload: Vec::new(),
            is_response: false,
            outcome: None,
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>, is_response: bool) -> Self {
        self.payload = payload;
        self.is_response = is_response;
        self
    }

    /// Outcome of the most recent dispatch attempt, if any.
    pub fn outcome(&self) -> Option<OutcomeType> {
        self.outcome
    }

    pub(crate) fn set_outcome(&mut self, outcome: OutcomeType) {
        self.outcome = Some(outcome);
    }
}
