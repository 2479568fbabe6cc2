use crate::{Error, Message, PairwiseSessionStatus, Result, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Owner of pairwise encryption session state, keyed by (local, remote).
///
/// Shared across conversations and externally synchronized. Every call may
/// block; the dispatcher never holds a conversation lock while calling in.
pub trait SessionRegistry: Send + Sync {
    fn status_of(&self, id: &SessionId) -> PairwiseSessionStatus;

    /// Whether the peer's identity key was confirmed out of band.
    fn is_verified(&self, id: &SessionId) -> bool;

    /// Counter bumped every time a fresh pairwise session is established.
    fn generation(&self, id: &SessionId) -> u64;

    /// Start a handshake. Idempotent while one is already in progress.
    fn begin_handshake(&self, id: &SessionId) -> Result<()>;

    /// Apply protocol framing to an outgoing message. `None` when the
    /// protocol cannot currently process an outgoing payload.
    fn transform_outgoing(&self, id: &SessionId, message: &Message) -> Option<Message>;

    /// As [`transform_outgoing`](Self::transform_outgoing), embedding sideband
    /// data in the encrypted channel.
    fn transform_outgoing_with_payload(
        &self,
        id: &SessionId,
        message: &Message,
        is_response: bool,
        payload: &[u8],
    ) -> Option<Message>;

    /// Frame a push whitelist token offer for the peer.
    fn transform_whitelist_tokens(
        &self,
        id: &SessionId,
        message: &Message,
        tokens: &[String],
    ) -> Option<Message>;

    /// Whether wake tokens were exchanged, so a wake can be sent.
    fn can_send_wake(&self, id: &SessionId) -> bool;

    fn send_wake(&self, id: &SessionId) -> Result<()>;

    fn begin_whitelist_token_exchange(&self, id: &SessionId) -> Result<()>;
}

/// Externally visible state of one in-memory pairwise session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseSnapshot {
    pub status: Option<PairwiseSessionStatus>,
    pub verified: bool,
    pub generation: u64,
    pub wake_capable: bool,
    pub handshakes_started: usize,
    pub wakes_sent: usize,
    pub token_exchanges: usize,
    pub transforms: usize,
}

#[derive(Debug, Default)]
struct PairwiseEntry {
    status: Option<PairwiseSessionStatus>,
    verified: bool,
    generation: u64,
    wake_capable: bool,
    tokens: Vec<String>,
    refuse_transforms: bool,
    fail_token_exchange: bool,
    handshakes_started: usize,
    wakes_sent: usize,
    token_exchanges: usize,
    transforms: usize,
}

impl PairwiseEntry {
    fn status(&self) -> PairwiseSessionStatus {
        self.status.unwrap_or(PairwiseSessionStatus::Plaintext)
    }

    fn can_transform(&self) -> bool {
        self.status() == PairwiseSessionStatus::Encrypted && !self.refuse_transforms
    }

    fn snapshot(&self) -> PairwiseSnapshot {
        PairwiseSnapshot {
            status: self.status,
            verified: self.verified,
            generation: self.generation,
            wake_capable: self.wake_capable,
            handshakes_started: self.handshakes_started,
            wakes_sent: self.wakes_sent,
            token_exchanges: self.token_exchanges,
            transforms: self.transforms,
        }
    }
}

/// Reference registry that keeps session state in memory.
///
/// Handshakes never complete on their own; call
/// [`complete_handshake`](Self::complete_handshake) to simulate the peer.
#[derive(Default)]
pub struct InMemorySessionRegistry {
    sessions: Mutex<HashMap<SessionId, PairwiseEntry>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entry<T>(&self, id: &SessionId, f: impl FnOnce(&mut PairwiseEntry) -> T) -> T {
        let mut sessions = self.sessions.lock().unwrap();
        f(sessions.entry(id.clone()).or_default())
    }

    fn read<T>(&self, id: &SessionId, f: impl FnOnce(&PairwiseEntry) -> T) -> T {
        let sessions = self.sessions.lock().unwrap();
        match sessions.get(id) {
            Some(entry) => f(entry),
            None => f(&PairwiseEntry::default()),
        }
    }

    pub fn set_status(&self, id: &SessionId, status: PairwiseSessionStatus) {
        self.with_entry(id, |entry| entry.status = Some(status));
    }

    pub fn set_verified(&self, id: &SessionId, verified: bool) {
        self.with_entry(id, |entry| entry.verified = verified);
    }

    /// Marks push whitelist tokens as exchanged (or not) for this session.
    pub fn set_wake_capable(&self, id: &SessionId, capable: bool) {
        self.with_entry(id, |entry| entry.wake_capable = capable);
    }

    /// Make every transform on this session fail even when encrypted.
    pub fn refuse_transforms(&self, id: &SessionId, refuse: bool) {
        self.with_entry(id, |entry| entry.refuse_transforms = refuse);
    }

    pub fn fail_token_exchange(&self, id: &SessionId, fail: bool) {
        self.with_entry(id, |entry| entry.fail_token_exchange = fail);
    }

    /// Finish a handshake: the session becomes encrypted under a new generation.
    pub fn complete_handshake(&self, id: &SessionId) {
        self.with_entry(id, |entry| {
            entry.status = Some(PairwiseSessionStatus::Encrypted);
            entry.generation += 1;
            entry.wake_capable = false;
            entry.tokens.clear();
        });
    }

    /// End the session; the next handshake starts a new generation.
    pub fn end_session(&self, id: &SessionId) {
        self.with_entry(id, |entry| {
            entry.status = Some(PairwiseSessionStatus::Plaintext);
            entry.verified = false;
        });
    }

    pub fn snapshot(&self, id: &SessionId) -> PairwiseSnapshot {
        self.read(id, PairwiseEntry::snapshot)
    }

    pub fn whitelist_tokens(&self, id: &SessionId) -> Vec<String> {
        self.read(id, |entry| entry.tokens.clone())
    }
}

fn framed(message: &Message) -> Message {
    let mut out = message.clone();
    out.body = hex::encode(message.body.as_bytes());
    out
}

impl SessionRegistry for InMemorySessionRegistry {
    fn status_of(&self, id: &SessionId) -> PairwiseSessionStatus {
        self.read(id, PairwiseEntry::status)
    }

    fn is_verified(&self, id: &SessionId) -> bool {
        self.read(id, |entry| entry.verified)
    }

    fn generation(&self, id: &SessionId) -> u64 {
        self.read(id, |entry| entry.generation)
    }

    fn begin_handshake(&self, id: &SessionId) -> Result<()> {
        self.with_entry(id, |entry| {
            if entry.status() == PairwiseSessionStatus::Plaintext {
                entry.status = Some(PairwiseSessionStatus::Handshaking);
                entry.handshakes_started += 1;
            }
        });
        Ok(())
    }

    fn transform_outgoing(&self, id: &SessionId, message: &Message) -> Option<Message> {
        self.with_entry(id, |entry| {
            if !entry.can_transform() {
                return None;
            }
            entry.transforms += 1;
            Some(framed(message))
        })
    }

    fn transform_outgoing_with_payload(
        &self,
        id: &SessionId,
        message: &Message,
        is_response: bool,
        payload: &[u8],
    ) -> Option<Message> {
        self.with_entry(id, |entry| {
            if !entry.can_transform() {
                return None;
            }
            entry.transforms += 1;
            let mut out = framed(message);
            out.payload = payload.to_vec();
            out.is_response = is_response;
            Some(out)
        })
    }

    fn transform_whitelist_tokens(
        &self,
        id: &SessionId,
        message: &Message,
        tokens: &[String],
    ) -> Option<Message> {
        let payload = serde_json::to_vec(tokens).ok()?;
        self.with_entry(id, |entry| {
            if !entry.can_transform() {
                return None;
            }
            entry.transforms += 1;
            let mut out = framed(message);
            out.payload = payload;
            Some(out)
        })
    }

    fn can_send_wake(&self, id: &SessionId) -> bool {
        self.read(id, |entry| entry.wake_capable)
    }

    fn send_wake(&self, id: &SessionId) -> Result<()> {
        self.with_entry(id, |entry| {
            if !entry.wake_capable {
                return Err(Error::Collaborator(format!("no wake tokens for {}", id)));
            }
            entry.wakes_sent += 1;
            Ok(())
        })
    }

    fn begin_whitelist_token_exchange(&self, id: &SessionId) -> Result<()> {
        self.with_entry(id, |entry| {
            entry.token_exchanges += 1;
            if entry.fail_token_exchange {
                return Err(Error::Collaborator(format!("token exchange refused for {}", id)));
            }
            if entry.status() != PairwiseSessionStatus::Encrypted {
                return Err(Error::Collaborator(format!("session {} is not encrypted", id)));
            }
            entry.tokens = (0..2)
                .map(|_| hex::encode(rand::random::<[u8; 16]>()))
                .collect();
            entry.wake_capable = true;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_id() -> SessionId {
        SessionId::new(
            "alice@example.org/laptop".parse().unwrap(),
            "bob@example.org/phone".parse().unwrap(),
        )
    }

    #[test]
    fn unknown_session_is_plaintext() {
        let registry = InMemorySessionRegistry::new();
        assert_eq!(registry.status_of(&session_id()), PairwiseSessionStatus::Plaintext);
        assert!(!registry.is_verified(&session_id()));
        assert_eq!(registry.generation(&session_id()), 0);
    }

    #[test]
    fn begin_handshake_is_idempotent() {
        let registry = InMemorySessionRegistry::new();
        let id = session_id();
        registry.begin_handshake(&id).unwrap();
        registry.begin_handshake(&id).unwrap();

        let snapshot = registry.snapshot(&id);
        assert_eq!(snapshot.status, Some(PairwiseSessionStatus::Handshaking));
        assert_eq!(snapshot.handshakes_started, 1);
    }

    #[test]
    fn completed_handshake_starts_new_generation() {
        let registry = InMemorySessionRegistry::new();
        let id = session_id();
        registry.begin_handshake(&id).unwrap();
        registry.complete_handshake(&id);
        assert_eq!(registry.status_of(&id), PairwiseSessionStatus::Encrypted);
        assert_eq!(registry.generation(&id), 1);

        registry.end_session(&id);
        registry.begin_handshake(&id).unwrap();
        registry.complete_handshake(&id);
        assert_eq!(registry.generation(&id), 2);
    }

    #[test]
    fn transform_requires_encrypted_session() {
        let registry = InMemorySessionRegistry::new();
        let id = session_id();
        let message = Message::new(id.local.clone(), "hello");
        assert!(registry.transform_outgoing(&id, &message).is_none());

        registry.complete_handshake(&id);
        let framed = registry.transform_outgoing(&id, &message).unwrap();
        assert_eq!(framed.body, hex::encode("hello"));
        assert_eq!(framed.id, message.id);

        registry.refuse_transforms(&id, true);
        assert!(registry.transform_outgoing(&id, &message).is_none());
    }

    #[test]
    fn token_exchange_enables_wake() {
        let registry = InMemorySessionRegistry::new();
        let id = session_id();
        assert!(registry.send_wake(&id).is_err());

        registry.complete_handshake(&id);
        registry.begin_whitelist_token_exchange(&id).unwrap();
        assert!(registry.can_send_wake(&id));
        assert_eq!(registry.whitelist_tokens(&id).len(), 2);

        registry.send_wake(&id).unwrap();
        assert_eq!(registry.snapshot(&id).wakes_sent, 1);
    }
}
