use crate::{
    AddressResolver, DispatchPhase, DispatchTarget, EncryptionCapability, EncryptionRouter,
    ErrorInfo, ErrorKind, Message, OutcomeType, PairwiseSessionStatus, Participant, Presence,
    PushMarker, ResolvedAddress, Result, RoutePath, Routed, SessionId,
};
use jid::Jid;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Receives inbound events for one conversation.
pub trait MessageListener: Send + Sync {
    /// Returns whether the message was processed (e.g. decrypted and stored).
    fn on_incoming_message(&self, session: &ChatSession, message: &Message) -> bool;

    fn on_incoming_receipt(&self, _session: &ChatSession, _message_id: &str) {}

    fn on_message_postponed(&self, _session: &ChatSession, _message_id: &str) {}

    fn on_receipts_expected(&self, _session: &ChatSession, _expected: bool) {}

    fn on_send_message_error(&self, _session: &ChatSession, _message: &Message, _error: &ErrorInfo) {
    }
}

struct Conversation {
    participant: Participant,
    address: Option<ResolvedAddress>,
    capability: EncryptionCapability,
    phase: DispatchPhase,
    /// Set while a requested handshake has not been reported complete.
    handshake_pending: bool,
    subscribed: bool,
}

impl Conversation {
    /// Phase to rest in once an operation is over.
    fn settle(&mut self) {
        self.phase = if self.handshake_pending {
            DispatchPhase::AwaitingHandshake
        } else {
            DispatchPhase::Idle
        };
    }
}

/// A conversation with one participant, either a contact or a group.
///
/// Mutable state lives behind per-conversation locks that are released
/// before any collaborator is called.
pub struct ChatSession {
    state: Mutex<Conversation>,
    push: PushMarker,
    listener: Mutex<Option<Arc<dyn MessageListener>>>,
    router: Arc<EncryptionRouter>,
    resolver: AddressResolver,
}

impl ChatSession {
    pub fn new(participant: Participant, router: Arc<EncryptionRouter>) -> Self {
        Self {
            state: Mutex::new(Conversation {
                participant,
                address: None,
                capability: EncryptionCapability::Unknown,
                phase: DispatchPhase::Idle,
                handshake_pending: false,
                subscribed: true,
            }),
            push: PushMarker::new(),
            listener: Mutex::new(None),
            router,
            resolver: AddressResolver::new(),
        }
    }

    pub fn participant(&self) -> Participant {
        self.state.lock().unwrap().participant.clone()
    }

    pub fn conversation_key(&self) -> String {
        self.state.lock().unwrap().participant.conversation_key()
    }

    /// Last resolved address, which may still be bare.
    pub fn resolved_address(&self) -> Option<ResolvedAddress> {
        self.state.lock().unwrap().address.clone()
    }

    pub fn phase(&self) -> DispatchPhase {
        self.state.lock().unwrap().phase
    }

    pub fn capability(&self) -> EncryptionCapability {
        self.state.lock().unwrap().capability
    }

    /// Whether the peer was last seen supporting group encryption.
    pub fn is_encryption_capable(&self) -> bool {
        self.capability().is_supported()
    }

    pub fn is_subscribed(&self) -> bool {
        self.state.lock().unwrap().subscribed
    }

    pub fn set_subscribed(&self, subscribed: bool) {
        self.state.lock().unwrap().subscribed = subscribed;
    }

    pub fn set_message_listener(&self, listener: Option<Arc<dyn MessageListener>>) {
        *self.listener.lock().unwrap() = listener;
    }

    pub fn message_listener(&self) -> Option<Arc<dyn MessageListener>> {
        self.listener.lock().unwrap().clone()
    }

    /// Records new presence for an individual participant. A different
    /// resource invalidates the cached address.
    pub fn update_presence(&self, presence: Presence) {
        let mut state = self.state.lock().unwrap();
        let Conversation {
            participant,
            address,
            ..
        } = &mut *state;
        let Participant::Individual(contact) = participant else {
            return;
        };

        let resource_changed = presence.resource.is_some()
            && presence.resource != contact.presence.resource
            && contact.resource.is_none();
        contact.presence = presence;
        if resource_changed {
            *address = None;
        }
    }

    /// Whether the offline wake was already sent for the current pairwise
    /// session with the peer.
    pub fn push_sent(&self, local: &Jid) -> bool {
        let address = {
            let state = self.state.lock().unwrap();
            match &state.address {
                Some(address) => Ok(address.clone()),
                None => self.resolver.resolve(&state.participant),
            }
        };
        let Ok(address) = address else {
            return false;
        };
        let session = SessionId::new(local.clone(), address.jid().clone());
        let generation = self.router.registry().generation(&session);
        self.push.is_sent(&session, generation)
    }

    /// Pairwise session and generation the offline wake was sent for.
    pub fn push_claim(&self) -> Option<(SessionId, u64)> {
        self.push.claimed()
    }

    /// Seeds the offline wake mark saved by an earlier process.
    pub fn restore_push_claim(&self, session: SessionId, generation: u64) {
        self.push.restore(session, generation);
    }

    /// Dispatches `message` and returns the outcome written onto it.
    ///
    /// Only an unparseable participant address is an error; every other
    /// condition is expressed as the outcome.
    pub fn send(&self, message: &mut Message) -> Result<OutcomeType> {
        let address = self.ensure_address()?;

        let (online, capability, is_group) = {
            let mut state = self.state.lock().unwrap();
            state.phase = DispatchPhase::Dispatching;
            let online = match &state.participant {
                Participant::Individual(contact) => contact.presence.online,
                Participant::Group(_) => true,
            };
            (online, state.capability, state.participant.is_group())
        };

        let target = if is_group {
            DispatchTarget::Group { address: &address }
        } else {
            DispatchTarget::Individual {
                address: &address,
                online,
                capability,
                push: &self.push,
            }
        };

        let routed = self.router.dispatch(message, target);
        Ok(self.finish(message, routed))
    }

    /// Sends sideband data over the pairwise session. Groups have no
    /// pairwise session, so their messages stay queued.
    pub fn send_auxiliary_payload(
        &self,
        message: &mut Message,
        is_response: bool,
        payload: &[u8],
    ) -> Result<OutcomeType> {
        let Some(address) = self.pairwise_address(message)? else {
            return Ok(OutcomeType::Queued);
        };
        let routed = self
            .router
            .dispatch_auxiliary(message, &address, is_response, payload);
        Ok(self.finish(message, routed))
    }

    /// Offers push whitelist tokens to the peer.
    pub fn send_whitelist_tokens(
        &self,
        message: &mut Message,
        tokens: &[String],
    ) -> Result<OutcomeType> {
        let Some(address) = self.pairwise_address(message)? else {
            return Ok(OutcomeType::Queued);
        };
        let routed = self
            .router
            .dispatch_whitelist_tokens(message, &address, tokens);
        Ok(self.finish(message, routed))
    }

    /// Explicitly wakes the peer, regardless of earlier wakes.
    pub fn send_knock(&self, from: &Jid) -> Result<bool> {
        if self.state.lock().unwrap().participant.is_group() {
            return Ok(false);
        }
        let address = self.ensure_address()?;
        let session = SessionId::new(from.clone(), address.jid().clone());
        Ok(self.router.notifier().knock(&session))
    }

    /// Handshake progress reported by the pairwise session owner.
    pub fn on_session_status_changed(&self, status: PairwiseSessionStatus) {
        let mut state = self.state.lock().unwrap();
        if status == PairwiseSessionStatus::Encrypted && state.handshake_pending {
            state.handshake_pending = false;
            state.settle();
        }
    }

    pub fn on_receive_message(&self, message: &Message) -> bool {
        match self.message_listener() {
            Some(listener) => listener.on_incoming_message(self, message),
            None => false,
        }
    }

    pub fn on_message_receipt(&self, message_id: &str) {
        if let Some(listener) = self.message_listener() {
            listener.on_incoming_receipt(self, message_id);
        }
    }

    pub fn on_message_postponed(&self, message_id: &str) {
        if let Some(listener) = self.message_listener() {
            listener.on_message_postponed(self, message_id);
        }
    }

    pub fn on_receipts_expected(&self, expected: bool) {
        if let Some(listener) = self.message_listener() {
            listener.on_receipts_expected(self, expected);
        }
    }

    pub fn on_send_message_error(&self, message: &Message, error: &ErrorInfo) {
        if let Some(listener) = self.message_listener() {
            listener.on_send_message_error(self, message, error);
        }
    }

    /// Send errors reported by message id only. No history is kept here, so
    /// the error cannot be matched to a message.
    pub fn on_send_message_error_by_id(&self, message_id: &str, error: &ErrorInfo) {
        debug!(message_id, error = ?error.kind, "send error for unknown message dropped");
    }

    /// Returns the address to send to, re-resolving while it is bare. The
    /// phase is back at rest when this returns.
    fn ensure_address(&self) -> Result<ResolvedAddress> {
        let mut state = self.state.lock().unwrap();
        if let Some(address) = &state.address {
            if address.is_full() || state.participant.is_group() {
                return Ok(address.clone());
            }
        }

        state.phase = DispatchPhase::Resolving;
        let resolved = self.resolver.resolve(&state.participant);
        state.settle();
        match resolved {
            Ok(address) => {
                if address.is_bare() && !state.participant.is_group() {
                    debug!(address = %address, "no resource known, using provisional bare address");
                }
                state.address = Some(address.clone());
                Ok(address)
            }
            Err(e) => {
                warn!(error = %e, "failed to resolve participant address");
                Err(e)
            }
        }
    }

    fn pairwise_address(&self, message: &mut Message) -> Result<Option<ResolvedAddress>> {
        if self.state.lock().unwrap().participant.is_group() {
            debug!(message_id = %message.id, "no pairwise session with a group, sideband queued");
            message.set_outcome(OutcomeType::Queued);
            return Ok(None);
        }
        let address = self.ensure_address()?;
        self.set_phase(DispatchPhase::Dispatching);
        Ok(Some(address))
    }

    fn set_phase(&self, phase: DispatchPhase) {
        self.state.lock().unwrap().phase = phase;
    }

    fn finish(&self, message: &Message, routed: Routed) -> OutcomeType {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(observed) = routed.capability {
                state.capability = state.capability.merge(observed);
            }
            match routed.path {
                RoutePath::AwaitingHandshake => state.handshake_pending = true,
                RoutePath::Pairwise | RoutePath::GroupEncrypted | RoutePath::Broadcast => {
                    state.handshake_pending = false
                }
                RoutePath::Offline { .. } | RoutePath::TransformDeclined => {}
            }
            state.settle();
        }

        if routed.path == RoutePath::TransformDeclined {
            self.on_send_message_error(
                message,
                &ErrorInfo::new(
                    ErrorKind::TransformFailed,
                    "pairwise session declined to encrypt the message",
                ),
            );
        }

        routed.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Contact, InMemorySessionRegistry, StaticCapabilities, TransportSink};

    struct NoGroup;

    impl crate::GroupEncryptor for NoGroup {
        fn encrypt_and_deliver(&self, _message: &Message) -> OutcomeType {
            OutcomeType::Queued
        }
    }

    struct Discard;

    impl TransportSink for Discard {
        fn deliver(&self, _message: Message) {}
    }

    fn router() -> Arc<EncryptionRouter> {
        Arc::new(EncryptionRouter::new(
            Arc::new(InMemorySessionRegistry::new()),
            Arc::new(StaticCapabilities::new()),
            Arc::new(NoGroup),
            Arc::new(Discard),
        ))
    }

    #[test]
    fn bare_address_is_re_resolved_after_presence_arrives() {
        let session = ChatSession::new(Contact::new("bob@example.org").into(), router());
        let from: Jid = "alice@example.org/laptop".parse().unwrap();

        let mut message = Message::new(from.clone(), "one");
        session.send(&mut message).unwrap();
        assert!(session.resolved_address().unwrap().is_bare());

        session.update_presence(Presence::online("phone"));
        let mut message = Message::new(from, "two");
        session.send(&mut message).unwrap();
        assert_eq!(
            session.resolved_address().unwrap().to_string(),
            "bob@example.org/phone"
        );
        assert_eq!(message.to.unwrap().to_string(), "bob@example.org/phone");
    }

    #[test]
    fn new_presence_resource_replaces_cached_address() {
        let contact = Contact::new("bob@example.org").with_presence(Presence::online("phone"));
        let session = ChatSession::new(contact.into(), router());
        let mut message = Message::new("alice@example.org".parse().unwrap(), "hi");
        session.send(&mut message).unwrap();

        session.update_presence(Presence::online("tablet"));
        assert!(session.resolved_address().is_none());
    }

    #[test]
    fn unparseable_address_fails_but_session_stays_usable() {
        let session = ChatSession::new(Contact::new("bob@").into(), router());
        let mut message = Message::new("alice@example.org".parse().unwrap(), "hi");

        assert!(session.send(&mut message).is_err());
        assert_eq!(session.phase(), DispatchPhase::Idle);
        assert!(message.outcome().is_none());
    }

    #[test]
    fn subscribed_by_default() {
        let session = ChatSession::new(Contact::new("bob@example.org").into(), router());
        assert!(session.is_subscribed());
        session.set_subscribed(false);
        assert!(!session.is_subscribed());
    }

    #[test]
    fn receive_without_listener_is_not_processed() {
        let session = ChatSession::new(Contact::new("bob@example.org").into(), router());
        let message = Message::new("bob@example.org/phone".parse().unwrap(), "hi");
        assert!(!session.on_receive_message(&message));
        session.on_message_receipt("id");
        session.on_receipts_expected(true);
    }
}
