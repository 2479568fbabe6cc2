use crate::{
    participant::conversation_key, CapabilityOracle, ChatSession, EncryptionRouter, Error,
    ErrorInfo, GroupEncryptor, InMemoryStorage, Message, MessageQueue, OutcomeType, Participant,
    Result, SessionRegistry, StorageAdapter, TransportSink,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub const DEFAULT_QUEUE_PREFIX: &str = "v1/outgoing-queue/";

/// Collaborators shared by every conversation of one account.
pub struct DispatcherOptions {
    pub registry: Arc<dyn SessionRegistry>,
    pub oracle: Arc<dyn CapabilityOracle>,
    pub group_encryptor: Arc<dyn GroupEncryptor>,
    pub transport: Arc<dyn TransportSink>,
    pub storage: Option<Arc<dyn StorageAdapter>>,
    pub queue_prefix: Option<String>,
}

/// Owns the open conversations, keyed by bare participant address.
///
/// The map lock is only held for lookups; dispatches on different
/// conversations never contend.
pub struct ChatSessionManager {
    router: Arc<EncryptionRouter>,
    sessions: Mutex<HashMap<String, Arc<ChatSession>>>,
    queue: MessageQueue,
}

impl ChatSessionManager {
    pub fn new(opts: DispatcherOptions) -> Self {
        let router = Arc::new(EncryptionRouter::new(
            opts.registry,
            opts.oracle,
            opts.group_encryptor,
            opts.transport,
        ));
        let storage = opts
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryStorage::new()));
        let prefix = opts
            .queue_prefix
            .unwrap_or_else(|| DEFAULT_QUEUE_PREFIX.to_string());

        Self {
            router,
            sessions: Mutex::new(HashMap::new()),
            queue: MessageQueue::new(storage, prefix),
        }
    }

    pub fn router(&self) -> &Arc<EncryptionRouter> {
        &self.router
    }

    /// Returns the conversation with `participant`, creating it on first use.
    pub fn open_session(&self, participant: Participant) -> Arc<ChatSession> {
        let key = participant.conversation_key();
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .entry(key)
            .or_insert_with(|| {
                debug!(participant = participant.address(), "opening conversation");
                Arc::new(ChatSession::new(participant, self.router.clone()))
            })
            .clone()
    }

    pub fn session(&self, address: &str) -> Option<Arc<ChatSession>> {
        self.sessions
            .lock()
            .unwrap()
            .get(&conversation_key(address))
            .cloned()
    }

    /// Drops the conversation. Its queued messages stay until retried or
    /// discarded with [`discard_queued`](Self::discard_queued).
    pub fn close_session(&self, address: &str) -> Option<Arc<ChatSession>> {
        self.sessions
            .lock()
            .unwrap()
            .remove(&conversation_key(address))
    }

    pub fn session_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sessions.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn require_session(&self, address: &str) -> Result<Arc<ChatSession>> {
        self.session(address)
            .ok_or_else(|| Error::UnknownConversation(address.to_string()))
    }

    /// Dispatches on the conversation with `address`. A queued message is
    /// kept for [`retry_queued`](Self::retry_queued).
    pub fn send(&self, address: &str, message: &mut Message) -> Result<OutcomeType> {
        let session = self.require_session(address)?;
        self.dispatch_and_track(&session, message)
    }

    fn dispatch_and_track(&self, session: &ChatSession, message: &mut Message) -> Result<OutcomeType> {
        let key = session.conversation_key();
        let outcome = session.send(message)?;
        if outcome.is_queued() {
            self.queue.add(&key, message)?;
        } else {
            self.queue.remove(&MessageQueue::entry_id(&key, &message.id))?;
        }
        Ok(outcome)
    }

    /// Re-dispatches every queued message of the conversation, oldest first.
    /// Messages that leave the queued state are dropped from the queue.
    pub fn retry_queued(&self, address: &str) -> Result<Vec<(String, OutcomeType)>> {
        let session = self.require_session(address)?;
        let entries = self.queue.get_for_target(&session.conversation_key())?;

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut message = entry.message;
            let outcome = self.dispatch_and_track(&session, &mut message)?;
            results.push((message.id.clone(), outcome));
        }
        Ok(results)
    }

    pub fn queued(&self, address: &str) -> Result<Vec<Message>> {
        Ok(self
            .queue
            .get_for_target(&conversation_key(address))?
            .into_iter()
            .map(|entry| entry.message)
            .collect())
    }

    pub fn discard_queued(&self, address: &str) -> Result<()> {
        self.queue.remove_for_target(&conversation_key(address))
    }

    /// Routes an inbound message to the conversation with its sender.
    pub fn on_incoming_message(&self, message: &Message) -> bool {
        match self.session(&message.from.to_string()) {
            Some(session) => session.on_receive_message(message),
            None => {
                debug!(from = %message.from, "message for unknown conversation ignored");
                false
            }
        }
    }

    pub fn on_message_receipt(&self, address: &str, message_id: &str) {
        if let Some(session) = self.session(address) {
            session.on_message_receipt(message_id);
        }
    }

    pub fn on_send_message_error(&self, address: &str, message: &Message, error: &ErrorInfo) {
        if let Some(session) = self.session(address) {
            session.on_send_message_error(message, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatGroup, Contact, InMemorySessionRegistry, StaticCapabilities};

    struct NoGroup;

    impl GroupEncryptor for NoGroup {
        fn encrypt_and_deliver(&self, _message: &Message) -> OutcomeType {
            OutcomeType::Queued
        }
    }

    struct Discard;

    impl TransportSink for Discard {
        fn deliver(&self, _message: Message) {}
    }

    fn manager() -> ChatSessionManager {
        ChatSessionManager::new(DispatcherOptions {
            registry: Arc::new(InMemorySessionRegistry::new()),
            oracle: Arc::new(StaticCapabilities::new()),
            group_encryptor: Arc::new(NoGroup),
            transport: Arc::new(Discard),
            storage: None,
            queue_prefix: Some("v1/test-queue/".to_string()),
        })
    }

    #[test]
    fn session_keys_are_sorted_bare_addresses() {
        let manager = manager();
        manager.open_session(Contact::new("zed@example.org/desk").into());
        manager.open_session(ChatGroup::new("room@conference.example.org").into());
        manager.open_session(Contact::new("amy@example.org").into());

        assert_eq!(
            manager.session_keys(),
            vec!["amy@example.org", "room@conference.example.org", "zed@example.org"]
        );
    }

    #[test]
    fn queued_for_unopened_conversation_is_empty() {
        let manager = manager();
        assert!(manager.queued("bob@example.org").unwrap().is_empty());
        manager.discard_queued("bob@example.org").unwrap();
    }
}
