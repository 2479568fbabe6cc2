#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;
use secure_dispatch::{
    ChannelTransport, ChatSession, ChatSessionManager, Contact, DispatchEvent, DispatcherOptions,
    ErrorInfo, GroupEncryptor, InMemorySessionRegistry, Jid, Message, MessageListener,
    OutcomeType, Presence, SessionId, StaticCapabilities,
};

pub fn alice() -> Jid {
    "alice@example.org/laptop".parse().unwrap()
}

pub fn bob_phone() -> Jid {
    "bob@example.org/phone".parse().unwrap()
}

pub fn bob_session() -> SessionId {
    SessionId::new(alice(), bob_phone())
}

pub fn bob_online() -> Contact {
    Contact::new("bob@example.org").with_presence(Presence::online("phone"))
}

pub fn bob_offline() -> Contact {
    Contact::new("bob@example.org")
        .with_resource("phone")
        .with_presence(Presence::offline())
}

/// Group encryptor that records what it was handed.
#[derive(Default)]
pub struct RecordingGroupEncryptor {
    pub sent: Mutex<Vec<Message>>,
}

impl GroupEncryptor for RecordingGroupEncryptor {
    fn encrypt_and_deliver(&self, message: &Message) -> OutcomeType {
        self.sent.lock().unwrap().push(message.clone());
        OutcomeType::OutgoingEncrypted
    }
}

#[derive(Default)]
pub struct RecordingListener {
    pub accept: bool,
    pub incoming: Mutex<Vec<String>>,
    pub receipts: Mutex<Vec<String>>,
    pub postponed: Mutex<Vec<String>>,
    pub receipts_expected: Mutex<Vec<bool>>,
    pub errors: Mutex<Vec<(String, ErrorInfo)>>,
}

impl RecordingListener {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            ..Default::default()
        }
    }
}

impl MessageListener for RecordingListener {
    fn on_incoming_message(&self, _session: &ChatSession, message: &Message) -> bool {
        self.incoming.lock().unwrap().push(message.body.clone());
        self.accept
    }

    fn on_incoming_receipt(&self, _session: &ChatSession, message_id: &str) {
        self.receipts.lock().unwrap().push(message_id.to_string());
    }

    fn on_message_postponed(&self, _session: &ChatSession, message_id: &str) {
        self.postponed.lock().unwrap().push(message_id.to_string());
    }

    fn on_receipts_expected(&self, _session: &ChatSession, expected: bool) {
        self.receipts_expected.lock().unwrap().push(expected);
    }

    fn on_send_message_error(&self, _session: &ChatSession, message: &Message, error: &ErrorInfo) {
        self.errors
            .lock()
            .unwrap()
            .push((message.id.clone(), error.clone()));
    }
}

pub struct Harness {
    pub registry: Arc<InMemorySessionRegistry>,
    pub caps: StaticCapabilities,
    pub group: Arc<RecordingGroupEncryptor>,
    pub rx: Receiver<DispatchEvent>,
    pub manager: ChatSessionManager,
}

impl Harness {
    pub fn new() -> Self {
        let registry = Arc::new(InMemorySessionRegistry::new());
        let caps = StaticCapabilities::new();
        let group = Arc::new(RecordingGroupEncryptor::default());
        let (transport, rx) = ChannelTransport::unbounded();

        let manager = ChatSessionManager::new(DispatcherOptions {
            registry: registry.clone(),
            oracle: Arc::new(caps.clone()),
            group_encryptor: group.clone(),
            transport: Arc::new(transport),
            storage: None,
            queue_prefix: None,
        });

        Self {
            registry,
            caps,
            group,
            rx,
            manager,
        }
    }

    /// Messages handed to the transport since the last call.
    pub fn delivered(&self) -> Vec<Message> {
        self.rx
            .try_iter()
            .map(|event| match event {
                DispatchEvent::Deliver(message) => message,
            })
            .collect()
    }

    pub fn group_sent(&self) -> usize {
        self.group.sent.lock().unwrap().len()
    }
}
