use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use secure_dispatch::participant::conversation_key;
use secure_dispatch::{
    AddressResolver, ChannelTransport, ChatSessionManager, DispatchEvent, DispatcherOptions,
    FileStorageAdapter, GroupEncryptor, InMemorySessionRegistry, Jid, Message, OutcomeType,
    Participant, SessionId, StaticCapabilities, StorageAdapter, TransportSink,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::{Config, ContactEntry, PushClaim};

/// Stand-in for the multi-device group encryption layer: hands the message
/// to the transport unchanged and reports it as encrypted.
struct LocalGroupEncryptor {
    transport: Arc<dyn TransportSink>,
}

impl GroupEncryptor for LocalGroupEncryptor {
    fn encrypt_and_deliver(&self, message: &Message) -> OutcomeType {
        self.transport.deliver(message.clone());
        OutcomeType::OutgoingEncrypted
    }
}

/// A dispatcher wired to the state recorded in the config, with queued
/// messages kept under the data directory.
pub struct Dispatcher {
    pub local: Jid,
    pub manager: ChatSessionManager,
    pub registry: Arc<InMemorySessionRegistry>,
    pub capabilities: StaticCapabilities,
    events: Receiver<DispatchEvent>,
    resolver: AddressResolver,
}

impl Dispatcher {
    pub fn open(config: &Config, data_dir: &Path) -> Result<Self> {
        let local = config.account_jid()?;
        let registry = Arc::new(InMemorySessionRegistry::new());
        let capabilities = StaticCapabilities::new();
        let (transport, events) = ChannelTransport::unbounded();
        let transport: Arc<dyn TransportSink> = Arc::new(transport);
        let storage: Arc<dyn StorageAdapter> = Arc::new(
            FileStorageAdapter::new(data_dir.join("queue"))
                .context("Failed to open queue storage")?,
        );

        let manager = ChatSessionManager::new(DispatcherOptions {
            registry: registry.clone(),
            oracle: Arc::new(capabilities.clone()),
            group_encryptor: Arc::new(LocalGroupEncryptor {
                transport: transport.clone(),
            }),
            transport,
            storage: Some(storage),
            queue_prefix: None,
        });

        let dispatcher = Self {
            local,
            manager,
            registry,
            capabilities,
            events,
            resolver: AddressResolver::new(),
        };

        for contact in &config.contacts {
            dispatcher.restore_contact(contact);
        }
        for group in &config.groups {
            dispatcher.manager.open_session(group.participant());
        }
        Ok(dispatcher)
    }

    fn restore_contact(&self, contact: &ContactEntry) {
        let participant = contact.participant();
        match self.session_id(&participant) {
            Some(id) => {
                self.registry.set_status(&id, contact.status);
                self.registry.set_verified(&id, contact.verified);
                self.registry.set_wake_capable(&id, contact.wake_capable);
            }
            None => debug!(address = %contact.address, "contact address does not resolve"),
        }
        if contact.group_encryption {
            if let Ok(bare) = conversation_key(&contact.address).parse::<Jid>() {
                self.capabilities.grant(&bare);
            }
        }
        let session = self.manager.open_session(participant);
        if let Some(claim) = &contact.push_sent {
            match claim.remote.parse::<Jid>() {
                Ok(remote) => {
                    let id = SessionId::new(self.local.clone(), remote);
                    session.restore_push_claim(id, claim.generation);
                }
                Err(e) => {
                    debug!(address = %contact.address, error = %e, "dropping unreadable wake mark")
                }
            }
        }
    }

    /// Pairwise session key for an individual participant, as the
    /// dispatcher would address it right now.
    pub fn session_id(&self, participant: &Participant) -> Option<SessionId> {
        if participant.is_group() {
            return None;
        }
        let address = self.resolver.resolve(participant).ok()?;
        Some(SessionId::new(self.local.clone(), address.jid().clone()))
    }

    /// Messages handed to the transport since the last call.
    pub fn drain_events(&self) -> Vec<Message> {
        self.events
            .try_iter()
            .map(|event| match event {
                DispatchEvent::Deliver(message) => message,
            })
            .collect()
    }

    /// Writes pairwise session progress and sent wakes back to the config.
    pub fn persist(&self, config: &mut Config) -> Result<()> {
        for contact in config.contacts.iter_mut() {
            let Some(id) = self.session_id(&contact.participant()) else {
                continue;
            };
            let snapshot = self.registry.snapshot(&id);
            if let Some(status) = snapshot.status {
                contact.status = status;
            }
            contact.verified = snapshot.verified;
            contact.wake_capable = snapshot.wake_capable;
            if let Some(session) = self.manager.session(&contact.address) {
                contact.push_sent = session.push_claim().map(|(id, generation)| PushClaim {
                    remote: id.remote.to_string(),
                    generation,
                });
            }
        }
        config.save()
    }
}
