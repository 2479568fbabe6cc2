use crate::{Message, OutcomeType};
use jid::Jid;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Answers whether an address can receive group-encrypted messages.
///
/// Verdicts may be stale and calls may block; callers must not hold a
/// conversation lock while asking.
pub trait CapabilityOracle: Send + Sync {
    fn supports_group_encryption(&self, address: &Jid) -> bool;
}

/// Encrypts a message for every device of the recipient and delivers it.
pub trait GroupEncryptor: Send + Sync {
    /// Returns the outcome to record on the message.
    fn encrypt_and_deliver(&self, message: &Message) -> OutcomeType;
}

/// In-memory oracle backed by an explicit set of capable addresses.
#[derive(Clone, Default)]
pub struct StaticCapabilities {
    supported: Arc<Mutex<HashSet<String>>>,
    queries: Arc<AtomicUsize>,
}

impl StaticCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, address: &Jid) {
        self.supported.lock().unwrap().insert(address.to_string());
    }

    pub fn revoke(&self, address: &Jid) {
        self.supported.lock().unwrap().remove(&address.to_string());
    }

    /// Number of times the oracle has been asked.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl CapabilityOracle for StaticCapabilities {
    fn supports_group_encryption(&self, address: &Jid) -> bool {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let supported = self.supported.lock().unwrap();
        supported.contains(&address.to_string()) || supported.contains(&address.to_bare().to_string())
    }
}
