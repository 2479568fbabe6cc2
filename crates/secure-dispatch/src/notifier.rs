use crate::{SessionId, SessionRegistry};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// At-most-once marker for the offline wake signal of one conversation.
///
/// The mark names the pairwise session and its generation, so a fresh
/// handshake or a different remote resource clears it.
#[derive(Debug, Default)]
pub struct PushMarker {
    sent: Mutex<Option<(SessionId, u64)>>,
}

impl PushMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_sent(&self, session: &SessionId, generation: u64) -> bool {
        holds(&self.sent.lock().unwrap(), session, generation)
    }

    /// Claims the wake for `session` at `generation`. False if already claimed.
    pub fn try_claim(&self, session: &SessionId, generation: u64) -> bool {
        let mut sent = self.sent.lock().unwrap();
        if holds(&sent, session, generation) {
            return false;
        }
        *sent = Some((session.clone(), generation));
        true
    }

    /// Gives back a claim whose wake was not sent.
    pub fn release(&self, session: &SessionId, generation: u64) {
        let mut sent = self.sent.lock().unwrap();
        if holds(&sent, session, generation) {
            *sent = None;
        }
    }

    /// The session and generation the wake was last sent for.
    pub fn claimed(&self) -> Option<(SessionId, u64)> {
        self.sent.lock().unwrap().clone()
    }

    /// Seeds a claim recorded by an earlier process.
    pub fn restore(&self, session: SessionId, generation: u64) {
        *self.sent.lock().unwrap() = Some((session, generation));
    }
}

fn holds(sent: &Option<(SessionId, u64)>, session: &SessionId, generation: u64) -> bool {
    matches!(sent, Some((id, g)) if id == session && *g == generation)
}

/// Best-effort wake signalling for offline peers.
#[derive(Clone)]
pub struct OfflineNotifier {
    registry: Arc<dyn SessionRegistry>,
}

impl OfflineNotifier {
    pub fn new(registry: Arc<dyn SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Sends a wake once per pairwise session generation. Returns whether a
    /// wake went out on this call.
    pub fn notify_if_offline(&self, session: &SessionId, marker: &PushMarker) -> bool {
        let generation = self.registry.generation(session);
        if !marker.try_claim(session, generation) {
            debug!(session = %session, generation, "wake already sent for this session");
            return false;
        }

        if !self.registry.can_send_wake(session) {
            debug!(session = %session, "peer has no wake tokens, skipping wake");
            marker.release(session, generation);
            return false;
        }

        match self.registry.send_wake(session) {
            Ok(()) => {
                debug!(session = %session, generation, "wake sent to offline peer");
                true
            }
            Err(e) => {
                warn!(session = %session, error = %e, "failed to send wake");
                marker.release(session, generation);
                false
            }
        }
    }

    /// Unsuppressed wake, for an explicit user request.
    pub fn knock(&self, session: &SessionId) -> bool {
        if !self.registry.can_send_wake(session) {
            return false;
        }
        match self.registry.send_wake(session) {
            Ok(()) => true,
            Err(e) => {
                warn!(session = %session, error = %e, "failed to send knock");
                false
            }
        }
    }

    /// Starts the wake token exchange if it has not happened on this session.
    /// Failures are logged and otherwise ignored.
    pub fn maybe_begin_token_exchange(&self, session: &SessionId) {
        if self.registry.can_send_wake(session) {
            return;
        }
        match self.registry.begin_whitelist_token_exchange(session) {
            Ok(()) => debug!(session = %session, "started wake token exchange"),
            Err(e) => warn!(session = %session, error = %e, "wake token exchange failed"),
        }
    }
}
