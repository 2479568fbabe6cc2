use crate::{
    CapabilityOracle, EncryptionCapability, GroupEncryptor, Message, OfflineNotifier,
    OutcomeType, PairwiseSessionStatus, PushMarker, ResolvedAddress, SessionId, SessionRegistry,
    TransportSink,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// The recipient of one dispatch attempt, with the facts the router needs.
pub enum DispatchTarget<'a> {
    Group {
        address: &'a ResolvedAddress,
    },
    Individual {
        address: &'a ResolvedAddress,
        online: bool,
        capability: EncryptionCapability,
        push: &'a PushMarker,
    },
}

/// Which branch of the decision table handled a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePath {
    /// Group participant, sent as is.
    Broadcast,
    /// Handed to the group encryption collaborator.
    GroupEncrypted,
    /// Protected by the pairwise session and delivered.
    Pairwise,
    /// Peer offline; `woke` tells whether a wake signal went out.
    Offline { woke: bool },
    /// No encrypted pairwise session yet.
    AwaitingHandshake,
    /// Session looked ready but the protocol refused the message.
    TransformDeclined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Routed {
    pub outcome: OutcomeType,
    pub path: RoutePath,
    /// Capability verdict observed on this attempt, if the oracle was consulted.
    pub capability: Option<EncryptionCapability>,
}

impl Routed {
    fn new(outcome: OutcomeType, path: RoutePath) -> Self {
        Self {
            outcome,
            path,
            capability: None,
        }
    }

    fn with_capability(mut self, capability: EncryptionCapability) -> Self {
        self.capability = Some(capability);
        self
    }
}

/// Sideband content carried over an established pairwise session.
enum Sideband<'a> {
    None,
    Payload { is_response: bool, data: &'a [u8] },
    WhitelistTokens(&'a [String]),
}

/// Picks exactly one protection path per message and tags it.
pub struct EncryptionRouter {
    registry: Arc<dyn SessionRegistry>,
    oracle: Arc<dyn CapabilityOracle>,
    group: Arc<dyn GroupEncryptor>,
    transport: Arc<dyn TransportSink>,
    notifier: OfflineNotifier,
}

impl EncryptionRouter {
    pub fn new(
        registry: Arc<dyn SessionRegistry>,
        oracle: Arc<dyn CapabilityOracle>,
        group: Arc<dyn GroupEncryptor>,
        transport: Arc<dyn TransportSink>,
    ) -> Self {
        let notifier = OfflineNotifier::new(registry.clone());
        Self {
            registry,
            oracle,
            group,
            transport,
            notifier,
        }
    }

    pub fn notifier(&self) -> &OfflineNotifier {
        &self.notifier
    }

    pub fn registry(&self) -> &Arc<dyn SessionRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<dyn TransportSink> {
        &self.transport
    }

    /// Runs the decision table for one attempt and writes the outcome onto
    /// `message`.
    pub fn dispatch(&self, message: &mut Message, target: DispatchTarget<'_>) -> Routed {
        match target {
            DispatchTarget::Group { address } => {
                message.to = Some(address.jid().clone());
                message.set_outcome(OutcomeType::Outgoing);
                self.transport.deliver(message.clone());
                Routed::new(OutcomeType::Outgoing, RoutePath::Broadcast)
            }
            DispatchTarget::Individual {
                address,
                online,
                capability,
                push,
            } => {
                let session = SessionId::new(message.from.clone(), address.jid().clone());
                message.to = Some(address.jid().clone());

                if !online {
                    let woke = self.notifier.notify_if_offline(&session, push);
                    message.set_outcome(OutcomeType::Queued);
                    return Routed::new(OutcomeType::Queued, RoutePath::Offline { woke });
                }

                let capability = self.refresh_capability(capability, address);
                if capability.is_supported() {
                    let outcome = self.group.encrypt_and_deliver(message);
                    message.set_outcome(outcome);
                    debug!(to = %address, %outcome, "sent with group encryption");
                    return Routed::new(outcome, RoutePath::GroupEncrypted)
                        .with_capability(capability);
                }

                self.send_pairwise(message, &session, Sideband::None)
                    .with_capability(capability)
            }
        }
    }

    /// Sends sideband data over the pairwise session only (no group path).
    pub fn dispatch_auxiliary(
        &self,
        message: &mut Message,
        address: &ResolvedAddress,
        is_response: bool,
        payload: &[u8],
    ) -> Routed {
        let session = SessionId::new(message.from.clone(), address.jid().clone());
        message.to = Some(address.jid().clone());
        self.send_pairwise(
            message,
            &session,
            Sideband::Payload {
                is_response,
                data: payload,
            },
        )
    }

    /// Offers push whitelist tokens to the peer over the pairwise session.
    pub fn dispatch_whitelist_tokens(
        &self,
        message: &mut Message,
        address: &ResolvedAddress,
        tokens: &[String],
    ) -> Routed {
        let session = SessionId::new(message.from.clone(), address.jid().clone());
        message.to = Some(address.jid().clone());
        self.send_pairwise(message, &session, Sideband::WhitelistTokens(tokens))
    }

    /// A cached `Supported` verdict is final; anything else is asked again.
    fn refresh_capability(
        &self,
        cached: EncryptionCapability,
        address: &ResolvedAddress,
    ) -> EncryptionCapability {
        if cached.is_supported() {
            return cached;
        }
        EncryptionCapability::from_verdict(self.oracle.supports_group_encryption(address.jid()))
    }

    fn send_pairwise(
        &self,
        message: &mut Message,
        session: &SessionId,
        sideband: Sideband<'_>,
    ) -> Routed {
        match self.registry.status_of(session) {
            PairwiseSessionStatus::Encrypted => {
                if matches!(sideband, Sideband::None) {
                    self.notifier.maybe_begin_token_exchange(session);
                }

                let outcome = if self.registry.is_verified(session) {
                    OutcomeType::OutgoingEncryptedVerified
                } else {
                    OutcomeType::OutgoingEncrypted
                };

                let transformed = match sideband {
                    Sideband::None => self.registry.transform_outgoing(session, message),
                    Sideband::Payload { is_response, data } => self
                        .registry
                        .transform_outgoing_with_payload(session, message, is_response, data),
                    Sideband::WhitelistTokens(tokens) => {
                        self.registry.transform_whitelist_tokens(session, message, tokens)
                    }
                };

                match transformed {
                    Some(transformed) => {
                        *message = transformed;
                        message.set_outcome(outcome);
                        self.transport.deliver(message.clone());
                        Routed::new(outcome, RoutePath::Pairwise)
                    }
                    None => {
                        warn!(session = %session, "pairwise session refused outgoing message");
                        message.set_outcome(OutcomeType::Queued);
                        Routed::new(OutcomeType::Queued, RoutePath::TransformDeclined)
                    }
                }
            }
            PairwiseSessionStatus::Handshaking => {
                debug!(session = %session, "handshake in progress, message queued");
                message.set_outcome(OutcomeType::Queued);
                Routed::new(OutcomeType::Queued, RoutePath::AwaitingHandshake)
            }
            PairwiseSessionStatus::Plaintext => {
                if let Err(e) = self.registry.begin_handshake(session) {
                    warn!(session = %session, error = %e, "failed to start handshake");
                } else {
                    debug!(session = %session, "started pairwise handshake, message queued");
                }
                message.set_outcome(OutcomeType::Queued);
                Routed::new(OutcomeType::Queued, RoutePath::AwaitingHandshake)
            }
        }
    }
}
