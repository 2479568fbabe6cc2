//! Per-conversation secure message dispatcher.
//!
//! For every outgoing message a [`ChatSession`] decides whether it goes out
//! as a group broadcast, through group encryption, through the pairwise
//! encrypted session, or stays queued, and tags the message accordingly.

pub mod address;
pub mod capability;
pub mod chat_session;
pub mod chat_session_manager;
pub mod error;
pub mod file_storage;
pub mod message_queue;
pub mod notifier;
pub mod participant;
pub mod registry;
pub mod router;
pub mod storage;
pub mod transport;
pub mod types;

pub use address::{AddressResolver, ResolvedAddress};
pub use capability::{CapabilityOracle, GroupEncryptor, StaticCapabilities};
pub use chat_session::{ChatSession, MessageListener};
pub use chat_session_manager::{ChatSessionManager, DispatcherOptions, DEFAULT_QUEUE_PREFIX};
pub use error::{Error, ErrorInfo, ErrorKind, Result};
pub use file_storage::FileStorageAdapter;
pub use jid::Jid;
pub use message_queue::{MessageQueue, QueueEntry};
pub use notifier::{OfflineNotifier, PushMarker};
pub use participant::{ChatGroup, Contact, Participant, Presence};
pub use registry::{InMemorySessionRegistry, PairwiseSnapshot, SessionRegistry};
pub use router::{DispatchTarget, EncryptionRouter, RoutePath, Routed};
pub use storage::{InMemoryStorage, StorageAdapter};
pub use transport::{ChannelTransport, DispatchEvent, TransportSink};
pub use types::{
    DispatchPhase, EncryptionCapability, Message, OutcomeType, PairwiseSessionStatus, SessionId,
};
