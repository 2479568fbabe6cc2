use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid address {address}: {reason}")]
    AddressFormat { address: String, reason: String },

    #[error("No open conversation with {0}")]
    UnknownConversation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn address(address: &str, reason: impl ToString) -> Self {
        Error::AddressFormat {
            address: address.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why a message could not be handed to, or was rejected by, the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The pairwise protocol declined to protect a message on a ready session.
    TransformFailed,
    /// The transport reported a delivery failure after handoff.
    TransportFailed,
    /// Error condition reported by the remote side, with its protocol code.
    Remote(i32),
}

/// Error details forwarded to a conversation listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub description: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}
