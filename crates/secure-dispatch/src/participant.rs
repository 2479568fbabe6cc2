use jid::Jid;
use serde::{Deserialize, Serialize};

/// Best-known presence of a contact, as reported by the roster layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub online: bool,
    /// Resource of the most available connected client, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl Presence {
    pub fn online(resource: impl Into<String>) -> Self {
        Self {
            online: true,
            resource: Some(resource.into()),
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Resource pinned on the contact's address, preferred over presence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default)]
    pub presence: Presence,
}

impl Contact {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            resource: None,
            presence: Presence::default(),
        }
    }

    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatGroup {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatGroup {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }
}

/// The other side of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Participant {
    Individual(Contact),
    Group(ChatGroup),
}

impl Participant {
    pub fn address(&self) -> &str {
        match self {
            Participant::Individual(contact) => &contact.address,
            Participant::Group(group) => &group.address,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Participant::Individual(contact) => contact.name.as_deref(),
            Participant::Group(group) => group.name.as_deref(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Participant::Group(_))
    }

    /// Normalized bare address identifying the conversation.
    pub fn conversation_key(&self) -> String {
        conversation_key(self.address())
    }
}

impl From<Contact> for Participant {
    fn from(contact: Contact) -> Self {
        Participant::Individual(contact)
    }
}

impl From<ChatGroup> for Participant {
    fn from(group: ChatGroup) -> Self {
        Participant::Group(group)
    }
}

/// Bare, normalized form of `address`; unparseable input is returned trimmed.
pub fn conversation_key(address: &str) -> String {
    match address.trim().parse::<Jid>() {
        Ok(jid) => jid.to_bare().to_string(),
        Err(_) => address.trim().to_string(),
    }
}
