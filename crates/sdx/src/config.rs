use anyhow::{Context, Result};
use secure_dispatch::participant::conversation_key;
use secure_dispatch::{ChatGroup, Contact, Jid, PairwiseSessionStatus, Participant, Presence};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Local account address (full or bare JID)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    #[serde(default)]
    pub contacts: Vec<ContactEntry>,

    #[serde(default)]
    pub groups: Vec<GroupEntry>,

    /// Path to the config file
    #[serde(skip)]
    pub path: PathBuf,
}

/// A contact together with the simulated state of its peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactEntry {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Resource pinned on the contact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_resource: Option<String>,
    #[serde(default = "default_status")]
    pub status: PairwiseSessionStatus,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub wake_capable: bool,
    #[serde(default)]
    pub group_encryption: bool,
    /// Pairwise session the offline wake already went to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_sent: Option<PushClaim>,
}

/// A sent offline wake, recorded against the remote address and the
/// pairwise session generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushClaim {
    pub remote: String,
    pub generation: u64,
}

fn default_status() -> PairwiseSessionStatus {
    PairwiseSessionStatus::Plaintext
}

impl ContactEntry {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            name: None,
            resource: None,
            online: false,
            presence_resource: None,
            status: default_status(),
            verified: false,
            wake_capable: false,
            group_encryption: false,
            push_sent: None,
        }
    }

    pub fn participant(&self) -> Participant {
        let presence = Presence {
            online: self.online,
            resource: self.presence_resource.clone(),
        };
        let mut contact = Contact::new(&self.address).with_presence(presence);
        contact.name = self.name.clone();
        contact.resource = self.resource.clone();
        contact.into()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupEntry {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl GroupEntry {
    pub fn participant(&self) -> Participant {
        let mut group = ChatGroup::new(&self.address);
        group.name = self.name.clone();
        group.into()
    }
}

impl Config {
    /// Load config from the data directory
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join("config.json");

        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            config.path = config_path;
            Ok(config)
        } else {
            Ok(Config {
                path: config_path,
                ..Default::default()
            })
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&self.path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn set_account(&mut self, address: &str) -> Result<()> {
        address
            .parse::<Jid>()
            .with_context(|| format!("Invalid account address: {}", address))?;
        self.account = Some(address.to_string());
        self.save()
    }

    pub fn account_jid(&self) -> Result<Jid> {
        let account = self
            .account
            .as_ref()
            .context("No account configured, run `sdx login <jid>` first")?;
        account
            .parse::<Jid>()
            .with_context(|| format!("Invalid account address: {}", account))
    }

    pub fn contact(&self, address: &str) -> Option<&ContactEntry> {
        let key = conversation_key(address);
        self.contacts
            .iter()
            .find(|c| conversation_key(&c.address) == key)
    }

    pub fn contact_mut(&mut self, address: &str) -> Option<&mut ContactEntry> {
        let key = conversation_key(address);
        self.contacts
            .iter_mut()
            .find(|c| conversation_key(&c.address) == key)
    }

    /// Adds the contact, or replaces the one with the same bare address.
    pub fn upsert_contact(&mut self, entry: ContactEntry) {
        match self.contact_mut(&entry.address) {
            Some(existing) => *existing = entry,
            None => self.contacts.push(entry),
        }
    }

    pub fn upsert_group(&mut self, entry: GroupEntry) {
        let key = conversation_key(&entry.address);
        match self
            .groups
            .iter_mut()
            .find(|g| conversation_key(&g.address) == key)
        {
            Some(existing) => *existing = entry,
            None => self.groups.push(entry),
        }
    }

    /// Every configured conversation partner.
    pub fn participants(&self) -> Vec<Participant> {
        self.contacts
            .iter()
            .map(ContactEntry::participant)
            .chain(self.groups.iter().map(GroupEntry::participant))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_load_nonexistent() {
        let temp = TempDir::new().unwrap();
        let config = Config::load(temp.path()).unwrap();
        assert!(config.account.is_none());
        assert!(config.contacts.is_empty());
        assert!(config.account_jid().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::load(temp.path()).unwrap();
        config.set_account("alice@example.org/laptop").unwrap();

        let mut bob = ContactEntry::new("bob@example.org");
        bob.online = true;
        bob.presence_resource = Some("phone".to_string());
        bob.status = PairwiseSessionStatus::Encrypted;
        config.upsert_contact(bob.clone());
        config.upsert_group(GroupEntry {
            address: "room@conference.example.org".to_string(),
            name: None,
        });
        config.save().unwrap();

        let loaded = Config::load(temp.path()).unwrap();
        assert_eq!(
            loaded.account_jid().unwrap().to_string(),
            "alice@example.org/laptop"
        );
        assert_eq!(loaded.contacts, vec![bob]);
        assert_eq!(loaded.participants().len(), 2);
    }

    #[test]
    fn test_invalid_account_is_rejected() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::load(temp.path()).unwrap();
        assert!(config.set_account("alice@").is_err());
        assert!(config.account.is_none());
    }

    #[test]
    fn test_contact_lookup_ignores_resource() {
        let mut config = Config::default();
        config.upsert_contact(ContactEntry::new("bob@example.org"));

        let mut replaced = ContactEntry::new("bob@example.org/phone");
        replaced.verified = true;
        config.upsert_contact(replaced);

        assert_eq!(config.contacts.len(), 1);
        assert!(config.contact("bob@example.org/tablet").unwrap().verified);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"contacts":[{"address":"bob@example.org"}]}"#).unwrap();
        let bob = &config.contacts[0];
        assert_eq!(bob.status, PairwiseSessionStatus::Plaintext);
        assert!(!bob.online);
        assert!(config.groups.is_empty());
    }
}
