use anyhow::{Context, Result};
use secure_dispatch::{Jid, PairwiseSessionStatus};

use crate::config::{Config, ContactEntry};
use crate::output::Output;

pub fn add(
    address: &str,
    name: Option<String>,
    resource: Option<String>,
    config: &mut Config,
    output: &Output,
) -> Result<()> {
    address
        .parse::<Jid>()
        .with_context(|| format!("Invalid contact address: {}", address))?;

    // Keep simulated peer state when re-adding a known contact.
    let mut entry = config
        .contact(address)
        .cloned()
        .unwrap_or_else(|| ContactEntry::new(address));
    entry.address = address.to_string();
    entry.name = name;
    entry.resource = resource;
    config.upsert_contact(entry.clone());
    config.save()?;

    output.success("contact_add", entry);
    Ok(())
}

pub fn list(config: &Config, output: &Output) -> Result<()> {
    output.success(
        "contact_list",
        serde_json::json!({
            "contacts": config.contacts,
        }),
    );
    Ok(())
}

pub fn presence(
    address: &str,
    offline: bool,
    resource: Option<String>,
    config: &mut Config,
    output: &Output,
) -> Result<()> {
    let contact = config
        .contact_mut(address)
        .with_context(|| format!("Contact '{}' not found", address))?;
    contact.online = !offline;
    if resource.is_some() || offline {
        contact.presence_resource = resource;
    }
    let contact = contact.clone();
    config.save()?;

    output.success(
        "contact_presence",
        serde_json::json!({
            "address": contact.address,
            "online": contact.online,
            "resource": contact.presence_resource,
        }),
    );
    Ok(())
}

/// Overrides of the simulated pairwise and capability state of a contact.
#[derive(Debug, Default)]
pub struct SessionUpdate {
    pub status: Option<String>,
    pub verified: Option<bool>,
    pub wake_capable: Option<bool>,
    pub group_encryption: Option<bool>,
}

pub fn session(
    address: &str,
    update: SessionUpdate,
    config: &mut Config,
    output: &Output,
) -> Result<()> {
    let status = update.status.as_deref().map(parse_status).transpose()?;
    let contact = config
        .contact_mut(address)
        .with_context(|| format!("Contact '{}' not found", address))?;

    if let Some(status) = status {
        // A new pairwise session may be woken again.
        if status != contact.status {
            contact.push_sent = None;
        }
        contact.status = status;
    }
    if let Some(verified) = update.verified {
        contact.verified = verified;
    }
    if let Some(wake_capable) = update.wake_capable {
        contact.wake_capable = wake_capable;
    }
    if let Some(group_encryption) = update.group_encryption {
        contact.group_encryption = group_encryption;
    }
    let contact = contact.clone();
    config.save()?;

    output.success("contact_session", contact);
    Ok(())
}

fn parse_status(value: &str) -> Result<PairwiseSessionStatus> {
    match value.to_ascii_lowercase().as_str() {
        "plaintext" => Ok(PairwiseSessionStatus::Plaintext),
        "handshaking" => Ok(PairwiseSessionStatus::Handshaking),
        "encrypted" => Ok(PairwiseSessionStatus::Encrypted),
        other => anyhow::bail!(
            "Invalid session status '{}': expected plaintext, handshaking or encrypted",
            other
        ),
    }
}
