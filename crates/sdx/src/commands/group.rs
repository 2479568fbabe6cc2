use anyhow::{Context, Result};
use secure_dispatch::Jid;

use crate::config::{Config, GroupEntry};
use crate::output::Output;

pub fn add(address: &str, name: Option<String>, config: &mut Config, output: &Output) -> Result<()> {
    let jid: Jid = address
        .parse()
        .with_context(|| format!("Invalid group address: {}", address))?;
    let address = jid.to_bare().to_string();

    config.upsert_group(GroupEntry {
        address: address.clone(),
        name: name.clone(),
    });
    config.save()?;

    output.success(
        "group_add",
        serde_json::json!({
            "address": address,
            "name": name,
        }),
    );
    Ok(())
}

pub fn list(config: &Config, output: &Output) -> Result<()> {
    output.success(
        "group_list",
        serde_json::json!({
            "groups": config.groups,
        }),
    );
    Ok(())
}
