use anyhow::Result;

use crate::config::Config;
use crate::output::Output;

pub fn login(address: &str, config: &mut Config, output: &Output) -> Result<()> {
    config.set_account(address)?;
    output.success(
        "login",
        serde_json::json!({
            "account": address,
        }),
    );
    Ok(())
}

pub fn whoami(config: &Config, output: &Output) -> Result<()> {
    let account = config.account_jid()?;
    output.success(
        "whoami",
        serde_json::json!({
            "account": account.to_string(),
            "contacts": config.contacts.len(),
            "groups": config.groups.len(),
        }),
    );
    Ok(())
}
