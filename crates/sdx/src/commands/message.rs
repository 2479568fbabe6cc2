use anyhow::{Context, Result};
use secure_dispatch::{Message, Participant};
use std::path::Path;

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::output::Output;

fn report_deliveries(dispatcher: &Dispatcher, output: &Output) {
    for message in dispatcher.drain_events() {
        output.event(
            "deliver",
            serde_json::json!({
                "id": message.id,
                "to": message.to.as_ref().map(|jid| jid.to_string()),
                "body": message.body,
                "outcome": message.outcome(),
            }),
        );
    }
}

pub fn send(to: &str, body: &str, config: &mut Config, data_dir: &Path, output: &Output) -> Result<()> {
    let dispatcher = Dispatcher::open(config, data_dir)?;
    let mut message = Message::new(dispatcher.local.clone(), body);
    let outcome = dispatcher.manager.send(to, &mut message)?;

    report_deliveries(&dispatcher, output);
    dispatcher.persist(config)?;

    if output.is_json() {
        output.success(
            "send",
            serde_json::json!({
                "id": message.id,
                "to": message.to.as_ref().map(|jid| jid.to_string()),
                "outcome": outcome,
                "queued": outcome.is_queued(),
            }),
        );
    } else {
        output.success_message("send", &format!("Message {} {}", message.id, outcome));
    }
    Ok(())
}

pub fn queue(to: Option<&str>, config: &Config, data_dir: &Path, output: &Output) -> Result<()> {
    let dispatcher = Dispatcher::open(config, data_dir)?;
    let keys = match to {
        Some(to) => vec![to.to_string()],
        None => dispatcher.manager.session_keys(),
    };

    let mut queued = Vec::new();
    for key in keys {
        for message in dispatcher.manager.queued(&key)? {
            queued.push(serde_json::json!({
                "conversation": key,
                "id": message.id,
                "body": message.body,
            }));
        }
    }

    output.success(
        "queue",
        serde_json::json!({
            "messages": queued,
        }),
    );
    Ok(())
}

pub fn retry(to: &str, config: &mut Config, data_dir: &Path, output: &Output) -> Result<()> {
    let dispatcher = Dispatcher::open(config, data_dir)?;
    let results = dispatcher.manager.retry_queued(to)?;

    report_deliveries(&dispatcher, output);
    dispatcher.persist(config)?;

    let still_queued = results.iter().filter(|(_, outcome)| outcome.is_queued()).count();
    output.success(
        "retry",
        serde_json::json!({
            "attempted": results.len(),
            "stillQueued": still_queued,
            "results": results
                .iter()
                .map(|(id, outcome)| serde_json::json!({ "id": id, "outcome": outcome }))
                .collect::<Vec<_>>(),
        }),
    );
    Ok(())
}

pub fn knock(to: &str, config: &Config, data_dir: &Path, output: &Output) -> Result<()> {
    let dispatcher = Dispatcher::open(config, data_dir)?;
    let session = dispatcher
        .manager
        .session(to)
        .with_context(|| format!("No contact or group '{}'", to))?;
    let woke = session.send_knock(&dispatcher.local)?;

    output.success(
        "knock",
        serde_json::json!({
            "to": session.conversation_key(),
            "woke": woke,
        }),
    );
    Ok(())
}

pub fn status(to: &str, config: &Config, data_dir: &Path, output: &Output) -> Result<()> {
    let dispatcher = Dispatcher::open(config, data_dir)?;
    let session = dispatcher
        .manager
        .session(to)
        .with_context(|| format!("No contact or group '{}'", to))?;
    let participant = session.participant();
    let queued = dispatcher.manager.queued(to)?.len();

    let data = match &participant {
        Participant::Group(group) => serde_json::json!({
            "conversation": session.conversation_key(),
            "kind": "group",
            "name": group.name,
            "queued": queued,
        }),
        Participant::Individual(contact) => {
            let id = dispatcher.session_id(&participant);
            let pairwise = id.as_ref().map(|id| dispatcher.registry.snapshot(id));
            let group_encryption = config
                .contact(&contact.address)
                .map(|entry| entry.group_encryption)
                .unwrap_or(false);
            serde_json::json!({
                "conversation": session.conversation_key(),
                "kind": "individual",
                "name": contact.name,
                "address": id.map(|id| id.remote.to_string()),
                "online": contact.presence.online,
                "pairwise": pairwise,
                "groupEncryption": group_encryption,
                "pushSent": session.push_sent(&dispatcher.local),
                "queued": queued,
            })
        }
    };

    output.success("status", data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContactEntry;
    use secure_dispatch::PairwiseSessionStatus;
    use tempfile::TempDir;

    fn setup(temp: &TempDir) -> Config {
        let mut config = Config::load(temp.path()).unwrap();
        config.set_account("alice@example.org/laptop").unwrap();
        let mut bob = ContactEntry::new("bob@example.org");
        bob.online = true;
        bob.presence_resource = Some("phone".to_string());
        config.upsert_contact(bob);
        config.save().unwrap();
        config
    }

    #[test]
    fn test_send_queues_until_session_is_encrypted() {
        let temp = TempDir::new().unwrap();
        let mut config = setup(&temp);
        let output = Output::new(true);

        send("bob@example.org", "hello", &mut config, temp.path(), &output).unwrap();
        assert_eq!(
            config.contact("bob@example.org").unwrap().status,
            PairwiseSessionStatus::Handshaking
        );

        config.contact_mut("bob@example.org").unwrap().status = PairwiseSessionStatus::Encrypted;
        config.save().unwrap();
        retry("bob@example.org", &mut config, temp.path(), &output).unwrap();

        let dispatcher = Dispatcher::open(&config, temp.path()).unwrap();
        assert!(dispatcher.manager.queued("bob@example.org").unwrap().is_empty());
        assert!(config.contact("bob@example.org").unwrap().wake_capable);
    }

    #[test]
    fn test_send_to_unknown_conversation_fails() {
        let temp = TempDir::new().unwrap();
        let mut config = setup(&temp);
        let output = Output::new(true);
        assert!(send("carol@example.org", "hi", &mut config, temp.path(), &output).is_err());
        assert!(knock("carol@example.org", &config, temp.path(), &output).is_err());
    }

    #[test]
    fn test_status_and_queue_for_group() {
        let temp = TempDir::new().unwrap();
        let mut config = setup(&temp);
        let output = Output::new(true);
        crate::commands::group::add("room@conference.example.org", None, &mut config, &output)
            .unwrap();

        send("room@conference.example.org", "hi all", &mut config, temp.path(), &output).unwrap();
        status("room@conference.example.org", &config, temp.path(), &output).unwrap();
        queue(None, &config, temp.path(), &output).unwrap();
    }
}
