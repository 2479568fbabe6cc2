use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod dispatcher;
mod output;

use commands::contact::SessionUpdate;
use output::Output;

#[derive(Parser)]
#[command(name = "sdx")]
#[command(version)]
#[command(about = "Dispatch messages through pairwise and group encrypted conversations")]
#[command(long_about = "A command-line front end for the secure dispatcher.\n\nContacts, presence and pairwise session states are simulated locally; queued messages persist between runs.")]
struct Cli {
    /// Output in JSON format (for agents/scripts)
    #[arg(short, long, global = true)]
    json: bool,

    /// Data directory (default: platform data dir/sdx)
    #[arg(long, global = true, env = "SDX_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set the local account address
    Login {
        /// Account JID, e.g. alice@example.org/laptop
        address: String,
    },

    /// Show the local account
    Whoami,

    /// Contact management
    #[command(subcommand)]
    Contact(ContactCommands),

    /// Group management
    #[command(subcommand)]
    Group(GroupCommands),

    /// Send a message
    Send {
        /// Contact or group address
        to: String,
        /// Message body
        body: String,
    },

    /// List queued messages
    Queue {
        /// Only this conversation
        to: Option<String>,
    },

    /// Re-dispatch queued messages of a conversation
    Retry {
        /// Contact or group address
        to: String,
    },

    /// Wake an offline contact
    Knock {
        /// Contact address
        to: String,
    },

    /// Show the dispatch state of a conversation
    Status {
        /// Contact or group address
        to: String,
    },
}

#[derive(Subcommand)]
enum ContactCommands {
    /// Add or update a contact
    Add {
        /// Contact JID
        address: String,
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
        /// Resource to always address
        #[arg(short, long)]
        resource: Option<String>,
    },

    /// List contacts
    List,

    /// Record presence for a contact
    Presence {
        /// Contact JID
        address: String,
        /// Resource of the connected client
        #[arg(short, long)]
        resource: Option<String>,
        /// Mark the contact offline
        #[arg(long)]
        offline: bool,
    },

    /// Set simulated pairwise session and capability state
    Session {
        /// Contact JID
        address: String,
        /// plaintext, handshaking or encrypted
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        verified: Option<bool>,
        /// Whether wake tokens were exchanged
        #[arg(long)]
        wake_capable: Option<bool>,
        /// Whether the contact supports group encryption
        #[arg(long)]
        group_encryption: Option<bool>,
    },
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Add a group chat
    Add {
        /// Group JID
        address: String,
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List groups
    List,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SDX_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = Output::new(cli.json);

    if let Err(e) = run(cli, &output) {
        output.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli, output: &Output) -> anyhow::Result<()> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?
            .join("sdx"),
    };

    std::fs::create_dir_all(&data_dir)?;

    let mut config = config::Config::load(&data_dir)?;

    match cli.command {
        Commands::Login { address } => commands::identity::login(&address, &mut config, output),
        Commands::Whoami => commands::identity::whoami(&config, output),
        Commands::Contact(cmd) => match cmd {
            ContactCommands::Add {
                address,
                name,
                resource,
            } => commands::contact::add(&address, name, resource, &mut config, output),
            ContactCommands::List => commands::contact::list(&config, output),
            ContactCommands::Presence {
                address,
                resource,
                offline,
            } => commands::contact::presence(&address, offline, resource, &mut config, output),
            ContactCommands::Session {
                address,
                status,
                verified,
                wake_capable,
                group_encryption,
            } => commands::contact::session(
                &address,
                SessionUpdate {
                    status,
                    verified,
                    wake_capable,
                    group_encryption,
                },
                &mut config,
                output,
            ),
        },
        Commands::Group(cmd) => match cmd {
            GroupCommands::Add { address, name } => {
                commands::group::add(&address, name, &mut config, output)
            }
            GroupCommands::List => commands::group::list(&config, output),
        },
        Commands::Send { to, body } => {
            commands::message::send(&to, &body, &mut config, &data_dir, output)
        }
        Commands::Queue { to } => {
            commands::message::queue(to.as_deref(), &config, &data_dir, output)
        }
        Commands::Retry { to } => commands::message::retry(&to, &mut config, &data_dir, output),
        Commands::Knock { to } => commands::message::knock(&to, &config, &data_dir, output),
        Commands::Status { to } => commands::message::status(&to, &config, &data_dir, output),
    }
}
