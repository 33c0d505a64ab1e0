use clap::{Parser, Subcommand};

pub mod admin;
pub mod config;
pub mod keys;
pub mod ledger;
pub mod logging;
pub mod register;
pub mod serve;
pub mod status;
pub mod version;

use admin::AdminCommand;
use config::RangerConfig;
use register::RegisterOptions;

#[derive(Parser)]
#[command(name = "rangerblock")]
#[command(author = "RangerBlock Project")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trust and ledger node for the RangerBlock relay network", long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.local/share/rangerblock/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the standalone auth server
    Serve {
        /// Port to listen on (overrides [auth] port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Interactive ledger console
    Ledger {
        /// Address credited with mining rewards
        #[arg(long, default_value = "ranger")]
        address: String,
    },

    /// Manage bans, timeouts and roles
    Admin {
        /// Acting user id (default: the supreme identity)
        #[arg(long = "as")]
        actor: Option<String>,

        #[command(subcommand)]
        command: AdminCommand,
    },

    /// Submit this node's registration to a relay
    Register {
        /// Name shown to admins reviewing the registration
        #[arg(long)]
        display_name: String,

        /// Client application type
        #[arg(long, default_value = "rangerblock")]
        app_type: String,

        /// Relay address (overrides [registration] relay_address)
        #[arg(long)]
        relay: Option<String>,

        /// Version of the terms being accepted
        #[arg(long, default_value = "1.0")]
        terms_version: String,

        /// Path to node key (default: adjacent to config)
        #[arg(long)]
        key: Option<String>,

        /// Replace an existing registration
        #[arg(long)]
        force: bool,

        /// Re-deliver a saved registration the relay never acknowledged
        #[arg(long, conflicts_with = "force")]
        resync: bool,
    },

    /// Show registration and ledger status
    Status,

    /// Generate the node's Ed25519 key
    Keygen {
        /// Output path (default: adjacent to config)
        #[arg(long)]
        output: Option<String>,

        /// Overwrite an existing key
        #[arg(long)]
        force: bool,
    },

    /// Sign an auth challenge with the node key
    Sign {
        /// Hex challenge from an authChallenge message
        challenge: String,

        /// Path to node key (default: adjacent to config)
        #[arg(long)]
        key: Option<String>,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::Version = cli.command {
        version::execute();
        return Ok(());
    }

    let (config, _path) = RangerConfig::load_or_create(cli.config.as_deref())?;
    logging::init(&config.logging)?;

    match cli.command {
        Commands::Serve { port } => serve::execute(&config, port).await,
        Commands::Ledger { address } => ledger::execute(&config, address).await,
        Commands::Admin { actor, command } => admin::execute(&config, actor, command),
        Commands::Register {
            display_name,
            app_type,
            relay,
            terms_version,
            key,
            force,
            resync,
        } => {
            register::execute(
                &config,
                RegisterOptions {
                    display_name,
                    app_type,
                    relay,
                    terms_version,
                    key_path: key,
                    force,
                    resync,
                },
            )
            .await
        }
        Commands::Status => status::execute(&config),
        Commands::Keygen { output, force } => keys::keygen(&config, output, force),
        Commands::Sign { challenge, key } => keys::sign(&config, key, challenge),
        Commands::Version => Ok(()),
    }
}
