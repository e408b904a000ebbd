//! Marketplace session CLI - drive login, logout and session inspection from a terminal.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use market_auth::{Role, SessionStore};
use market_config::{init_logging, Config, Paths};
use market_storage::{open_keychain, FileStore, SERVICE_NAME};
use tracing::debug;

/// Marketplace session command-line interface.
#[derive(Parser)]
#[command(name = "market-session")]
#[command(about = "Sign in to the marketplace and inspect the stored session")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config and session storage. Defaults to ~/.marketplace
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MARKETPLACE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MARKETPLACE_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long, value_enum)]
        role: RoleArg,
    },
    /// End the session and remove stored credentials
    Logout,
    /// Show the stored session without contacting the server
    Status,
    /// Re-validate the session with the server and show the actor
    Whoami,
    /// Renew the stored credential pair
    Refresh,
}

/// Roles a user may register as.
#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Consumer,
    Vendor,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Consumer => Role::Consumer,
            RoleArg::Vendor => Role::Vendor,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    paths.ensure_dirs()?;
    let secrets = open_keychain(SERVICE_NAME)?;
    let storage = Arc::new(FileStore::open(paths.storage_dir())?);
    let session = SessionStore::from_config(&config, secrets, storage)?;

    let phase = session.hydrate().await?;
    debug!(phase = phase.as_str(), base_dir = %paths.base_dir().display(), "Session hydrated");

    match cli.command {
        Commands::Login { email, password } => {
            commands::login(&session, &email, &password).await?;
        }
        Commands::Register {
            email,
            password,
            first_name,
            last_name,
            phone,
            role,
        } => {
            let form = market_auth::RegisterRequest {
                email,
                password,
                first_name,
                last_name,
                phone,
                role: role.into(),
            };
            commands::register(&session, &form).await?;
        }
        Commands::Logout => commands::logout(&session).await,
        Commands::Status => commands::status(&session)?,
        Commands::Whoami => commands::whoami(&session).await?,
        Commands::Refresh => commands::refresh(&session).await?,
    }

    Ok(())
}
