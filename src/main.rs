use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use tradeconf::{
    commands::{groups, parameters, schema, sessions, systems},
    config::ServiceConfig,
    context::AppContext,
    error::ConfigError,
};

/// Exit status for requests rejected as malformed or referring to missing
/// records. Backend failures exit with 1.
const CLIENT_ERROR_EXIT: u8 = 2;

#[derive(Parser)]
#[command(name = "tradeconf")]
#[command(about = "Configuration store for automated trading systems")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create tables and indexes if they do not exist
    ApplySchema,
    /// Parameter definitions
    Parameters {
        #[command(subcommand)]
        action: ParameterCommands,
    },
    /// Parameter groups (value snapshots)
    Groups {
        #[command(subcommand)]
        action: GroupCommands,
    },
    /// Trading systems
    Systems {
        #[command(subcommand)]
        action: SystemCommands,
    },
    /// Recorded trading sessions
    Sessions {
        #[command(subcommand)]
        action: SessionCommands,
    },
}

#[derive(Subcommand)]
enum ParameterCommands {
    /// List definitions of a trading system
    List {
        #[arg(long = "trade-system")]
        trade_system_name: String,
    },
    /// Insert or replace definitions from a JSON object or list
    Upsert {
        /// JSON file, or - for stdin
        #[arg(value_name = "PATH")]
        input: PathBuf,
    },
    /// Apply an update request ({updatedKey, key, tradeSystemName, ...fields})
    Update {
        /// JSON file, or - for stdin
        #[arg(value_name = "PATH")]
        input: PathBuf,
    },
    /// Delete one definition; saved group values are kept
    Delete {
        key: String,
        #[arg(long = "trade-system")]
        trade_system_name: String,
    },
}

#[derive(Subcommand)]
enum GroupCommands {
    /// Fetch one group by id, or the most recent with `latest`
    Get {
        #[arg(long = "trade-system")]
        trade_system_name: String,
        group_id: String,
        /// Merge values with current parameter definitions
        #[arg(long)]
        include_metadata: bool,
    },
    /// List every group of a trading system
    List {
        #[arg(long = "trade-system")]
        trade_system_name: String,
        #[arg(long)]
        include_metadata: bool,
    },
    /// Save a group; prints the final id
    Upsert {
        /// JSON file, or - for stdin
        #[arg(value_name = "PATH")]
        input: PathBuf,
    },
    Delete {
        id: String,
        #[arg(long = "trade-system")]
        trade_system_name: String,
    },
}

#[derive(Subcommand)]
enum SystemCommands {
    /// List all trading systems, or one by name
    List {
        #[arg(long)]
        name: Option<String>,
    },
    /// Add or update a trading system; `updatedName` renames it
    Save {
        /// JSON file, or - for stdin
        #[arg(value_name = "PATH")]
        input: PathBuf,
    },
    /// Delete a trading system with its parameters, groups and sessions
    Delete { name: String },
}

#[derive(Subcommand)]
enum SessionCommands {
    List,
    /// Sessions inside a window, e.g. "Tue Jan 02 00:00:00 2024"
    Between { start: String, end: String },
    /// Record a session reported by the trading runtime
    Insert {
        /// JSON file, or - for stdin
        #[arg(value_name = "PATH")]
        input: PathBuf,
    },
    /// Trade statistics of one session
    Stats { session_id: String },
    /// Sessions that ran with a given parameter group
    ForGroup { parameter_group_id: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let Cli { command } = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServiceConfig::from_env()?;
    if config.database_url.is_none() {
        return Err(anyhow!("DATABASE_URL must be set for this command."));
    }
    let app_context = AppContext::initialize(&config).await?;
    info!("Starting tradeconf");

    match dispatch(&app_context, command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => match err.downcast_ref::<ConfigError>() {
            Some(config_error) if config_error.is_client_error() => {
                error!("Request rejected: {}", config_error);
                Ok(ExitCode::from(CLIENT_ERROR_EXIT))
            }
            _ => Err(err),
        },
    }
}

async fn dispatch(app_context: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::ApplySchema => schema::run(app_context).await?,
        Commands::Parameters { action } => match action {
            ParameterCommands::List { trade_system_name } => {
                parameters::list(app_context, &trade_system_name).await?
            }
            ParameterCommands::Upsert { input } => parameters::upsert(app_context, &input).await?,
            ParameterCommands::Update { input } => parameters::update(app_context, &input).await?,
            ParameterCommands::Delete {
                key,
                trade_system_name,
            } => parameters::delete(app_context, &key, &trade_system_name).await?,
        },
        Commands::Groups { action } => match action {
            GroupCommands::Get {
                trade_system_name,
                group_id,
                include_metadata,
            } => groups::get(app_context, &trade_system_name, &group_id, include_metadata).await?,
            GroupCommands::List {
                trade_system_name,
                include_metadata,
            } => groups::list(app_context, &trade_system_name, include_metadata).await?,
            GroupCommands::Upsert { input } => groups::upsert(app_context, &input).await?,
            GroupCommands::Delete {
                id,
                trade_system_name,
            } => groups::delete(app_context, &id, &trade_system_name).await?,
        },
        Commands::Systems { action } => match action {
            SystemCommands::List { name } => systems::list(app_context, name.as_deref()).await?,
            SystemCommands::Save { input } => systems::save(app_context, &input).await?,
            SystemCommands::Delete { name } => systems::delete(app_context, &name).await?,
        },
        Commands::Sessions { action } => match action {
            SessionCommands::List => sessions::list(app_context).await?,
            SessionCommands::Between { start, end } => {
                sessions::between(app_context, &start, &end).await?
            }
            SessionCommands::Insert { input } => sessions::insert(app_context, &input).await?,
            SessionCommands::Stats { session_id } => {
                sessions::stats(app_context, &session_id).await?
            }
            SessionCommands::ForGroup { parameter_group_id } => {
                sessions::for_group(app_context, &parameter_group_id).await?
            }
        },
    }

    Ok(())
}
