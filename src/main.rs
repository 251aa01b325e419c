use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use verisync::application::ports::{LocalStore, RemoteApi};
use verisync::domain::entities::NewVerification;
use verisync::domain::value_objects::SyncQueueId;
use verisync::shared::logging::init_logging;
use verisync::{AppConfig, AppError, AppState, SubmissionOutcome};

#[derive(Parser)]
#[command(name = "verisync")]
#[command(about = "Offline-first verification client with background sync", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", env = "VERISYNC_LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "VERISYNC_JSON_LOGS")]
    json_logs: bool,

    /// SQLite database url, e.g. sqlite:///var/lib/verisync/local.db
    #[arg(long, env = "VERISYNC_DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a verification (queued locally when the remote is unreachable)
    Submit {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        index_number: String,
        #[arg(long)]
        reference_code: String,
    },
    /// Show connectivity, queue and store statistics
    Status,
    /// Run one sync pass now
    Sync,
    /// Probe connectivity and auto-sync until Ctrl+C
    Run,
    /// Replace the local code cache with the server snapshot
    RefreshCodes,
    /// List cached reference codes
    Codes,
    /// Mark a cached code as used and queue the usage report
    MarkCodeUsed { code: String },
    /// List queue entries that exhausted their retries
    Failed,
    /// Remove one failed queue entry by id
    Discard { id: i64 },
    /// Delete all verifications, codes and queue entries (settings are kept)
    Clear {
        /// Confirm that unsynced work will be lost
        #[arg(long)]
        yes: bool,
    },
    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    Show,
    /// Store submissions locally when the remote is unavailable
    OfflineMode {
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Set the remote API base address
    Endpoint { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.json_logs);

    let mut config = AppConfig::from_env();
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    let state = AppState::initialize(config)
        .await
        .context("failed to initialize local store")?;

    let result = run_command(&state, cli.command).await;
    state.shutdown().await;
    result
}

async fn run_command(state: &AppState, command: Commands) -> Result<()> {
    match command {
        Commands::Submit {
            full_name,
            email,
            index_number,
            reference_code,
        } => {
            refresh_connectivity(state).await;
            let submission = NewVerification::new(full_name, email, index_number, reference_code);
            let outcome = state.verification_service.submit(submission).await?;
            print_json(&outcome)?;
            if let SubmissionOutcome::Rejected { reason } = outcome {
                return Err(AppError::Rejected(reason).into());
            }
        }
        Commands::Status => {
            refresh_connectivity(state).await;
            print_json(&state.sync_manager.get_status().await?)?;
        }
        Commands::Sync => {
            refresh_connectivity(state).await;
            match state.sync_manager.force_sync_now().await? {
                Some(report) => print_json(&report)?,
                None => println!("sync skipped: offline or already running"),
            }
        }
        Commands::Run => run_until_interrupted(state).await?,
        Commands::RefreshCodes => {
            let cached = state.verification_service.refresh_code_cache().await?;
            println!("cached {cached} reference codes");
        }
        Commands::Codes => print_json(&state.store.get_all_codes().await?)?,
        Commands::MarkCodeUsed { code } => {
            if state.store.get_code(&code).await?.is_none() {
                bail!("code `{code}` is not in the local cache");
            }
            state.store.mark_code_used(&code).await?;
            println!("code `{code}` marked used");
        }
        Commands::Failed => print_json(&state.store.list_failed_sync_items().await?)?,
        Commands::Discard { id } => {
            let id = SyncQueueId::new(id).map_err(AppError::InvalidInput)?;
            state.store.discard_failed_sync_item(id).await?;
            println!("failed queue entry {id} discarded");
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("refusing to clear the local store without --yes");
            }
            state.store.clear_all().await?;
            println!("local store cleared");
        }
        Commands::Settings { action } => match action {
            SettingsCommand::Show => print_json(&state.settings_service.current().await?)?,
            SettingsCommand::OfflineMode { enabled } => {
                state.settings_service.set_offline_mode(enabled).await?;
                println!("offline mode {}", if enabled { "enabled" } else { "disabled" });
            }
            SettingsCommand::Endpoint { url } => {
                let saved = state.set_api_endpoint(&url).await?;
                println!("api endpoint set to {saved}");
            }
        },
    }
    Ok(())
}

async fn refresh_connectivity(state: &AppState) {
    let reachable = state.remote.probe().await;
    state.connectivity.set_online(reachable);
}

async fn run_until_interrupted(state: &AppState) -> Result<()> {
    refresh_connectivity(state).await;
    let probe = state.spawn_connectivity_probe();

    if state.config.sync.auto_sync {
        state.sync_manager.start_auto_sync().await;
    } else {
        info!("auto sync disabled by configuration");
    }

    info!("verisync is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("shutting down...");

    probe.stop();
    state.sync_manager.stop_auto_sync().await;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
