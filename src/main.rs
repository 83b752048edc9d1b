//! `remote-folders` command line front-end

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use remote_folders::config::{self, AppConfig, ConfigError, ConfigStorage};
use remote_folders::remote::Connector;
use remote_folders::ssh::SshClient;
use remote_folders::store::StoreError;
use remote_folders::transfer::{Outcome, TransferError};
use remote_folders::{
    init_logging, write_startup_log, RedbMetadataStore, RemoteSession, TransferOrchestrator,
};

#[derive(Parser, Debug)]
#[command(
    name = "remote-folders",
    version,
    about = "Manage folders and files on a remote SSH server"
)]
struct Cli {
    /// Path to config.json (defaults to the config directory)
    #[arg(long, env = "REMOTE_FOLDERS_CONFIG")]
    config: Option<PathBuf>,

    /// .env file to load instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config.json to fill in
    Init {
        /// Replace an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Print cached folders (refreshed at startup when online)
    Folders,
    /// Create a folder under the remote root
    Mkdir { name: String },
    /// List files in a folder with size and date
    Ls { folder: String },
    /// Upload one or more local files into a folder
    Upload {
        folder: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Download a file
    Download {
        folder: String,
        file: String,
        /// Target directory
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },
    /// Fetch a file for viewing and print its local path and kind
    Preview { folder: String, file: String },
    /// Delete a remote file and its cache record
    Rm { folder: String, file: String },
    /// Run a raw command on the remote host
    Exec { command: String },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Remote command failed with status {0}")]
    Command(i32),

    #[error("Config file already exists: {0} (use --force to replace it)")]
    ConfigExists(PathBuf),
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Config(e)) => {
            eprintln!("Configuration error: {}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let storage = match cli.config {
        Some(path) => ConfigStorage::with_path(path),
        None => ConfigStorage::new()?,
    };
    if let Commands::Init { force } = cli.command {
        return init_config(&storage, force).await;
    }

    let app_config = config::load_app_config(&storage, cli.env_file.as_deref()).await?;
    app_config.validate()?;

    let data_dir = config::data_dir(&app_config)?;
    let log_dir = config::log_dir(&data_dir);
    write_startup_log(&log_dir, &format!("Starting, remote {}", app_config.host));
    info!("Config: {:?}", app_config);

    let store = RedbMetadataStore::new(&config::metadata_db_path(&data_dir))?;
    let session = Arc::new(RemoteSession::new(
        SshClient::new(app_config.ssh_config()),
        app_config.session_options(),
    ));
    let orchestrator = TransferOrchestrator::new(
        session.clone(),
        Arc::new(store),
        config::temp_dir(&data_dir),
    )
    .with_prune_orphans(app_config.prune_orphans_on_refresh);

    match orchestrator.start().await {
        Ok(outcome) => print_warnings(&outcome),
        Err(e) => {
            warn!("Startup refresh failed, continuing with cached data: {}", e);
            eprintln!("warning: offline ({})", e);
        }
    }

    let result = execute(&orchestrator, cli.command).await;

    session.close().await;
    write_startup_log(&log_dir, "Shutdown complete");
    result
}

async fn init_config(storage: &ConfigStorage, force: bool) -> Result<(), CliError> {
    if storage.exists().await && !force {
        return Err(CliError::ConfigExists(storage.path().clone()));
    }
    storage.save(&AppConfig::default()).await?;
    info!("Wrote default config to {:?}", storage.path());
    println!("{}", storage.path().display());
    Ok(())
}

fn print_warnings<T>(outcome: &Outcome<T>) {
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
}

async fn execute<C: Connector>(
    orchestrator: &TransferOrchestrator<C>,
    command: Commands,
) -> Result<(), CliError> {
    match command {
        Commands::Init { .. } => {}
        Commands::Folders => {
            for name in orchestrator.cached_folder_names().await? {
                println!("{}", name);
            }
        }
        Commands::Mkdir { name } => {
            let outcome = orchestrator.create_folder(&name).await?;
            print_warnings(&outcome);
            println!("{}", outcome.value);
        }
        Commands::Ls { folder } => {
            let outcome = orchestrator.list_folder_files(&folder).await?;
            print_warnings(&outcome);
            for entry in &outcome.value {
                println!(
                    "{:<40} {:>10}  {}",
                    entry.name, entry.size_display, entry.date_display
                );
            }
        }
        Commands::Upload { folder, files } => {
            for file in &files {
                let outcome = orchestrator.upload(file, &folder).await?;
                print_warnings(&outcome);
                println!("{} ({} bytes)", outcome.value.remote_path, outcome.value.size);
            }
        }
        Commands::Download { folder, file, dest } => {
            let outcome = orchestrator.download(&folder, &file, &dest).await?;
            print_warnings(&outcome);
            println!("{}", outcome.value.local_path.display());
        }
        Commands::Preview { folder, file } => {
            let outcome = orchestrator.fetch_for_preview(&folder, &file).await?;
            print_warnings(&outcome);
            println!(
                "{}\t{}",
                outcome.value.kind.as_str(),
                outcome.value.local_path.display()
            );
        }
        Commands::Rm { folder, file } => {
            let outcome = orchestrator.delete(&folder, &file).await?;
            print_warnings(&outcome);
            println!("Deleted {}/{}", folder, file);
        }
        Commands::Exec { command } => {
            let output = orchestrator.session().execute_command(&command).await;
            if let Some(stdout) = &output.stdout {
                print!("{}", stdout);
            }
            if !output.stderr.is_empty() {
                eprintln!("{}", output.stderr);
            }
            if output.exit_status != 0 {
                return Err(CliError::Command(output.exit_status));
            }
        }
    }
    Ok(())
}
