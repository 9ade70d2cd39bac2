//! Uploadkeeper command-line front end.
//!
//! Each invocation loads configuration, resolves the local identity, runs one
//! registry operation, and prints the result as JSON.  The in-memory index
//! only lives as long as the process.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use uploadkeeper::config::{load_config, Config, LoggingConfig};
use uploadkeeper::App;

/// Command-line arguments for Uploadkeeper.
#[derive(Parser, Debug)]
#[command(
    name = "uploadkeeper",
    version,
    about = "Local per-user upload registry"
)]
struct Cli {
    /// Path to a YAML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print Prometheus metrics after the command completes.
    #[arg(long, default_value_t = false)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a local file for the current user
    Upload {
        file: PathBuf,
        /// Stored name (defaults to the file's own name)
        #[arg(long)]
        name: Option<String>,
    },
    /// List stored uploads
    List {
        /// Owner id (defaults to the current user)
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show one of the current user's uploads
    Get { id: String },
    /// Delete an upload by id or filename
    Delete {
        id: String,
        #[arg(long)]
        owner: Option<String>,
    },
    /// Check a size and filename against the upload policy
    Validate { size: u64, filename: String },
    /// Remove every stored file older than the given age
    Cleanup { max_age_secs: u64 },
    /// Print the current identity
    Whoami,
    /// Change the display name
    SetUsername { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    init_tracing(&config.logging);

    if cli.metrics && config.observability.metrics {
        uploadkeeper::metrics::init_metrics();
    }

    let app = App::from_config(&config).context("failed to initialize upload registry")?;
    info!("Storage root at {:?}", app.registry.root());

    run(&app, cli.command).await?;

    if cli.metrics {
        if let Some(text) = uploadkeeper::metrics::render() {
            print!("{text}");
        }
    }
    Ok(())
}

async fn run(app: &App, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Upload { file, name } => {
            let name = match name {
                Some(name) => name,
                None => file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(str::to_owned)
                    .with_context(|| format!("cannot derive a name from {}", file.display()))?,
            };
            let reader = tokio::fs::File::open(&file)
                .await
                .with_context(|| format!("failed to open {}", file.display()))?;
            print_json(&app.upload_reader(&name, reader).await?)
        }
        Commands::List { owner } => {
            let uploads = match owner {
                Some(owner) => app.list(&owner).await?,
                None => app.list_mine().await?,
            };
            print_json(&uploads)
        }
        Commands::Get { id } => print_json(&app.get(&id).await?),
        Commands::Delete { id, owner } => {
            let owner = match owner {
                Some(owner) => owner,
                None => app.user_id().await?,
            };
            app.delete(&id, &owner).await?;
            info!("Deleted {}", id);
            Ok(())
        }
        Commands::Validate { size, filename } => {
            app.validate(size, &filename)?;
            println!("ok");
            Ok(())
        }
        Commands::Cleanup { max_age_secs } => {
            print_json(&app.cleanup(Duration::from_secs(max_age_secs)).await?)
        }
        Commands::Whoami => {
            app.user_id().await?;
            print_json(&app.identity.current().await?)
        }
        Commands::SetUsername { name } => {
            app.set_username(&name).await?;
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing from the logging config; `RUST_LOG` takes precedence.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
