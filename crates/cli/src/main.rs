use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wikimaps_core::{
    load_config, validate_config, CategoryProbe, CommonsApi, CommonsClient, Config, ConfigError,
    ImportRunner, ImportStatus, NewImport, SqliteStore, StartOptions, UserStore,
};

#[derive(Debug, Parser)]
#[command(
    name = "wikimaps-import",
    version,
    about = "Import Wikimedia Commons categories as map layers"
)]
struct Cli {
    /// Configuration file; a missing file means built-in defaults.
    #[arg(
        long,
        env = "WIKIMAPS_CONFIG",
        default_value = "config.toml",
        global = true
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Register a user that imports can be attributed to
    AddUser { login: String },

    /// Print the number of files in a category
    Count { category: String },

    /// Check whether a category's files carry the {{Map}} template
    Probe { category: String },

    /// Import every file of a category
    Run {
        /// Category title, e.g. "Category:Maps of Finland"
        category: String,

        /// Login of the user the maps will belong to
        #[arg(long)]
        user: String,

        /// Existing layer the import refers to (-99 for none)
        #[arg(long, allow_negative_numbers = true)]
        layer_id: Option<i64>,

        /// Do not group the imported maps into a layer
        #[arg(long)]
        no_layer: bool,

        /// Run as a queued job (no `running` status is recorded)
        #[arg(long)]
        queued: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = read_config(&cli.config)?;
    validate_config(&config).context("Configuration validation failed")?;
    info!("Database path: {:?}", config.database.path);

    let store = Arc::new(
        SqliteStore::new(&config.database.path).context("Failed to open database")?,
    );

    match cli.command {
        Command::AddUser { login } => {
            let user = store
                .create_user(&login)
                .with_context(|| format!("Failed to create user '{}'", login))?;
            println!("user {}: {}", user.id, user.login);
        }
        Command::Count { category } => {
            let count = CategoryProbe::new(commons_api(&config)?)
                .file_count(&category)
                .await;
            println!("{}", count);
        }
        Command::Probe { category } => {
            let probe = CategoryProbe::new(commons_api(&config)?);
            let count = probe.file_count(&category).await;
            let is_map = probe.has_recognized_map_marker(&category).await;
            println!("files: {}", count);
            println!("map template: {}", if is_map { "yes" } else { "no" });
        }
        Command::Run {
            category,
            user,
            layer_id,
            no_layer,
            queued,
        } => {
            let owner = store
                .find_user_by_login(&user)?
                .with_context(|| format!("Unknown user '{}'", user))?;

            let runner = ImportRunner::new(commons_api(&config)?, store.clone(), &config.commons)
                .context("Failed to create import runner")?;

            let mut request = NewImport::new(category, owner.id);
            if let Some(layer_id) = layer_id {
                request = request.with_layer(layer_id);
            }
            let import = runner.create_import(request)?;

            let options = StartOptions {
                fire_and_forget: queued,
                create_layer: config.import.create_layer && !no_layer,
            };
            let status = runner
                .start(import.id, options)
                .await
                .with_context(|| format!("Import {} could not be started", import.id))?;

            println!("import {}: {}", import.id, status);
            if status == ImportStatus::Failed {
                bail!("Import {} failed", import.id);
            }
        }
    }

    Ok(())
}

fn commons_api(config: &Config) -> Result<Arc<dyn CommonsApi>> {
    let client = CommonsClient::new(&config.commons).context("Failed to create Commons client")?;
    Ok(Arc::new(client))
}

fn read_config(path: &Path) -> Result<Config> {
    match load_config(path) {
        Ok(config) => {
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        Err(ConfigError::FileNotFound(_)) => {
            info!("No configuration at {:?}, using defaults", path);
            Ok(Config::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load config from {:?}", path)),
    }
}
