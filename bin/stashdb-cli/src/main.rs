//! StashDB CLI - Store inspection and editing
//!
//! Opens stores with a passthrough resolver, so any store file can be read
//! and edited without knowing the value types it was written with.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use stashdb_common::StorageConfig;
use stashdb_storage::{DynamicValue, JsonStore, PassthroughResolver, StorageService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Type name recorded for values written without `--type`
const DEFAULT_TYPE_NAME: &str = "serde_json::value::Value";

#[derive(Parser, Debug)]
#[command(name = "stashdb-cli")]
#[command(about = "StashDB store CLI")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "/etc/stashdb/stashdb.toml")]
    config: String,

    /// Data directory (overrides the config file)
    #[arg(short, long, env = "STASHDB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List keys in a store
    Keys {
        /// Store name
        store: String,
    },
    /// Show the value stored under a key
    Get {
        /// Store name
        store: String,
        /// Key
        key: String,
    },
    /// Store a JSON value under a key
    Put {
        /// Store name
        store: String,
        /// Key
        key: String,
        /// Value as JSON
        json: String,
        /// Type name recorded with the value
        #[arg(long = "type", default_value = DEFAULT_TYPE_NAME)]
        type_name: String,
    },
    /// Remove a key
    Remove {
        /// Store name
        store: String,
        /// Key
        key: String,
    },
    /// List backup generations, newest first
    Backups {
        /// Store name
        store: String,
    },
    /// Print every entry of a store
    Dump {
        /// Store name
        store: String,
    },
}

impl Commands {
    fn store(&self) -> &str {
        match self {
            Self::Keys { store }
            | Self::Get { store, .. }
            | Self::Put { store, .. }
            | Self::Remove { store, .. }
            | Self::Backups { store }
            | Self::Dump { store } => store,
        }
    }
}

fn load_config(args: &Args) -> Result<StorageConfig> {
    let mut config = if std::path::Path::new(&args.config).exists() {
        let config_str = std::fs::read_to_string(&args.config)
            .with_context(|| format!("failed to read {}", args.config))?;
        StorageConfig::from_toml_str(&config_str)?
    } else {
        debug!("Config file {} not found, using defaults", args.config);
        StorageConfig::default()
    };

    // CLI takes precedence
    if let Some(data_dir) = &args.data_dir {
        config.data_dir.clone_from(data_dir);
    }
    Ok(config)
}

fn print_value(value: &DynamicValue) -> Result<()> {
    println!("type:  {}", value.type_name);
    println!("value: {}", serde_json::to_string_pretty(&value.payload)?);
    Ok(())
}

fn run(command: &Commands, store: &JsonStore<DynamicValue>) -> Result<()> {
    match command {
        Commands::Keys { .. } => {
            for key in store.keys() {
                println!("{key}");
            }
        }
        Commands::Get { key, .. } => match store.get(key) {
            Some(value) => print_value(&value)?,
            None if store.contains_key(key) => bail!("value under '{key}' could not be decoded"),
            None => bail!("key '{key}' not found"),
        },
        Commands::Put {
            key,
            json,
            type_name,
            ..
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(json).context("value is not valid JSON")?;
            let previous = store.put(key.as_str(), &DynamicValue::new(type_name, payload))?;
            if !store.commit() {
                bail!("failed to write {}", store.file_path().display());
            }
            match previous {
                Some(value) => print_value(&value)?,
                None => println!("(new key)"),
            }
        }
        Commands::Remove { key, .. } => {
            let Some(removed) = store.remove(key) else {
                bail!("key '{key}' not found");
            };
            if !store.commit() {
                bail!("failed to write {}", store.file_path().display());
            }
            print_value(&removed)?;
        }
        Commands::Backups { .. } => {
            let backups = store.backups().list()?;
            println!("{:<5} {:<15} PATH", "AGE", "TIMESTAMP");
            for (age, backup) in backups.iter().rev().enumerate() {
                println!(
                    "{:<5} {:<15} {}",
                    age + 1,
                    backup.timestamp,
                    backup.path.display()
                );
            }
        }
        Commands::Dump { .. } => {
            let mut document = serde_json::Map::new();
            for key in store.keys() {
                if let Some(record) = store.record(&key) {
                    document.insert(key, serde_json::to_value(record)?);
                }
            }
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&args)?;
    debug!("Data directory: {:?}", config.data_dir);

    let service = StorageService::new(config, Arc::new(PassthroughResolver));
    let store = service.get_storage(args.command.store())?;

    let result = run(&args.command, &store);
    service.shutdown();

    if store.stats().failed_commits > 0 {
        warn!("Some commits to {:?} failed", store.file_path());
    }
    result
}
