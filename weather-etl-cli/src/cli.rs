use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Select, Text};
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use weather_etl_core::{
    BlobStore, Config, Extractor, StageResult, StoreBackend, Transformer, Units, latest_key,
    source_from_config, store_from_config,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-etl", version, about = "Weather extract/transform pipeline")]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch every configured location and store the raw batch.
    Extract,

    /// Flatten a raw batch into CSV.
    Transform {
        /// Raw object to transform; defaults to the most recently modified one.
        #[arg(long)]
        key: Option<String>,
    },

    /// Extract, then transform the batch just written.
    Run,

    /// Print the most recently modified key under a prefix.
    Latest {
        /// Defaults to the raw prefix.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Interactively write the config file.
    Configure,

    /// Print the config file location.
    ConfigPath,
}

impl Cli {
    /// Run the selected command. Returns `false` when a stage reported an error.
    pub async fn run(self) -> Result<bool> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => Config::config_file_path()?,
        };

        match self.command {
            Command::Configure => {
                configure(&path)?;
                Ok(true)
            }
            Command::ConfigPath => {
                println!("{}", path.display());
                Ok(true)
            }
            Command::Latest { prefix } => {
                let config = load_config(&path)?;
                let store = store_from_config(&config.store)?;
                let prefix = prefix.unwrap_or_else(|| config.store.raw_prefix.clone());
                let key = latest_key(store.as_ref(), &prefix).await?;
                println!("{key}");
                Ok(true)
            }
            Command::Extract => {
                let config = load_config(&path)?;
                let store = store_from_config(&config.store)?;
                let result = extractor(&config, store)?.run().await;
                print_result(&result)
            }
            Command::Transform { key } => {
                let config = load_config(&path)?;
                let store = store_from_config(&config.store)?;
                let transformer = Transformer::from_config(&config, store);
                let result = match key {
                    Some(key) => transformer.run_key(&key).await,
                    None => transformer.run().await,
                };
                print_result(&result)
            }
            Command::Run => {
                let config = load_config(&path)?;
                let store = store_from_config(&config.store)?;

                let extracted = extractor(&config, store.clone())?.run().await;
                if !print_result(&extracted)? {
                    return Ok(false);
                }

                // Hand the exact key over rather than relying on the latest listing.
                let transformer = Transformer::from_config(&config, store);
                let transformed = match &extracted.key {
                    Some(key) => transformer.run_key(key).await,
                    None => transformer.run().await,
                };
                print_result(&transformed)
            }
        }
    }
}

fn load_config(path: &std::path::Path) -> Result<Config> {
    let mut config = Config::load_from(path)?;
    config.apply_env();
    config.validate()?;
    info!(path = %path.display(), backend = ?config.store.backend, "configuration loaded");
    Ok(config)
}

fn extractor(config: &Config, store: Arc<dyn BlobStore>) -> Result<Extractor> {
    let source = source_from_config(&config.weather)?;
    Ok(Extractor::from_config(config, Arc::new(source), store))
}

fn print_result(result: &StageResult) -> Result<bool> {
    let json = serde_json::to_string_pretty(result).context("Failed to render stage result")?;
    println!("{json}");
    Ok(result.is_success())
}

/// Prompt for the settings that differ between deployments and save them.
fn configure(path: &std::path::Path) -> Result<()> {
    let mut config = Config::load_from(path)?;

    let api_key = Password::new("OpenWeather API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_help_message("Leave empty to keep the current key or use WEATHER_ETL_API_KEY")
        .prompt()?;
    if !api_key.trim().is_empty() {
        config.weather.api_key = Some(api_key.trim().to_string());
    }

    let units = Select::new("Unit system:", Units::all().to_vec())
        .with_starting_cursor(
            Units::all()
                .iter()
                .position(|u| *u == config.weather.units)
                .unwrap_or_default(),
        )
        .prompt()?;
    config.weather.units = units;

    let locations = Text::new("Locations (comma-separated):")
        .with_default(&config.weather.locations.join(", "))
        .prompt()?;
    config.weather.locations = locations
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let backends = vec!["s3", "local", "memory"];
    let backend = Select::new("Blob store backend:", backends).prompt()?;
    config.store.backend = match backend {
        "local" => StoreBackend::Local,
        "memory" => StoreBackend::Memory,
        _ => StoreBackend::S3,
    };

    match config.store.backend {
        StoreBackend::S3 => {
            let bucket = Text::new("Bucket:")
                .with_default(config.store.bucket.as_deref().unwrap_or_default())
                .prompt()?;
            config.store.bucket = Some(bucket.trim().to_string()).filter(|b| !b.is_empty());

            let region = Text::new("Region:")
                .with_default(config.store.region.as_deref().unwrap_or("us-east-1"))
                .prompt()?;
            config.store.region = Some(region.trim().to_string()).filter(|r| !r.is_empty());
        }
        StoreBackend::Local => {
            let current = config
                .store
                .root
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            let root = Text::new("Store directory:").with_default(&current).prompt()?;
            config.store.root = Some(PathBuf::from(root.trim()));
        }
        StoreBackend::Memory => {}
    }

    config.validate()?;
    config.save_to(path)?;
    println!("Configuration saved to {}", path.display());

    Ok(())
}
