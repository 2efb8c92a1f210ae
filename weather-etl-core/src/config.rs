use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

pub const ENV_API_KEY: &str = "WEATHER_ETL_API_KEY";
pub const ENV_BUCKET: &str = "WEATHER_ETL_BUCKET";
pub const ENV_REGION: &str = "WEATHER_ETL_REGION";

const DEFAULT_LOCATIONS: &[&str] = &[
    "London", "Glasgow", "Blackpool", "Greenock", "Lagos", "Cornwall", "Reading", "Manchester",
    "Birmingham", "Liverpool", "Derby", "Leeds", "Sheffield", "Bristol", "Cardiff", "Swansea",
    "Edinburgh", "Aberdeen", "Dundee", "Inverness", "Newcastle", "York", "Nottingham",
    "Leicester", "Coventry", "Oxford", "Cambridge", "Brighton", "Southampton", "Portsmouth",
    "Bournemouth", "Exeter", "Plymouth", "Belfast", "Dublin",
];

/// Unit system requested from the weather endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Standard,
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Standard => "standard",
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }

    pub const fn all() -> &'static [Units] {
        &[Units::Standard, Units::Metric, Units::Imperial]
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "standard" => Ok(Units::Standard),
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            _ => Err(anyhow!(
                "Unknown unit system '{value}'. Supported: standard, metric, imperial."
            )),
        }
    }
}

/// Which blob store implementation backs the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    S3,
    Local,
    Memory,
}

/// `[weather]` section: what to fetch and from where.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,

    /// OpenWeather `appid`. Usually supplied through `WEATHER_ETL_API_KEY`.
    pub api_key: Option<String>,

    pub units: Units,

    /// Locations are fetched, and stored, in this order.
    pub locations: Vec<String>,

    pub timeout_secs: u64,

    /// Maximum number of fetches in flight at once.
    pub concurrency: usize,

    /// Read the raw object's size back after writing it.
    pub verify_upload: bool,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            units: Units::default(),
            locations: DEFAULT_LOCATIONS.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 10,
            concurrency: 1,
            verify_upload: false,
        }
    }
}

impl WeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key, or a hint on how to provide one.
    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "No weather API key configured.\n\
                     Hint: set {ENV_API_KEY} or run `weather-etl configure`."
                )
            })
    }
}

/// `[store]` section: where blobs land.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Bucket name, required by the `s3` backend.
    pub bucket: Option<String>,
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible services (MinIO, Garage, ...).
    pub endpoint: Option<String>,
    pub allow_http: bool,

    /// Root directory for the `local` backend.
    pub root: Option<PathBuf>,

    pub raw_prefix: String,
    pub transformed_prefix: String,

    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            bucket: None,
            region: None,
            endpoint: None,
            allow_http: false,
            root: None,
            raw_prefix: "raw".to_string(),
            transformed_prefix: "transformed".to_string(),
            timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// [weather]
/// units = "metric"
/// locations = ["London", "Glasgow"]
///
/// [store]
/// backend = "s3"
/// bucket = "weather-etl"
/// region = "us-east-1"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub weather: WeatherConfig,
    pub store: StoreConfig,
}

impl Config {
    /// Load config from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the default config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-etl", "weather-etl")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply overrides using `lookup` to resolve variable names.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(ENV_API_KEY) {
            self.weather.api_key = Some(key);
        }
        if let Some(bucket) = non_empty(ENV_BUCKET) {
            self.store.bucket = Some(bucket);
        }
        if let Some(region) = non_empty(ENV_REGION) {
            self.store.region = Some(region);
        }
    }

    /// Check the settings every stage relies on.
    pub fn validate(&self) -> Result<()> {
        if self.weather.locations.is_empty() {
            bail!("No locations configured; `weather.locations` must not be empty");
        }
        if let Some(idx) = self.weather.locations.iter().position(|l| l.trim().is_empty()) {
            bail!("`weather.locations[{idx}]` is blank");
        }
        if self.weather.concurrency == 0 {
            bail!("`weather.concurrency` must be at least 1");
        }
        if self.weather.timeout_secs == 0 || self.store.timeout_secs == 0 {
            bail!("Timeouts must be greater than zero seconds");
        }
        if self.store.backend == StoreBackend::S3 && self.store.bucket.is_none() {
            bail!("The s3 backend needs a bucket.\nHint: set {ENV_BUCKET} or `store.bucket`.");
        }
        if self.store.backend == StoreBackend::Local && self.store.root.is_none() {
            bail!("The local backend needs `store.root`");
        }
        if self.store.raw_prefix.trim_matches('/') == self.store.transformed_prefix.trim_matches('/')
        {
            bail!("`store.raw_prefix` and `store.transformed_prefix` must differ");
        }
        Ok(())
    }
}
