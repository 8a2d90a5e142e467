//! Configuration management for CoinPulse
//!
//! Loads from TOML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable selecting the configuration profile
pub const PROFILE_ENV_VAR: &str = "COINPULSE_PROFILE";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ingestion: IngestionConfig,
    pub logging: LoggingConfig,
    pub quality: QualityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    pub host: String,
    /// Bind port for the HTTP API
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    /// Base URL of the CoinGecko v3 API
    pub api_url: String,
    /// CoinGecko asset identifiers to track, in display order
    pub assets: Vec<String>,
    /// Poller interval in seconds (respect CoinGecko rate limits)
    pub interval_secs: u64,
    /// Timeout of a single upstream request in seconds
    pub request_timeout_secs: u64,
    /// Run the background poller
    pub poll_enabled: bool,
}

impl IngestionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when RUST_LOG is unset
    pub level: String,
    /// Log file mirrored alongside stdout. Empty disables it.
    pub file: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    /// Alert if more than this percentage of assets are null tallies
    pub max_null_percentage: f64,
    /// Alert if a price moves more than this percentage between batches
    pub max_price_change_percentage: f64,
}

/// Configuration profile, selected through `COINPULSE_PROFILE`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Production,
}

impl Profile {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Profile::Development),
            "production" | "prod" => Some(Profile::Production),
            _ => None,
        }
    }

    /// Read the profile from the environment, defaulting to development
    pub fn from_env() -> Result<Self> {
        match std::env::var(PROFILE_ENV_VAR) {
            Ok(value) => Self::from_str(&value).with_context(|| {
                format!("{PROFILE_ENV_VAR} must be one of: development, production (got {value:?})")
            }),
            Err(std::env::VarError::NotPresent) => Ok(Profile::Development),
            Err(std::env::VarError::NotUnicode(_)) => {
                bail!("{PROFILE_ENV_VAR} contains non-unicode data")
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Profile::Development => "development",
            Profile::Production => "production",
        }
    }

    fn default_interval_secs(self) -> u64 {
        match self {
            Profile::Development => 30,
            Profile::Production => 60,
        }
    }

    fn default_log_level(self) -> &'static str {
        match self {
            Profile::Development => "debug",
            Profile::Production => "info",
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let profile = Profile::from_env()?;

        let config = Self::builder(profile)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (COINPULSE__*)
            .add_source(
                Environment::with_prefix("COINPULSE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("ingestion.assets")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Builder pre-populated with the defaults of `profile`
    pub fn builder(profile: Profile) -> Result<ConfigBuilder<DefaultState>> {
        let builder = Config::builder()
            // Server defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            // Ingestion defaults
            .set_default("ingestion.api_url", "https://api.coingecko.com/api/v3")?
            .set_default(
                "ingestion.assets",
                vec!["bitcoin", "ethereum", "cardano", "polkadot", "solana"],
            )?
            .set_default("ingestion.interval_secs", profile.default_interval_secs())?
            .set_default("ingestion.request_timeout_secs", 10)?
            .set_default("ingestion.poll_enabled", true)?
            // Logging defaults
            .set_default("logging.level", profile.default_log_level())?
            .set_default("logging.file", "./logs/app.log")?
            .set_default("logging.json", false)?
            // Quality defaults
            .set_default("quality.max_null_percentage", 10.0)?
            .set_default("quality.max_price_change_percentage", 20.0)?;

        Ok(builder)
    }

    /// Check values that deserialize fine but cannot be run with
    pub fn validate(&self) -> Result<()> {
        if self.ingestion.assets.is_empty() {
            bail!("ingestion.assets must list at least one asset identifier");
        }
        if self.ingestion.assets.iter().any(|id| id.trim().is_empty()) {
            bail!("ingestion.assets must not contain blank identifiers");
        }
        if self.ingestion.request_timeout_secs == 0 {
            bail!("ingestion.request_timeout_secs must be greater than 0");
        }
        if self.ingestion.interval_secs == 0 {
            bail!("ingestion.interval_secs must be greater than 0");
        }
        if self.server.port == 0 {
            bail!("server.port must not be 0");
        }

        for (name, value) in [
            ("quality.max_null_percentage", self.quality.max_null_percentage),
            (
                "quality.max_price_change_percentage",
                self.quality.max_price_change_percentage,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{name} must be a finite, non-negative percentage");
            }
        }

        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "listen={}:{} assets={:?} interval={}s timeout={}s poll={}",
            self.server.host,
            self.server.port,
            self.ingestion.assets,
            self.ingestion.interval_secs,
            self.ingestion.request_timeout_secs,
            self.ingestion.poll_enabled
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
