use anyhow::{Context, Result};
use chrono::TimeDelta;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::{debug, warn};

const DEFAULT_STALENESS_MINUTES: i64 = 6 * 60;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    #[serde(default = "default_exchange_rate")]
    pub exchange_rate: SourceConfig,
    #[serde(default = "default_coingecko")]
    pub coingecko: SourceConfig,
}

fn default_exchange_rate() -> SourceConfig {
    SourceConfig {
        base_url: "https://api.exchangerate-api.com/v4".to_string(),
        timeout_secs: default_timeout_secs(),
    }
}

fn default_coingecko() -> SourceConfig {
    SourceConfig {
        base_url: "https://api.coingecko.com/api/v3".to_string(),
        timeout_secs: default_timeout_secs(),
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            exchange_rate: default_exchange_rate(),
            coingecko: default_coingecko(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub base_currency: String,
    /// Age after which cached rates are refetched.
    pub staleness_minutes: i64,
    pub max_currencies: usize,
    /// Selection used on first launch or when the stored one is unreadable.
    pub default_currencies: Vec<String>,
    /// Always report the base currency at 1.0 in fetched tables.
    pub include_base_rate: bool,
    pub providers: ProvidersConfig,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            base_currency: "USD".to_string(),
            staleness_minutes: DEFAULT_STALENESS_MINUTES,
            max_currencies: 50,
            default_currencies: ["USD", "CNY", "RUB", "BTC"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
            include_base_rate: true,
            providers: ProvidersConfig::default(),
            data_path: None,
        }
    }
}

impl AppConfig {
    /// Loads the default config file, or defaults when none exists yet.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// `staleness_minutes` as a duration. Negative or out-of-range values
    /// fall back to the default window.
    pub fn staleness_window(&self) -> TimeDelta {
        let window = if self.staleness_minutes < 0 {
            None
        } else {
            TimeDelta::try_minutes(self.staleness_minutes)
        };
        window.unwrap_or_else(|| {
            warn!(
                staleness_minutes = self.staleness_minutes,
                "Invalid staleness window, using {DEFAULT_STALENESS_MINUTES} minutes"
            );
            TimeDelta::minutes(DEFAULT_STALENESS_MINUTES)
        })
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "codito", "xcur")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("in", "codito", "xcur")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
