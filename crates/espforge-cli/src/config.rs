//! Configuration loading

use anyhow::{Context, Result};
use espforge_core::DeviceSettings;
use espforge_scraper::crawler::{
    CrawlConfig, DEFAULT_COMPONENTS_ROOT, DEFAULT_MAX_COMPONENTS,
};
use espforge_scraper::DEFAULT_USER_AGENT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    /// Defaults for new projects
    #[serde(default)]
    pub device: DeviceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding components, documents and projects
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./espforge-data")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Documentation site root
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path of the component listing page
    #[serde(default = "default_components_root")]
    pub listing_path: String,
    /// Path prefix component pages live under
    #[serde(default = "default_components_root")]
    pub components_root: String,
    #[serde(default = "default_max_components")]
    pub max_components: usize,
    /// Pause between page requests in milliseconds
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            listing_path: default_components_root(),
            components_root: default_components_root(),
            max_components: default_max_components(),
            request_delay_ms: default_request_delay_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://esphome.io".to_string()
}

fn default_components_root() -> String {
    DEFAULT_COMPONENTS_ROOT.to_string()
}

fn default_max_components() -> usize {
    DEFAULT_MAX_COMPONENTS
}

fn default_request_delay_ms() -> u64 {
    2000
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

impl CrawlerConfig {
    pub fn listing_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.listing_path.trim_start_matches('/')
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Convert to a CrawlConfig, applying command-line overrides
    pub fn to_crawl_config(&self, listing_url: Option<String>, max: Option<usize>) -> CrawlConfig {
        CrawlConfig {
            listing_url: listing_url.unwrap_or_else(|| self.listing_url()),
            components_root: self.components_root.clone(),
            max_components: max.unwrap_or(self.max_components),
            request_delay: Duration::from_millis(self.request_delay_ms),
        }
    }
}

/// Load configuration from file, falling back to defaults when it is missing
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
