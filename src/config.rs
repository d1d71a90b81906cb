use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::models::RecordKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub debounce: DebounceConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub indices: IndicesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub app_id: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub host: Option<String>,
}

impl ServiceConfig {
    /// Base URL of the search service.
    pub fn host(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| format!("https://{}-dsn.algolia.net", self.app_id.to_lowercase()))
    }
}

fn default_api_key_env() -> String {
    "SEARCH_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_timeouts_ms")]
    pub timeouts_ms: Vec<u64>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_factor_ms")]
    pub delay_factor_ms: u64,
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeouts_ms: default_timeouts_ms(),
            max_attempts: default_max_attempts(),
            delay_factor_ms: default_delay_factor_ms(),
            randomization_factor: default_randomization_factor(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_timeouts_ms() -> Vec<u64> {
    vec![3000, 5000, 8000]
}
fn default_max_attempts() -> u32 {
    3
}
fn default_delay_factor_ms() -> u64 {
    250
}
fn default_randomization_factor() -> f64 {
    0.5
}
fn default_max_delay_ms() -> u64 {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebounceConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
        }
    }
}

impl DebounceConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

fn default_window_ms() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct LookupConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            id_field: default_id_field(),
        }
    }
}

fn default_chunk_size() -> usize {
    100
}
fn default_id_field() -> String {
    "objectID".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IndicesConfig {
    /// Logical indices without sorted replicas.
    #[serde(default)]
    pub unsortable: Vec<String>,
    /// Record shape per logical index; unlisted indices decode as generic.
    #[serde(default)]
    pub kinds: HashMap<String, RecordKind>,
}

impl Config {
    /// A config pointing at `app_id` with every other setting at its default.
    pub fn minimal(app_id: &str) -> Self {
        Self {
            service: ServiceConfig {
                app_id: app_id.to_string(),
                api_key_env: default_api_key_env(),
                host: None,
            },
            retry: RetryConfig::default(),
            debounce: DebounceConfig::default(),
            lookup: LookupConfig::default(),
            indices: IndicesConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.service.app_id.trim().is_empty() {
        anyhow::bail!("service.app_id must not be empty");
    }

    // Validate retry
    let retry = &config.retry;
    if retry.timeouts_ms.is_empty() {
        anyhow::bail!("retry.timeouts_ms must list at least one timeout");
    }
    if retry.timeouts_ms.contains(&0) {
        anyhow::bail!("retry.timeouts_ms values must be > 0");
    }
    if retry.max_attempts < 1 {
        anyhow::bail!("retry.max_attempts must be >= 1");
    }
    if !(0.0..=1.0).contains(&retry.randomization_factor) {
        anyhow::bail!("retry.randomization_factor must be in [0.0, 1.0]");
    }
    if retry.max_delay_ms < retry.delay_factor_ms {
        anyhow::bail!("retry.max_delay_ms must be >= retry.delay_factor_ms");
    }

    // Validate lookup
    if !(1..=1000).contains(&config.lookup.chunk_size) {
        anyhow::bail!("lookup.chunk_size must be in [1, 1000]");
    }
    if config.lookup.id_field.trim().is_empty() {
        anyhow::bail!("lookup.id_field must not be empty");
    }

    Ok(())
}
