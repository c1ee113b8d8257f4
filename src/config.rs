use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::engine::EngineOptions;
use crate::strategy::StrategyKind;

/// Root configuration structure, deserialized from `.license-autoid/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub run: RunConfig,
}

/// Where and as whom to connect.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// Prefer `LICENSE_AUTOID_PASSWORD` over storing this in a file.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// What to identify and how.
#[derive(Debug, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(default = "default_true")]
    pub refresh: bool,
    #[serde(default = "default_max_passes")]
    pub max_passes: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_start_path")]
    pub start_path: String,
    /// Candidates scoring lower are left pending by the code-match strategy.
    #[serde(default)]
    pub min_score: u8,
    #[serde(default = "default_program_name")]
    pub program_name: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            project: None,
            strategy: StrategyKind::default(),
            refresh: true,
            max_passes: default_max_passes(),
            batch_size: default_batch_size(),
            start_path: default_start_path(),
            min_score: 0,
            program_name: default_program_name(),
        }
    }
}

impl RunConfig {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            refresh_enabled: self.refresh,
            max_passes: self.max_passes,
            batch_size: self.batch_size,
            start_path: self.start_path.clone(),
            ..Default::default()
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_passes() -> u32 {
    10
}

fn default_batch_size() -> usize {
    100
}

fn default_start_path() -> String {
    "/".to_string()
}

fn default_program_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

/// Load configuration, searching in order:
///
/// 1. `config_override`: path passed via `--config`
/// 2. `<working_dir>/.license-autoid/config.toml`
/// 3. `~/.config/license-autoid/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(working_dir: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        return read_config(path);
    }

    let local_config = working_dir.join(".license-autoid").join("config.toml");
    if local_config.exists() {
        return read_config(&local_config);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home
            .join(".config")
            .join("license-autoid")
            .join("config.toml");
        if home_config.exists() {
            return read_config(&home_config);
        }
    }

    Ok(Config::default())
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}
