//! TOML configuration parsing and validation.
//!
//! See `config/feedbot.example.toml` for a complete example.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub comments: CommentsConfig,
    pub analysis: AnalysisConfig,
    pub platform: PlatformConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Location of the authored comment corpus.
#[derive(Debug, Deserialize, Clone)]
pub struct CommentsConfig {
    pub root: PathBuf,
    #[serde(default = "default_track")]
    pub track: String,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_track() -> String {
    "ruby".to_string()
}

impl CommentsConfig {
    /// Directory holding the comments for the supported track.
    pub fn track_dir(&self) -> PathBuf {
        self.root.join(&self.track)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    pub host: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlatformConfig {
    pub base_url: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_token_env() -> String {
    "FEEDBOT_PLATFORM_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_call_timeout_secs() -> u64 {
    60
}

impl WorkerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
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
    let track = config.comments.track.as_str();
    if track.trim().is_empty() {
        bail!("comments.track must not be empty");
    }
    if track.contains('/') || track.contains('\\') {
        bail!("comments.track must be a single directory name, got '{}'", track);
    }

    reqwest::Url::parse(&config.analysis.host)
        .with_context(|| format!("analysis.host is not a valid URL: {}", config.analysis.host))?;
    reqwest::Url::parse(&config.platform.base_url).with_context(|| {
        format!(
            "platform.base_url is not a valid URL: {}",
            config.platform.base_url
        )
    })?;

    if config.analysis.timeout_secs == 0 {
        bail!("analysis.timeout_secs must be >= 1");
    }
    if config.platform.timeout_secs == 0 {
        bail!("platform.timeout_secs must be >= 1");
    }
    if config.worker.concurrency == 0 {
        bail!("worker.concurrency must be >= 1");
    }
    if config.worker.call_timeout_secs == 0 {
        bail!("worker.call_timeout_secs must be >= 1");
    }

    Ok(())
}
