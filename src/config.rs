use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub locator: LocatorConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_kind")]
    pub kind: String,
    #[serde(default)]
    pub export_path: Option<PathBuf>,
    #[serde(default = "default_osascript")]
    pub osascript: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: default_source_kind(),
            export_path: None,
            osascript: default_osascript(),
        }
    }
}

fn default_source_kind() -> String {
    "apple-notes".to_string()
}
fn default_osascript() -> String {
    "osascript".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub vector_store_id: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            vector_store_id: None,
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_poll_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Upper bound on in-flight remote calls within a category.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_max_delete_fraction")]
    pub max_delete_fraction: f64,
    #[serde(default = "default_guard_min_tracked")]
    pub guard_min_tracked: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            max_delete_fraction: default_max_delete_fraction(),
            guard_min_tracked: default_guard_min_tracked(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}
fn default_max_attempts() -> u32 {
    4
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_max_ms() -> u64 {
    32_000
}
fn default_max_delete_fraction() -> f64 {
    0.5
}
fn default_guard_min_tracked() -> usize {
    10
}

impl SyncConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocatorConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_note_store_path")]
    pub note_store_path: PathBuf,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            note_store_path: default_note_store_path(),
        }
    }
}

fn default_note_store_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join("Library/Group Containers/group.com.apple.notes/NoteStore.sqlite")
}

impl Config {
    /// Config with defaults everywhere except the database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            source: SourceConfig::default(),
            remote: RemoteConfig::default(),
            sync: SyncConfig::default(),
            locator: LocatorConfig::default(),
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

fn validate(config: &Config) -> Result<()> {
    match config.source.kind.as_str() {
        "apple-notes" => {}
        "export" => {
            if config.source.export_path.is_none() {
                anyhow::bail!("source.export_path must be set when source.kind is 'export'");
            }
        }
        other => anyhow::bail!(
            "Unknown note source: '{}'. Must be apple-notes or export.",
            other
        ),
    }

    if config.sync.concurrency == 0 {
        anyhow::bail!("sync.concurrency must be >= 1");
    }
    if config.sync.max_attempts == 0 {
        anyhow::bail!("sync.max_attempts must be >= 1");
    }
    if config.sync.backoff_max_ms < config.sync.backoff_base_ms {
        anyhow::bail!("sync.backoff_max_ms must be >= sync.backoff_base_ms");
    }
    if !(config.sync.max_delete_fraction > 0.0 && config.sync.max_delete_fraction <= 1.0) {
        anyhow::bail!("sync.max_delete_fraction must be in (0.0, 1.0]");
    }

    if config.remote.timeout_secs == 0 {
        anyhow::bail!("remote.timeout_secs must be > 0");
    }
    if !config.remote.base_url.starts_with("http://") && !config.remote.base_url.starts_with("https://") {
        anyhow::bail!("remote.base_url must be an http(s) URL");
    }

    Ok(())
}
