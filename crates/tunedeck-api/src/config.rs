use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the music server, e.g. `http://nas.local:5000`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub password: String,
}

/// Local audio cache knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory cached audio files live in.
    /// Defaults to `<data dir>/cache`.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// How often to re-check the cache after requesting a download.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How many checks before giving up on a pending download.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// File the persisted catalog/state key-value store is written to.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            account: String::new(),
            password: String::new(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_attempts: default_poll_attempts(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_cache_dir() -> PathBuf {
    data_dir().join("cache")
}

fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_poll_attempts() -> u32 {
    15
}

fn default_state_file() -> PathBuf {
    data_dir().join("state.json")
}

pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tunedeck")
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tunedeck")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        config_dir().join("config.toml")
    }
}
