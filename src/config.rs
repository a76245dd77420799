//! Configuration management for shu-ismak.
//!
//! Loads config from YAML files in standard locations. Every section
//! carries its own defaults, so a partial file (or none) still yields a
//! complete `Config`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yml::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shu-ismak");
        Self { data_dir }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LessonsConfig {
    /// Lesson graph YAML. Empty means the built-in sample graph.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key_env: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub text_model: String,
    pub tts_model: String,
    pub voice: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key_env: "GEMINI_API_KEY".into(),
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".into(),
            text_model: "gemini-2.5-flash".into(),
            tts_model: "gemini-2.5-flash-preview-tts".into(),
            voice: "Kore".into(),
            timeout_secs: 60,
        }
    }
}

impl GeminiConfig {
    /// Inline key wins over the environment. Blank values count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        let present = |k: &String| !k.trim().is_empty();
        self.api_key
            .clone()
            .filter(present)
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(present))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub sample_rate: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rate: 24000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte budget for stored clips; `None` keeps everything.
    pub max_bytes: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: Some(256 * 1024 * 1024),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8780,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub lessons: LessonsConfig,
    pub gemini: GeminiConfig,
    pub audio: AudioConfig,
    pub cache: CacheConfig,
    pub api: ApiConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/shu-ismak/config.yaml
    /// 3. /etc/shu-ismak/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/shu-ismak/config.yaml")),
                Some(PathBuf::from("/etc/shu-ismak/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match Self::from_file(&config_path) {
            Ok(config) => {
                info!("Loaded config from {}", config_path.display());
                config
            }
            Err(e) => {
                warn!("{e}, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}
