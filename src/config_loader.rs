use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn, Level};

use crate::hash_ledger::HashAlgorithm;

// Define error types for config loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(String),
}

// Result type alias for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

// Config structs for config.toml
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Paths {
    pub download_directory: String,
    pub ledger_file: String,
    pub log_directory: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Sources {
    pub base_url: String,
    pub subreddits: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Search {
    pub default_limit: usize,
    pub min_score: i64,
    pub hot_limit: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub image_extensions: Vec<String>,
    /// Hot posts normally pad the results regardless of their title.
    pub fallback_requires_keyword: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Pools {
    pub max_download_concurrency: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Dedup {
    pub algorithm: HashAlgorithm,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Logging {
    pub log_level: String,
    pub log_format: String,
    pub log_to_file: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Viewer {
    pub open_after_download: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub paths: Paths,
    pub sources: Sources,
    pub search: Search,
    pub pools: Pools,
    pub dedup: Dedup,
    pub logging: Logging,
    pub viewer: Viewer,
}

// Default implementation for AppConfig
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: Paths {
                download_directory: "Memes".to_string(),
                ledger_file: "downloaded_hashes.txt".to_string(),
                log_directory: "./logs".to_string(),
            },
            sources: Sources {
                base_url: "https://www.reddit.com".to_string(),
                subreddits: [
                    "memes",
                    "dankmemes",
                    "funny",
                    "wholesomememes",
                    "PrequelMemes",
                    "terriblefacebookmemes",
                    "cars",
                    "carporn",
                    "Shitty_Car_Mods",
                    "CarMemes",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            search: Search {
                default_limit: 5,
                min_score: 100,
                hot_limit: 25,
                request_timeout_secs: 5,
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36".to_string(),
                image_extensions: vec![".jpg".to_string(), ".jpeg".to_string(), ".png".to_string()],
                fallback_requires_keyword: false,
            },
            pools: Pools {
                max_download_concurrency: 5,
            },
            dedup: Dedup {
                algorithm: HashAlgorithm::Sha256,
            },
            logging: Logging {
                log_level: "info".to_string(),
                log_format: "text".to_string(),
                log_to_file: true,
            },
            viewer: Viewer {
                open_after_download: true,
            },
        }
    }
}

/// Something worth reporting that happened while loading the config.
/// Loading runs before the logger exists, so these are replayed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigNotice {
    pub level: Level,
    pub message: String,
}

impl ConfigNotice {
    fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// Emits the notice through `tracing`.
    pub fn log(&self) {
        match self.level {
            Level::ERROR => error!("{}", self.message),
            Level::WARN => warn!("{}", self.message),
            _ => info!("{}", self.message),
        }
    }
}

/// Loads `config.toml` from a config directory, creating it with defaults when missing.
pub struct ConfigManager {
    app_config: AppConfig,
    config_dir: PathBuf,
    notices: Vec<ConfigNotice>,
}

impl ConfigManager {
    // Create a new ConfigManager instance
    pub fn new(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let mut notices = Vec::new();

        // Create the directory if it doesn't exist
        if !config_dir.exists() {
            notices.push(ConfigNotice::new(
                Level::INFO,
                format!("Creating config directory: {}", config_dir.display()),
            ));
            fs::create_dir_all(&config_dir)?;
        }

        let app_config = Self::load_app_config(&config_dir, &mut notices)?;

        let mut manager = Self {
            app_config,
            config_dir,
            notices,
        };

        manager.create_default_config()?;

        Ok(manager)
    }

    // Load app config from config.toml
    fn load_app_config(
        config_dir: &Path,
        notices: &mut Vec<ConfigNotice>,
    ) -> ConfigResult<AppConfig> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            notices.push(ConfigNotice::new(
                Level::WARN,
                format!("Config file not found: {}", config_path.display()),
            ));
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&config_path)?;
        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                notices.push(ConfigNotice::new(
                    Level::ERROR,
                    format!("Failed to parse {}: {}", CONFIG_FILE_NAME, e),
                ));

                // Backup the old config file
                let backup_path = config_path.with_extension("toml.backup");
                match fs::rename(&config_path, &backup_path) {
                    Ok(()) => notices.push(ConfigNotice::new(
                        Level::WARN,
                        format!("Backed up old config to {}", backup_path.display()),
                    )),
                    Err(backup_err) => notices.push(ConfigNotice::new(
                        Level::WARN,
                        format!("Failed to backup old config: {}", backup_err),
                    )),
                }

                let default_config = AppConfig::default();
                let toml_string = toml::to_string_pretty(&default_config)
                    .map_err(|e| ConfigError::TomlSer(e.to_string()))?;
                let notice = match fs::write(&config_path, toml_string) {
                    Ok(()) => ConfigNotice::new(
                        Level::WARN,
                        format!("Created new {} with default values", CONFIG_FILE_NAME),
                    ),
                    Err(write_err) => ConfigNotice::new(
                        Level::ERROR,
                        format!("Failed to write new config file: {}", write_err),
                    ),
                };
                notices.push(notice);

                Ok(default_config)
            }
        }
    }

    // Get app config
    pub fn get_app_config(&self) -> AppConfig {
        self.app_config.clone()
    }

    /// Messages collected while loading, oldest first.
    pub fn notices(&self) -> &[ConfigNotice] {
        &self.notices
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    // Create the default config file if it doesn't exist
    fn create_default_config(&mut self) -> ConfigResult<()> {
        let config_path = self.config_path();
        if !config_path.exists() {
            let toml_string = toml::to_string_pretty(&self.app_config)
                .map_err(|e| ConfigError::TomlSer(e.to_string()))?;
            fs::write(&config_path, toml_string)?;
            self.notices.push(ConfigNotice::new(
                Level::WARN,
                format!("Wrote default configuration to {}", config_path.display()),
            ));
        }
        Ok(())
    }
}

// Helper function to create a ConfigManager instance
pub fn init_config(config_dir: impl AsRef<Path>) -> ConfigResult<ConfigManager> {
    ConfigManager::new(config_dir)
}
