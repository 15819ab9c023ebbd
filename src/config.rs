use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the record store, e.g. "http://127.0.0.1:8090"
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Login identity (email) for the record store user
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub password: String,
    /// Per-request timeout for record store calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Seconds between automatic refreshes of the task list in the TUI
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default)]
    pub key_bindings: KeyBindings,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyBindings {
    #[serde(default = "default_quit")]
    pub quit: String,
    #[serde(default = "default_new_task")]
    pub new_task: String,
    #[serde(default = "default_toggle_done")]
    pub toggle_done: String,
    #[serde(default = "default_archive")]
    pub archive: String,
    #[serde(default = "default_cancel_task")]
    pub cancel_task: String,
    #[serde(default = "default_prepare_day")]
    pub prepare_day: String,
    #[serde(default = "default_refresh")]
    pub refresh: String,
    #[serde(default = "default_list_up")]
    pub list_up: String,
    #[serde(default = "default_list_down")]
    pub list_down: String,
    #[serde(default = "default_tab_left")]
    pub tab_left: String,
    #[serde(default = "default_tab_right")]
    pub tab_right: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            identity: String::new(),
            password: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            sync_interval_secs: default_sync_interval_secs(),
            key_bindings: KeyBindings::default(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            quit: default_quit(),
            new_task: default_new_task(),
            toggle_done: default_toggle_done(),
            archive: default_archive(),
            cancel_task: default_cancel_task(),
            prepare_day: default_prepare_day(),
            refresh: default_refresh(),
            list_up: default_list_up(),
            list_down: default_list_down(),
            tab_left: default_tab_left(),
            tab_right: default_tab_right(),
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    "http://127.0.0.1:8090".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_quit() -> String {
    "q".to_string()
}

fn default_new_task() -> String {
    "n".to_string()
}

fn default_toggle_done() -> String {
    "Space".to_string()
}

fn default_archive() -> String {
    "d".to_string()
}

fn default_cancel_task() -> String {
    "x".to_string()
}

fn default_prepare_day() -> String {
    "p".to_string()
}

fn default_refresh() -> String {
    "F5".to_string()
}

fn default_list_up() -> String {
    "k".to_string()
}

fn default_list_down() -> String {
    "j".to_string()
}

fn default_tab_left() -> String {
    "Left".to_string()
}

fn default_tab_right() -> String {
    "Right".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
}

impl Config {
    /// Load configuration from file, or create a default one if missing.
    /// The profile determines which config directory is used.
    pub fn load_with_profile(profile: utils::Profile) -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path(profile)?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            let mut config = Config::default();
            config.save_with_profile(profile)?;
            Ok(config)
        }
    }

    /// Load configuration from file, using the production profile
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_profile(utils::Profile::Prod)
    }

    /// Save configuration to file
    pub fn save_with_profile(&mut self, profile: utils::Profile) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        let config_path = Self::get_config_path(profile)?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, toml_string).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile).ok_or_else(|| {
            ConfigError::ConfigDirError("Could not determine config directory".to_string())
        })?;
        Ok(config_dir.join("config.toml"))
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync_interval_secs)
    }
}
