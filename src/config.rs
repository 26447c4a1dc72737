use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;
use crate::uploader::retry::RetryPolicy;
use crate::uploader::types::UploadTarget;

const APP_DIR_NAME: &str = "Photo Drop Uploader";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub webhook_url: Option<String>,
    pub thread_id: Option<String>,
    pub max_file_size_mb: f64,
    pub inter_file_delay_ms: u64,
    pub max_rate_limit_retries: u32,
    pub request_timeout_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            webhook_url: None,
            thread_id: None,
            max_file_size_mb: 10.0,
            inter_file_delay_ms: 1000,
            max_rate_limit_retries: 5,
            request_timeout_secs: 120,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn max_bytes(&self) -> u64 {
        (self.max_file_size_mb * 1024.0 * 1024.0) as u64
    }

    pub fn upload_target(&self) -> UploadTarget {
        UploadTarget {
            endpoint_url: self
                .webhook_url
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            thread_id: self
                .thread_id
                .as_deref()
                .map(str::trim)
                .filter(|tid| !tid.is_empty())
                .map(str::to_string),
            max_bytes: self.max_bytes(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_retries(self.max_rate_limit_retries)
    }

    pub fn inter_file_delay(&self) -> Duration {
        Duration::from_millis(self.inter_file_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

pub fn get_config_path() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| AppError::Config("Could not find config directory".to_string()))?
        .join(APP_DIR_NAME);

    fs::create_dir_all(&config_dir)?;
    Ok(config_dir.join("config.json"))
}

pub fn load_config() -> AppResult<Config> {
    load_config_from(&get_config_path()?)
}

pub fn load_config_from(config_path: &Path) -> AppResult<Config> {
    let config = read_config_from(config_path)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn read_config() -> AppResult<Config> {
    read_config_from(&get_config_path()?)
}

/// Like `load_config_from` but without validation, so a broken file can
/// still be shown and repaired
pub fn read_config_from(config_path: &Path) -> AppResult<Config> {
    if config_path.exists() {
        let config_str = fs::read_to_string(config_path)?;
        Ok(serde_json::from_str(&config_str).unwrap_or_else(|e| {
            log::warn!("Failed to parse config file: {}. Using defaults.", e);
            Config::default()
        }))
    } else {
        let default_config = Config::default();
        save_config_internal(config_path, &default_config)?;
        Ok(default_config)
    }
}

pub fn save_config(config: &Config) -> AppResult<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn save_config_to(config_path: &Path, config: &Config) -> AppResult<()> {
    validate_config(config)?;
    save_config_internal(config_path, config)
}

fn save_config_internal(config_path: &Path, config: &Config) -> AppResult<()> {
    if config_path.exists() {
        let backup_path = config_path.with_extension("json.bak");
        if let Err(e) = fs::copy(config_path, &backup_path) {
            log::warn!("Failed to create config backup: {}", e);
        }
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let config_str = serde_json::to_string_pretty(config)?;
    fs::write(config_path, config_str)?;

    log::info!("Configuration saved to {}", config_path.display());
    Ok(())
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    if let Some(url) = config.webhook_url.as_deref() {
        if !url.trim().is_empty() {
            InputValidator::validate_endpoint_url(url)?;
        }
    }

    if !config.max_file_size_mb.is_finite() || config.max_file_size_mb <= 0.0 {
        return Err(AppError::validation("max_file_size_mb", "Must be greater than 0"));
    }

    if config.inter_file_delay_ms < 100 {
        return Err(AppError::validation("inter_file_delay_ms", "Must be at least 100ms"));
    }

    if config.max_rate_limit_retries > 10 {
        return Err(AppError::validation("max_rate_limit_retries", "Must be 10 or fewer"));
    }

    if config.request_timeout_secs == 0 {
        return Err(AppError::validation("request_timeout_secs", "Must be greater than 0"));
    }

    let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
    if !valid_log_levels.contains(&config.log_level.as_str()) {
        return Err(AppError::validation("log_level", "Must be a valid log level"));
    }

    Ok(())
}

pub fn reset_config() -> AppResult<()> {
    reset_config_at(&get_config_path()?)
}

pub fn reset_config_at(config_path: &Path) -> AppResult<()> {
    if config_path.exists() {
        let backup_path = config_path.with_extension("json.reset_backup");
        fs::copy(config_path, &backup_path)?;
        log::info!("Existing config backed up to {}", backup_path.display());
    }

    save_config_internal(config_path, &Config::default())?;

    log::info!("Configuration reset to defaults");
    Ok(())
}
