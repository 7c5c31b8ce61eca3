// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Environment variables that override values after parsing
pub const DEVICE_ID_ENV: &str = "DEVICE_ID";
pub const UPLOAD_URL_ENV: &str = "UPLOAD_URL";
pub const UPLOAD_API_TOKEN_ENV: &str = "UPLOAD_API_TOKEN";
pub const RECORDING_PATH_ENV: &str = "RECORDING_BASE_PATH";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RecordSyncConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        Self::parse(&content)
    }

    /// Load, then apply the process environment overrides
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<RecordSyncConfig> {
        let mut config = Self::load(path)?;
        Self::apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Override device id, upload endpoint and recording path from `lookup`,
    /// then validate again. HTTP overrides are ignored for other backends.
    pub fn apply_overrides<F>(config: &mut RecordSyncConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(device_id) = lookup(DEVICE_ID_ENV) {
            config.device.id = device_id;
        }

        if let Some(base_path) = lookup(RECORDING_PATH_ENV) {
            config.recording.base_path = PathBuf::from(base_path);
        }

        if let Some(http) = config.upload.backend_config.as_http_mut() {
            if let Some(url) = lookup(UPLOAD_URL_ENV) {
                http.url = url;
            }
            if let Some(token) = lookup(UPLOAD_API_TOKEN_ENV) {
                http.api_token = Some(token);
            }
        }

        Self::validate(config)
    }

    /// Parse configuration text with environment variable substitution
    pub fn parse(content: &str) -> Result<RecordSyncConfig> {
        let content = Self::substitute_env_vars(content)?;

        let config: RecordSyncConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${DEVICE_ID:-robot-001} -> robot-001 (if DEVICE_ID not set)
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")
            .context("Invalid substitution pattern")?;

        let replaced = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    // Keep original if no default and var not found
                    None => format!("${{{}}}", var_name),
                },
            }
        });

        Ok(replaced.to_string())
    }

    /// Validate configuration
    fn validate(config: &RecordSyncConfig) -> Result<()> {
        if config.device.id.trim().is_empty() {
            bail!("device.id cannot be empty");
        }

        let flush_policy = &config.recording.flush_policy;
        if flush_policy.max_buffer_size_bytes == 0 {
            bail!("flush_policy.max_buffer_size_bytes must be > 0");
        }

        if flush_policy.max_buffer_duration_seconds == 0 {
            bail!("flush_policy.max_buffer_duration_seconds must be > 0");
        }

        if flush_policy.queue_capacity == 0 {
            bail!("flush_policy.queue_capacity must be > 0");
        }

        if config.sync.storage_cap_bytes == 0 {
            bail!("sync.storage_cap_bytes must be > 0");
        }

        if config.sync.quota.budget_bytes == 0 {
            bail!("sync.quota.budget_bytes must be > 0");
        }

        if config.sync.quota.refresh_interval_seconds == 0 {
            bail!("sync.quota.refresh_interval_seconds must be > 0");
        }

        if config.sync.workers.upload_workers == 0 {
            bail!("sync.workers.upload_workers must be > 0");
        }

        if config.sync.archive.level > 4 {
            bail!("sync.archive.level must be 0-4");
        }

        match config.upload.backend.as_str() {
            "http" => {
                if config.upload.backend_config.as_http().is_none() {
                    bail!("http backend selected but http config missing");
                }
            }
            "filesystem" => {
                if config.upload.backend_config.as_filesystem().is_none() {
                    bail!("filesystem backend selected but filesystem config missing");
                }
            }
            unknown => bail!("Unknown upload backend: '{}'. Supported: http, filesystem", unknown),
        }

        Ok(())
    }
}
