//! Configuration loader that handles precedence

use crate::config::{CacheVolConfig, ConfigSource, FileConfig};
use cachevol_core::{
    Error, Result, CACHEVOL_CONFIG_VAR, CACHEVOL_FLUSH_INTERVAL_VAR, CACHEVOL_FLUSH_TIMEOUT_VAR,
    CACHEVOL_METADATA_DIR_VAR,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration loader that handles precedence
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration: defaults, then the config file, then environment
    pub fn load() -> Result<CacheVolConfig> {
        let path = Self::config_file_path();
        Self::load_from(path.as_deref())
    }

    /// Load configuration using an explicit config file path
    pub fn load_from(path: Option<&Path>) -> Result<CacheVolConfig> {
        let mut config = CacheVolConfig::default();

        if let Some(path) = path {
            if let Some(file_config) = Self::read_config_file(path)? {
                Self::apply_file(&mut config, file_config)?;
                config.source = ConfigSource::ConfigFile(path.to_path_buf());
            }
        }

        if Self::apply_env(&mut config)? {
            config.source = ConfigSource::EnvironmentVariable("CACHEVOL_*".to_string());
        }

        tracing::debug!(
            metadata_dir = %config.metadata_dir.display(),
            poll_interval = ?config.flush.poll_interval,
            timeout = ?config.flush.timeout,
            source = ?config.source,
            "configuration loaded"
        );
        Ok(config)
    }

    /// `CACHEVOL_CONFIG`, or `<config dir>/cachevol/config.json`
    fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CACHEVOL_CONFIG_VAR) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|d| d.join("cachevol").join("config.json"))
    }

    fn read_config_file(path: &Path) -> Result<Option<FileConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_system(path, "read config file", e))?;

        let parsed = serde_json::from_str(&content).map_err(|e| {
            Error::configuration(format!("invalid config file '{}': {e}", path.display()))
        })?;
        Ok(Some(parsed))
    }

    fn apply_file(config: &mut CacheVolConfig, file: FileConfig) -> Result<()> {
        if let Some(dir) = file.metadata_dir {
            config.metadata_dir = dir;
        }
        if let Some(flush) = file.flush {
            if let Some(ms) = flush.poll_interval_ms {
                config.flush.poll_interval = poll_interval("flush.poll_interval_ms", ms)?;
            }
            if let Some(secs) = flush.timeout_secs {
                config.flush.timeout = (secs > 0).then(|| Duration::from_secs(secs));
            }
        }
        Ok(())
    }

    /// Returns whether any environment variable was applied
    fn apply_env(config: &mut CacheVolConfig) -> Result<bool> {
        let mut applied = false;

        if let Ok(dir) = std::env::var(CACHEVOL_METADATA_DIR_VAR) {
            config.metadata_dir = PathBuf::from(dir);
            applied = true;
        }

        if let Ok(value) = std::env::var(CACHEVOL_FLUSH_INTERVAL_VAR) {
            let ms = parse_u64(CACHEVOL_FLUSH_INTERVAL_VAR, &value)?;
            config.flush.poll_interval = poll_interval(CACHEVOL_FLUSH_INTERVAL_VAR, ms)?;
            applied = true;
        }

        if let Ok(value) = std::env::var(CACHEVOL_FLUSH_TIMEOUT_VAR) {
            // 0 means no bound
            let secs = parse_u64(CACHEVOL_FLUSH_TIMEOUT_VAR, &value)?;
            config.flush.timeout = (secs > 0).then(|| Duration::from_secs(secs));
            applied = true;
        }

        Ok(applied)
    }
}

/// A zero interval would turn the flush wait into a busy loop of status queries
fn poll_interval(setting: &str, ms: u64) -> Result<Duration> {
    if ms == 0 {
        return Err(Error::configuration(format!(
            "{setting} must be at least 1 millisecond"
        )));
    }
    Ok(Duration::from_millis(ms))
}

fn parse_u64(var: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| Error::configuration(format!("{var}='{value}' is not a number: {e}")))
}
