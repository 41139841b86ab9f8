//! Configuration types and builder
use cachevol_core::DEFAULT_FLUSH_POLL_INTERVAL_MS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How the detach flush wait behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushConfig {
    /// Fixed sleep between dirty-block checks
    pub poll_interval: Duration,
    /// Give up after this long; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_FLUSH_POLL_INTERVAL_MS),
            timeout: None,
        }
    }
}

/// Complete cachevol configuration
#[derive(Debug, Clone)]
pub struct CacheVolConfig {
    /// Directory holding `<vg>.json`, `<vg>.json.pre` and `<vg>.lock`
    pub metadata_dir: PathBuf,
    /// Flush wait settings
    pub flush: FlushConfig,
    /// Where the last applied layer of configuration came from
    pub source: ConfigSource,
}

impl Default for CacheVolConfig {
    fn default() -> Self {
        Self {
            metadata_dir: default_metadata_dir(),
            flush: FlushConfig::default(),
            source: ConfigSource::Default,
        }
    }
}

fn default_metadata_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("cachevol"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/cachevol"))
}

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default configuration
    Default,
    /// Configuration file
    ConfigFile(PathBuf),
    /// Environment variable
    EnvironmentVariable(String),
    /// Command line argument
    CommandLine,
}

/// On-disk shape of the config file; every field is optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub metadata_dir: Option<PathBuf>,
    pub flush: Option<FileFlushConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileFlushConfig {
    pub poll_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// Builder for layering overrides on top of a loaded configuration
pub struct CacheVolConfigBuilder {
    config: CacheVolConfig,
}

impl CacheVolConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CacheVolConfig::default(),
        }
    }

    /// Start from an already loaded configuration
    pub fn from_config(config: CacheVolConfig) -> Self {
        Self { config }
    }

    pub fn with_metadata_dir(mut self, dir: PathBuf) -> Self {
        self.config.metadata_dir = dir;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.flush.poll_interval = interval;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.flush.timeout = timeout;
        self
    }

    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.config.source = source;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CacheVolConfig {
        self.config
    }
}

impl Default for CacheVolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
