//! Engine configuration via `tessera.toml`
//!
//! On first start a commented default `tessera.toml` is written to the data
//! directory. To change settings, edit the file and restart.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_core::{Error, Result};

/// Config file name placed in the engine data directory.
pub const CONFIG_FILE_NAME: &str = "tessera.toml";

/// What a query does when some shards fail or time out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Abort with `PartialShardFailure`
    #[default]
    FailFast,
    /// Merge the shards that answered and flag the result as partial
    Degrade,
}

/// Engine configuration loaded from `tessera.toml`.
///
/// # Example
///
/// ```toml
/// shard_timeout_ms = 5000
/// query_timeout_ms = 30000
/// failure_policy = "fail_fast"
/// stream_buffer = 64
/// checkpoint_interval = 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Longest wait for a single shard response or stream item.
    #[serde(default = "default_shard_timeout_ms")]
    pub shard_timeout_ms: u64,
    /// Deadline for a whole query when the request sets none.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// `"fail_fast"` or `"degrade"`.
    #[serde(default = "default_failure_policy_str")]
    pub failure_policy: String,
    /// Per-shard stream channel capacity (documents buffered per shard).
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    /// Documents rewritten between reindex checkpoints.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    /// Directory for index settings and reindex checkpoints.
    /// Unset means everything is kept in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_shard_timeout_ms() -> u64 {
    5000
}

fn default_query_timeout_ms() -> u64 {
    30_000
}

fn default_failure_policy_str() -> String {
    "fail_fast".to_string()
}

fn default_stream_buffer() -> usize {
    64
}

fn default_checkpoint_interval() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shard_timeout_ms: default_shard_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            failure_policy: default_failure_policy_str(),
            stream_buffer: default_stream_buffer(),
            checkpoint_interval: default_checkpoint_interval(),
            data_dir: None,
        }
    }
}

impl EngineConfig {
    /// Parse the failure policy string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not `"fail_fast"` or `"degrade"`.
    pub fn failure_policy(&self) -> Result<FailurePolicy> {
        match self.failure_policy.as_str() {
            "fail_fast" => Ok(FailurePolicy::FailFast),
            "degrade" => Ok(FailurePolicy::Degrade),
            other => Err(Error::Config(format!(
                "Invalid failure policy '{}' in tessera.toml. Expected \"fail_fast\" or \"degrade\".",
                other
            ))),
        }
    }

    /// Builder: set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = match policy {
            FailurePolicy::FailFast => "fail_fast",
            FailurePolicy::Degrade => "degrade",
        }
        .to_string();
        self
    }

    /// Builder: set the shard timeout.
    pub fn with_shard_timeout(mut self, timeout: Duration) -> Self {
        self.shard_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder: set the reindex checkpoint interval.
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Builder: set the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Shard timeout as a `Duration`.
    pub fn shard_timeout(&self) -> Duration {
        Duration::from_millis(self.shard_timeout_ms)
    }

    /// Default query deadline as a `Duration`.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Check every setting.
    pub fn validate(&self) -> Result<()> {
        self.failure_policy()?;
        if self.shard_timeout_ms == 0 {
            return Err(Error::Config("shard_timeout_ms must be positive".into()));
        }
        if self.query_timeout_ms == 0 {
            return Err(Error::Config("query_timeout_ms must be positive".into()));
        }
        if self.stream_buffer == 0 {
            return Err(Error::Config("stream_buffer must be positive".into()));
        }
        if self.checkpoint_interval == 0 {
            return Err(Error::Config("checkpoint_interval must be positive".into()));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tessera engine configuration
#
# Longest wait (ms) for one shard to answer or to produce its next result.
shard_timeout_ms = 5000

# Deadline (ms) for a whole query when the request does not set one.
query_timeout_ms = 30000

# What a query does when shards fail: "fail_fast" (default) or "degrade"
#   "fail_fast" = return PartialShardFailure naming the failed shards
#   "degrade"   = merge the shards that answered, flag the result as partial
failure_policy = "fail_fast"

# Documents buffered per shard stream during a merge.
stream_buffer = 64

# Documents rewritten between reindex checkpoints.
checkpoint_interval = 100

# Directory for index settings and reindex checkpoints (default: in memory)
# data_dir = "/var/lib/tessera"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EngineConfig = toml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
