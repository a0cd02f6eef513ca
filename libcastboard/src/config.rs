//! Configuration management for Castboard

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::Target;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Settings for the publishing cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Seconds between cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Posts processed concurrently within one cycle
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Seconds a claimed post stays reserved for the cycle that claimed it
    #[serde(default = "default_claim_lease")]
    pub claim_lease: u64,
    /// Delivery attempts per target for transient faults
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff in seconds between attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            workers: default_workers(),
            claim_lease: default_claim_lease(),
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
        }
    }
}

/// Highest accepted `scheduling.max_attempts`
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Ceiling for a single retry backoff
pub const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Backoff before retrying after failed attempt number `attempt` (1-based):
/// `base * 2^(attempt - 1)`, never more than [`MAX_BACKOFF`]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2_u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

impl SchedulingConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    /// Total backoff one target can spend sleeping between its attempts
    pub fn retry_budget(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| backoff_delay(self.retry_delay(), attempt))
            .sum()
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(invalid("scheduling.workers", "must be at least 1"));
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(invalid(
                "scheduling.max_attempts",
                &format!("must be between 1 and {}", MAX_ATTEMPTS_LIMIT),
            ));
        }
        if self.claim_lease == 0 {
            return Err(invalid("scheduling.claim_lease", "must be at least 1 second"));
        }
        let budget = self.retry_budget().as_secs();
        if self.claim_lease <= budget {
            return Err(invalid(
                "scheduling.claim_lease",
                &format!(
                    "must be longer than the retry backoff budget of {}s per target",
                    budget
                ),
            ));
        }
        Ok(())
    }
}

/// A target seeded into the registry at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub max_content_length: Option<usize>,
}

impl From<&TargetConfig> for Target {
    fn from(config: &TargetConfig) -> Self {
        Target {
            id: config.id.clone(),
            name: config.name.clone(),
            kind: config.kind.clone(),
            max_content_length: config.max_content_length,
        }
    }
}

fn default_poll_interval() -> u64 {
    60
}

fn default_workers() -> usize {
    1
}

fn default_claim_lease() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1
}

fn default_targets() -> Vec<TargetConfig> {
    [
        ("twitter", "Twitter", 280),
        ("instagram", "Instagram", 2200),
        ("linkedin", "LinkedIn", 3000),
    ]
    .into_iter()
    .map(|(kind, name, limit)| TargetConfig {
        id: kind.to_string(),
        name: name.to_string(),
        kind: kind.to_string(),
        max_content_length: Some(limit),
    })
    .collect()
}

fn invalid(field: &str, reason: &str) -> crate::error::CastboardError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/castboard/castboard.db".to_string(),
            },
            scheduling: SchedulingConfig::default(),
            targets: default_targets(),
        }
    }

    fn validate(&self) -> Result<()> {
        self.scheduling.validate()?;
        for (i, target) in self.targets.iter().enumerate() {
            if target.id.trim().is_empty() {
                return Err(invalid(&format!("targets[{}].id", i), "cannot be empty"));
            }
            if self.targets[..i].iter().any(|t| t.id == target.id) {
                return Err(invalid(
                    &format!("targets[{}].id", i),
                    &format!("duplicate target id '{}'", target.id),
                ));
            }
        }
        Ok(())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CASTBOARD_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("castboard").join("config.toml"))
}

/// Resolve the database path.
///
/// `CASTBOARD_DB_PATH` wins over the configured path; without either the
/// database lives in the XDG data directory.
pub fn resolve_db_path(configured: Option<&str>) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CASTBOARD_DB_PATH") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    if let Some(path) = configured {
        return Ok(PathBuf::from(shellexpand::tilde(path).to_string()));
    }

    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("castboard").join("castboard.db"))
}
