//! Engine configuration, with environment overrides.

use std::str::FromStr;
use std::time::Duration;

use actors::{DispatcherConfig, default_parallel_tasks};
use fs_lock::LockConfig;
use serde::{Deserialize, Serialize};

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid value {value:?} for {var}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

/// Combined configuration for the job dispatcher and the lock manager.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub jobs: DispatcherConfig,
    pub locks: LockConfig,
}

impl EngineConfig {
    /// Defaults, overridden by whichever of these variables are set:
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `ENGINE_PARALLEL_TASKS` | worker slots; zero or negative means automatic |
    /// | `ENGINE_UPDATE_THROTTLE_MS` | minimum spacing of progress events |
    /// | `ENGINE_JOB_RETENTION_MS` | how long terminal jobs stay in the queue |
    /// | `ENGINE_GRAVEYARD_SIZE` | evicted jobs still answerable by ID |
    /// | `ENGINE_SUBSCRIBER_BUFFER` | per-subscriber channel capacity |
    /// | `LOCK_KILL_GRACE_MS` | wait before killing revoked streams |
    /// | `LOCK_DRAIN_TIMEOUT_MS` | wait for revoked leases to release |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(n) = parse::<i64>(&lookup, "ENGINE_PARALLEL_TASKS")? {
            config.jobs.parallel_tasks = if n <= 0 {
                default_parallel_tasks()
            } else {
                n as usize
            };
        }
        if let Some(ms) = parse(&lookup, "ENGINE_UPDATE_THROTTLE_MS")? {
            config.jobs.update_throttle_ms = ms;
        }
        if let Some(ms) = parse(&lookup, "ENGINE_JOB_RETENTION_MS")? {
            config.jobs.retention_ms = ms;
        }
        if let Some(n) = parse(&lookup, "ENGINE_GRAVEYARD_SIZE")? {
            config.jobs.graveyard_size = n;
        }
        if let Some(n) = parse(&lookup, "ENGINE_SUBSCRIBER_BUFFER")? {
            config.jobs.subscriber_buffer = n;
        }
        if let Some(ms) = parse(&lookup, "LOCK_KILL_GRACE_MS")? {
            config.locks = config.locks.with_kill_grace(Duration::from_millis(ms));
        }
        if let Some(ms) = parse(&lookup, "LOCK_DRAIN_TIMEOUT_MS")? {
            config.locks = config.locks.with_drain_timeout(Duration::from_millis(ms));
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|_| ConfigError { var, value: raw })
}
