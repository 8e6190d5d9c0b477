//! Lock manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing policy for exclusive requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Time leases get to release voluntarily after being revoked, before
    /// their attached processes are killed. Zero kills immediately.
    pub kill_grace_ms: u64,
    /// Upper bound on waiting for revoked leases to drain. Leases still
    /// held after this are evicted and the exclusive operation proceeds.
    pub drain_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            kill_grace_ms: 0,
            drain_timeout_ms: 5_000,
        }
    }
}

impl LockConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout_ms = timeout.as_millis() as u64;
        self
    }
}
