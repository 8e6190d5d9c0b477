//! Dispatcher and hub tuning.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default worker slot count: a quarter of the available cores, plus one.
pub fn default_parallel_tasks() -> usize {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    cores / 4 + 1
}

/// Configuration for job scheduling and event delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of jobs allowed to run at once.
    pub parallel_tasks: usize,
    /// Minimum spacing between progress events for one job (milliseconds).
    pub update_throttle_ms: u64,
    /// How long a terminal job stays visible in the queue (milliseconds).
    pub retention_ms: u64,
    /// Number of evicted jobs still answerable by ID.
    pub graveyard_size: usize,
    /// Per-subscriber channel capacity.
    pub subscriber_buffer: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            parallel_tasks: default_parallel_tasks(),
            update_throttle_ms: 100,
            retention_ms: 1_000,
            graveyard_size: 10,
            subscriber_buffer: 100,
        }
    }
}

impl DispatcherConfig {
    pub fn with_parallel_tasks(mut self, parallel_tasks: usize) -> Self {
        self.parallel_tasks = parallel_tasks;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention_ms = retention.as_millis() as u64;
        self
    }

    pub fn with_update_throttle(mut self, throttle: Duration) -> Self {
        self.update_throttle_ms = throttle.as_millis() as u64;
        self
    }

    pub fn with_subscriber_buffer(mut self, capacity: usize) -> Self {
        self.subscriber_buffer = capacity;
        self
    }

    /// Worker slot count, never below one.
    pub fn slots(&self) -> usize {
        self.parallel_tasks.max(1)
    }

    pub fn update_throttle(&self) -> Duration {
        Duration::from_millis(self.update_throttle_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    /// Channel capacity, never below one.
    pub fn buffer(&self) -> usize {
        self.subscriber_buffer.max(1)
    }
}
