//! Configuration management for textsplit
//!
//! Settings are layered with figment (embedded defaults, user file, repository
//! file, environment) and extracted into the typed [`Settings`] tree below.

mod core;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::operations::OperationKind;
use crate::service::{ExecutionMode, HostCapabilities, ServiceOptions};
use crate::worker::PoolSettings;

pub use self::core::TextsplitConfig;

/// Fully merged configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub pool: PoolConfig,
    pub worker: WorkerConfig,
    pub timeouts: TimeoutConfig,
    pub backend: BackendConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: ExecutionMode,
    /// Run non-native calls on pooled worker threads
    pub worker_threads: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Auto,
            worker_threads: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub release_delay_ms: u64,
    pub ping_grace_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            sweep_interval_secs: 10,
            release_delay_ms: 500,
            ping_grace_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Lines per chunk, 0 for whole-text processing
    pub chunk_lines: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { chunk_lines: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub split_secs: u64,
    pub diff_secs: u64,
    pub filter_secs: u64,
    pub remove_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            split_secs: OperationKind::Split.default_timeout().as_secs(),
            diff_secs: OperationKind::Diff.default_timeout().as_secs(),
            filter_secs: OperationKind::Filter.default_timeout().as_secs(),
            remove_secs: OperationKind::Remove.default_timeout().as_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn for_kind(&self, kind: OperationKind) -> Duration {
        let secs = match kind {
            OperationKind::Split => self.split_secs,
            OperationKind::Diff => self.diff_secs,
            OperationKind::Filter => self.filter_secs,
            OperationKind::Remove => self.remove_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub enabled: bool,
    /// Program and arguments of the native service. Empty means `<current exe> serve`.
    pub command: Vec<String>,
    pub probe_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: Vec::new(),
            probe_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub history: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { history: 10 }
    }
}

/// Floor for `pool.release_delay_ms`. A [`PoolSettings`] built directly is
/// not clamped.
pub const MIN_RELEASE_DELAY_MS: u64 = 500;

impl Settings {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            idle_timeout: Duration::from_secs(self.pool.idle_timeout_secs),
            sweep_interval: Duration::from_secs(self.pool.sweep_interval_secs.max(1)),
            release_delay: Duration::from_millis(self.pool.release_delay_ms.max(MIN_RELEASE_DELAY_MS)),
            ping_grace: Duration::from_millis(self.pool.ping_grace_ms),
        }
    }

    pub fn service_options(&self, kind: OperationKind) -> ServiceOptions {
        ServiceOptions {
            capabilities: HostCapabilities {
                worker_threads: self.engine.worker_threads,
            },
            timeout: self.timeouts.for_kind(kind),
            chunk_lines: self.worker.chunk_lines,
            history: self.metrics.history,
        }
    }
}
