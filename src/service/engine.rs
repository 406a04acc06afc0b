//! One engine per application: four services sharing a pool and a backend.
//!
//! Building an engine inside a tokio runtime also starts the pool's idle
//! sweep. The sweep task is aborted when the engine drops.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{ProgressCallback, TextService, lock};
use crate::backend::{ConnectArgs, NativeBackend, UnavailableBackend};
use crate::config::Settings;
use crate::diff::{DiffEntry, DiffGroups, DiffPair, WordDiff, group_diff_results, pair_diff_results, word_diffs};
use crate::envelope::{Envelope, Metrics};
use crate::error::ProcessingError;
use crate::operations::{
    Diff, DiffParams, Filter, FilterParams, OperationConfig, OperationKind, Remove, RemoveParams, Split,
    SplitParams, connect_texts,
};
use crate::worker::PoolRegistry;

/// Global routing preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Probe the backend on every call
    #[default]
    Auto,
    /// Always use the native backend
    Backend,
    /// Never use the native backend
    Fallback,
}

impl ExecutionMode {
    pub fn prefer_backend(self) -> Option<bool> {
        match self {
            ExecutionMode::Auto => None,
            ExecutionMode::Backend => Some(true),
            ExecutionMode::Fallback => Some(false),
        }
    }
}

pub struct Engine {
    pool: Arc<PoolRegistry>,
    backend: Arc<dyn NativeBackend>,
    sweeper: Option<JoinHandle<()>>,
    mode: Mutex<ExecutionMode>,
    split: TextService<Split>,
    diff: TextService<Diff>,
    filter: TextService<Filter>,
    remove: TextService<Remove>,
}

impl Engine {
    pub fn new(settings: &Settings, backend: Arc<dyn NativeBackend>) -> Self {
        let pool = Arc::new(PoolRegistry::new(settings.pool_settings()));
        Self::with_pool(settings, pool, backend)
    }

    /// An engine with no native backend.
    pub fn without_backend(settings: &Settings) -> Self {
        Self::new(settings, Arc::new(UnavailableBackend))
    }

    pub fn with_pool(settings: &Settings, pool: Arc<PoolRegistry>, backend: Arc<dyn NativeBackend>) -> Self {
        let options = |kind| settings.service_options(kind);
        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(_) => Some(pool.start_sweeper()),
            Err(_) => {
                debug!("No tokio runtime, idle workers will not be swept");
                None
            }
        };
        Self {
            split: TextService::new(Arc::clone(&pool), Arc::clone(&backend), options(OperationKind::Split)),
            diff: TextService::new(Arc::clone(&pool), Arc::clone(&backend), options(OperationKind::Diff)),
            filter: TextService::new(Arc::clone(&pool), Arc::clone(&backend), options(OperationKind::Filter)),
            remove: TextService::new(Arc::clone(&pool), Arc::clone(&backend), options(OperationKind::Remove)),
            mode: Mutex::new(settings.engine.mode),
            backend,
            sweeper,
            pool,
        }
    }

    pub fn pool(&self) -> &Arc<PoolRegistry> {
        &self.pool
    }

    pub fn mode(&self) -> ExecutionMode {
        *lock(&self.mode)
    }

    /// Switch the routing preference. Any change flushes every pooled worker.
    pub fn set_mode(&self, mode: ExecutionMode) {
        let previous = std::mem::replace(&mut *lock(&self.mode), mode);
        if previous != mode {
            let flushed = self.pool.flush_all();
            info!("Execution mode {:?} -> {:?}, flushed {} worker(s)", previous, mode, flushed);
        }
    }

    pub fn set_progress(&self, callback: Option<ProgressCallback>) {
        self.split.set_progress(callback.clone());
        self.diff.set_progress(callback.clone());
        self.filter.set_progress(callback.clone());
        self.remove.set_progress(callback);
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn shutdown(&self) {
        if let Some(task) = &self.sweeper {
            task.abort();
        }
        self.pool.flush_all();
    }

    pub async fn split(&self, config: OperationConfig<SplitParams>) -> Result<Envelope, ProcessingError> {
        self.split.invoke(config, self.mode().prefer_backend()).await
    }

    pub async fn diff(&self, config: OperationConfig<DiffParams>) -> Result<Envelope, ProcessingError> {
        self.diff.invoke(config, self.mode().prefer_backend()).await
    }

    pub async fn filter(&self, config: OperationConfig<FilterParams>) -> Result<Envelope, ProcessingError> {
        self.filter.invoke(config, self.mode().prefer_backend()).await
    }

    pub async fn remove(&self, config: OperationConfig<RemoveParams>) -> Result<Envelope, ProcessingError> {
        self.remove.invoke(config, self.mode().prefer_backend()).await
    }

    /// Join two texts line by line. Runs natively when the mode allows it,
    /// on the calling task otherwise. Never pooled.
    pub async fn connect(&self, left: &str, right: &str, separator: &str) -> Result<String, ProcessingError> {
        let use_backend = match self.mode().prefer_backend() {
            Some(preference) => preference,
            None => self.backend.is_available().await,
        };
        if !use_backend {
            return Ok(connect_texts(left, right, separator));
        }
        debug!("connect routed to native backend");
        self.backend
            .connect_texts(ConnectArgs {
                text1: left.to_string(),
                text2: right.to_string(),
                separator: separator.to_string(),
            })
            .await
    }

    pub fn metrics(&self, kind: OperationKind) -> Option<Metrics> {
        match kind {
            OperationKind::Split => self.split.metrics_current(),
            OperationKind::Diff => self.diff.metrics_current(),
            OperationKind::Filter => self.filter.metrics_current(),
            OperationKind::Remove => self.remove.metrics_current(),
        }
    }

    pub fn average_metrics(&self, kind: OperationKind) -> Option<Metrics> {
        match kind {
            OperationKind::Split => self.split.metrics_average(),
            OperationKind::Diff => self.diff.metrics_average(),
            OperationKind::Filter => self.filter.metrics_average(),
            OperationKind::Remove => self.remove.metrics_average(),
        }
    }

    pub fn word_diffs(old_line: &str, new_line: &str) -> Vec<WordDiff> {
        word_diffs(old_line, new_line)
    }

    pub fn group_diff_results(entries: &[DiffEntry]) -> DiffGroups {
        group_diff_results(entries)
    }

    pub fn pair_diff_results(entries: &[DiffEntry]) -> Vec<DiffPair> {
        pair_diff_results(entries)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::worker::PoolSettings;

    #[test]
    fn test_mode_preference() {
        assert_eq!(ExecutionMode::Auto.prefer_backend(), None);
        assert_eq!(ExecutionMode::Backend.prefer_backend(), Some(true));
        assert_eq!(ExecutionMode::Fallback.prefer_backend(), Some(false));
    }

    #[tokio::test]
    async fn test_set_mode_flushes_pool() {
        let pool = Arc::new(PoolRegistry::new(PoolSettings {
            release_delay: Duration::from_millis(1),
            ..Default::default()
        }));
        let engine = Engine::with_pool(&Settings::default(), pool, Arc::new(UnavailableBackend));

        let worker = engine.pool().acquire(OperationKind::Split).unwrap();
        engine.pool().release(worker, true).await;
        assert_eq!(engine.pool().idle_count(OperationKind::Split), 1);

        engine.set_mode(ExecutionMode::Auto);
        assert_eq!(engine.pool().idle_count(OperationKind::Split), 1);

        engine.set_mode(ExecutionMode::Fallback);
        assert_eq!(engine.mode(), ExecutionMode::Fallback);
        assert_eq!(engine.pool().idle_count(OperationKind::Split), 0);
    }

    #[tokio::test]
    async fn test_engine_sweeps_idle_workers() {
        let pool = Arc::new(PoolRegistry::new(PoolSettings {
            idle_timeout: Duration::from_millis(200),
            sweep_interval: Duration::from_millis(100),
            release_delay: Duration::from_millis(1),
            ping_grace: Duration::from_millis(500),
        }));
        let engine = Engine::with_pool(&Settings::default(), Arc::clone(&pool), Arc::new(UnavailableBackend));
        assert!(engine.is_sweeping());

        let worker = pool.acquire(OperationKind::Split).unwrap();
        pool.release(worker, true).await;
        assert_eq!(pool.idle_count(OperationKind::Split), 1);

        // Real clock: a paused one would also expire the ping grace
        for _ in 0..40 {
            if pool.idle_count(OperationKind::Split) == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(pool.idle_count(OperationKind::Split), 0);
    }

    #[test]
    fn test_engine_outside_runtime_has_no_sweeper() {
        let engine = Engine::without_backend(&Settings::default());
        assert!(!engine.is_sweeping());
    }

    #[tokio::test]
    async fn test_connect_without_backend_runs_locally() {
        let engine = Engine::without_backend(&Settings::default());
        let joined = engine.connect("a\nb", "1\n2\n3", "\t").await.unwrap();
        assert_eq!(joined, "a\t1\nb\t2\n\t3");
    }

    #[tokio::test]
    async fn test_split_scenario_flattens() {
        let engine = Engine::without_backend(&Settings::default());
        let result = engine
            .split(OperationConfig::new("a_b_c", "_", SplitParams::default()))
            .await
            .unwrap();
        let flat: Vec<String> = result.try_convert().unwrap();
        assert_eq!(flat, vec!["a", "b", "c"]);
        assert!(engine.metrics(OperationKind::Split).is_some());
    }
}
