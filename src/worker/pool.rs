//! Per-kind pools of reusable worker threads.
//!
//! # Lifecycle
//!
//! ```text
//!   acquire ──▶ working ──▶ release ──(delay, ping)──▶ idle ──▶ acquire ...
//!                              │           │                    │
//!                              │ not       │ no pong            │ idle too long
//!                              ▼ reusable  ▼                    ▼ (sweep)
//!                                       terminated
//! ```
//!
//! ## What the registry guarantees
//! - **Ownership**: a working worker belongs to one caller and is never pooled
//! - **Health**: a worker re-enters its pool only after answering a ping
//!   within `ping_grace`, `release_delay` after its job
//! - **Idle bound**: [`PoolRegistry::sweep`] evicts workers idle longer than
//!   `idle_timeout`; [`PoolRegistry::start_sweeper`] runs it every
//!   `sweep_interval`
//! - **Flush**: [`PoolRegistry::flush_all`] terminates every idle worker, as
//!   does dropping the registry
//!
//! ## What it does not do
//! - Cap the number of workers. Concurrent callers each get their own.
//! - Interrupt a running transform. Termination is a request the worker
//!   honours between messages; cancellation goes through the job's token.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{Sender, unbounded};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::protocol::{WorkerEvent, WorkerRequest, worker_loop};
use crate::error::ProcessingError;
use crate::operations::OperationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Idle workers older than this are evicted by the sweep.
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
    /// Wait before a released worker is health-checked.
    pub release_delay: Duration,
    pub ping_grace: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
            release_delay: Duration::from_millis(500),
            ping_grace: Duration::from_millis(250),
        }
    }
}

/// A worker thread plus both ends of its channels.
pub struct PooledWorker {
    pub id: Uuid,
    pub kind: OperationKind,
    requests: Sender<WorkerRequest>,
    events: UnboundedReceiver<WorkerEvent>,
    thread: Option<JoinHandle<()>>,
    is_working: bool,
    last_idle: Instant,
}

impl std::fmt::Debug for PooledWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledWorker")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("is_working", &self.is_working)
            .finish()
    }
}

impl PooledWorker {
    /// Start a protocol worker on its own OS thread.
    pub fn spawn_thread(kind: OperationKind) -> Result<Self, ProcessingError> {
        let id = Uuid::new_v4();
        let (req_tx, req_rx) = unbounded();
        let (ev_tx, ev_rx) = unbounded_channel();
        let name = format!("{kind}-worker-{}", &id.simple().to_string()[..8]);
        let thread_name = name.clone();
        let thread = std::thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(&thread_name, req_rx, ev_tx))
            .map_err(|e| ProcessingError::TransportFailure(format!("failed to spawn worker: {e}")))?;
        Ok(Self::from_parts(id, kind, req_tx, ev_rx, Some(thread)))
    }

    /// Assemble a worker from an existing channel pair, for custom spawners.
    pub fn from_parts(
        id: Uuid,
        kind: OperationKind,
        requests: Sender<WorkerRequest>,
        events: UnboundedReceiver<WorkerEvent>,
        thread: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            id,
            kind,
            requests,
            events,
            thread,
            is_working: false,
            last_idle: Instant::now(),
        }
    }

    pub fn is_working(&self) -> bool {
        self.is_working
    }

    pub fn last_idle(&self) -> Instant {
        self.last_idle
    }

    pub fn send(&self, request: WorkerRequest) -> Result<(), ProcessingError> {
        self.requests
            .send(request)
            .map_err(|_| ProcessingError::TransportFailure(format!("worker {} is gone", self.id)))
    }

    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Ping and wait up to `grace` for the matching pong, discarding stale
    /// job events on the way.
    pub async fn health_check(&mut self, nonce: u64, grace: Duration) -> bool {
        if self.send(WorkerRequest::Ping { nonce }).is_err() {
            return false;
        }
        let wait = async {
            while let Some(event) = self.events.recv().await {
                match event {
                    WorkerEvent::Pong { nonce: n } if n == nonce => return true,
                    other => trace!("Discarding stale event from {}: {:?}", self.id, other.job_id()),
                }
            }
            false
        };
        tokio::time::timeout(grace, wait).await.unwrap_or(false)
    }

    /// Ask the thread to stop and detach it. A transform already running is
    /// not interrupted.
    pub fn terminate(mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
        self.thread.take();
        debug!("Terminated worker {} ({})", self.id, self.kind);
    }
}

pub type WorkerSpawner = Arc<dyn Fn(OperationKind) -> Result<PooledWorker, ProcessingError> + Send + Sync>;

/// Idle workers per operation kind.
///
/// A working worker is owned by exactly one caller and never sits in a pool.
/// All pool state lives behind one mutex that is never held across an await.
pub struct PoolRegistry {
    pools: Mutex<HashMap<OperationKind, Vec<PooledWorker>>>,
    settings: PoolSettings,
    spawner: WorkerSpawner,
    spawned: AtomicUsize,
    next_nonce: AtomicU64,
}

impl PoolRegistry {
    pub fn new(settings: PoolSettings) -> Self {
        Self::with_spawner(settings, Arc::new(PooledWorker::spawn_thread))
    }

    pub fn with_spawner(settings: PoolSettings, spawner: WorkerSpawner) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            settings,
            spawner,
            spawned: AtomicUsize::new(0),
            next_nonce: AtomicU64::new(1),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<OperationKind, Vec<PooledWorker>>> {
        self.pools.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take an idle worker of `kind`, or spawn one.
    pub fn acquire(&self, kind: OperationKind) -> Result<PooledWorker, ProcessingError> {
        let reused = self.lock().get_mut(&kind).and_then(Vec::pop);
        let mut worker = match reused {
            Some(worker) => {
                trace!("Reusing worker {} for {}", worker.id, kind);
                worker
            }
            None => {
                let worker = (self.spawner)(kind)?;
                self.spawned.fetch_add(1, Ordering::Relaxed);
                debug!("Spawned worker {} for {}", worker.id, kind);
                worker
            }
        };
        worker.is_working = true;
        Ok(worker)
    }

    /// Return a worker after its job. It goes back into the pool only when
    /// `reusable` and it answers a ping after the release delay.
    pub async fn release(&self, mut worker: PooledWorker, reusable: bool) {
        tokio::time::sleep(self.settings.release_delay).await;
        worker.is_working = false;

        if !reusable {
            worker.terminate();
            return;
        }
        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        if !worker.health_check(nonce, self.settings.ping_grace).await {
            warn!("Worker {} failed its health check", worker.id);
            worker.terminate();
            return;
        }
        worker.last_idle = Instant::now();
        self.lock().entry(worker.kind).or_default().push(worker);
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Evict idle workers whose idle time at `now` exceeds the idle timeout.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut evicted = Vec::new();
        {
            let mut pools = self.lock();
            for workers in pools.values_mut() {
                let (stale, fresh): (Vec<_>, Vec<_>) = workers.drain(..).partition(|w| {
                    now.saturating_duration_since(w.last_idle) > self.settings.idle_timeout
                });
                *workers = fresh;
                evicted.extend(stale);
            }
        }
        let count = evicted.len();
        if count > 0 {
            debug!("Sweep evicted {} idle worker(s)", count);
        }
        evicted.into_iter().for_each(PooledWorker::terminate);
        count
    }

    /// Terminate every pooled worker of every kind.
    pub fn flush_all(&self) -> usize {
        let drained: Vec<PooledWorker> = self.lock().drain().flat_map(|(_, workers)| workers).collect();
        let count = drained.len();
        drained.into_iter().for_each(PooledWorker::terminate);
        debug!("Flushed {} pooled worker(s)", count);
        count
    }

    pub fn idle_count(&self, kind: OperationKind) -> usize {
        self.lock().get(&kind).map(Vec::len).unwrap_or(0)
    }

    pub fn stats(&self) -> HashMap<OperationKind, usize> {
        self.lock().iter().map(|(kind, workers)| (*kind, workers.len())).collect()
    }

    /// Workers constructed over the registry's lifetime.
    pub fn spawned_total(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Periodic sweep on the current tokio runtime. The task ends once the
    /// registry is dropped.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(registry) => {
                        registry.sweep();
                    }
                    None => break,
                }
            }
        })
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new(PoolSettings::default())
    }
}

impl Drop for PoolRegistry {
    fn drop(&mut self) {
        self.flush_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick() -> PoolSettings {
        PoolSettings {
            release_delay: Duration::from_millis(1),
            ping_grace: Duration::from_millis(500),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_release_returns_healthy_worker() {
        let registry = PoolRegistry::new(quick());
        let worker = registry.acquire(OperationKind::Split).unwrap();
        assert!(worker.is_working());
        let id = worker.id;

        registry.release(worker, true).await;
        assert_eq!(registry.idle_count(OperationKind::Split), 1);

        let again = registry.acquire(OperationKind::Split).unwrap();
        assert_eq!(again.id, id);
        assert_eq!(registry.spawned_total(), 1);
        registry.release(again, false).await;
        assert_eq!(registry.idle_count(OperationKind::Split), 0);
    }

    #[tokio::test]
    async fn test_pools_are_per_kind() {
        let registry = PoolRegistry::new(quick());
        let worker = registry.acquire(OperationKind::Diff).unwrap();
        registry.release(worker, true).await;

        let other = registry.acquire(OperationKind::Filter).unwrap();
        assert_eq!(registry.spawned_total(), 2);
        assert_eq!(registry.idle_count(OperationKind::Diff), 1);
        other.terminate();
    }

    #[tokio::test]
    async fn test_sweep_evicts_only_stale_workers() {
        let registry = PoolRegistry::new(quick());
        let worker = registry.acquire(OperationKind::Remove).unwrap();
        registry.release(worker, true).await;

        let idle_since = registry.lock()[&OperationKind::Remove][0].last_idle();
        assert_eq!(registry.sweep_at(idle_since + Duration::from_secs(59)), 0);
        assert_eq!(registry.idle_count(OperationKind::Remove), 1);
        assert_eq!(registry.sweep_at(idle_since + Duration::from_secs(61)), 1);
        assert_eq!(registry.idle_count(OperationKind::Remove), 0);
    }

    #[tokio::test]
    async fn test_flush_all_empties_every_pool() {
        let registry = PoolRegistry::new(quick());
        for kind in OperationKind::ALL {
            let worker = registry.acquire(kind).unwrap();
            registry.release(worker, true).await;
        }
        assert_eq!(registry.flush_all(), 4);
        assert!(registry.stats().values().all(|&n| n == 0));

        let before = registry.spawned_total();
        let _fresh = registry.acquire(OperationKind::Split).unwrap();
        assert_eq!(registry.spawned_total(), before + 1);
    }
}
