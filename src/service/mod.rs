//! Execution strategy selection.
//!
//! A [`TextService`] runs one operation kind. Each call goes to the native
//! backend, a pooled worker thread, or the calling thread, and always comes
//! back as an [`Envelope`] with its [`Metrics`] recorded.
//!
//! # Routing
//!
//! ```text
//! invoke ──▶ validate ──▶ prefer_backend? ──yes──▶ Native (backend call)
//!                              │
//!                              no ──▶ worker threads? ──yes──▶ Pooled
//!                                            │
//!                                            no ──▶ InProcess
//! ```
//!
//! `prefer_backend = None` probes the backend once per call. An explicit
//! preference is never second-guessed: a missing backend under
//! `Some(true)` is a transport failure, not a silent fallback.
//!
//! # Pooled jobs
//!
//! - Each job gets a fresh id and cancellation token. Starting a job cancels
//!   the previous unfinished one on the same service, and the older caller
//!   gets [`ProcessingError::Cancelled`].
//! - The caller waits at most [`ServiceOptions::timeout`]; events for any
//!   other job id are dropped.
//! - A worker whose job timed out or was cancelled is terminated, as is one
//!   whose channel failed. Any other worker goes back through the pool's
//!   health check.

pub mod engine;

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::backend::NativeBackend;
use crate::envelope::{Envelope, Metrics, MetricsHistory};
use crate::error::ProcessingError;
use crate::operations::{Operation, OperationConfig, OperationKind};
use crate::worker::{Chunking, JobRequest, PoolRegistry, PooledWorker, WorkerEvent, WorkerRequest, run_in_process};

pub use engine::{Engine, ExecutionMode};

/// What the host can do besides running code on the caller's thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    pub worker_threads: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            worker_threads: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    pub capabilities: HostCapabilities,
    /// Caller-side limit for a pooled job, counted from dispatch.
    pub timeout: Duration,
    pub chunk_lines: usize,
    pub history: usize,
}

impl ServiceOptions {
    pub fn for_kind(kind: OperationKind) -> Self {
        Self {
            capabilities: HostCapabilities::default(),
            timeout: kind.default_timeout(),
            chunk_lines: 10,
            history: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Native,
    Pooled,
    InProcess,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub kind: OperationKind,
    pub job_id: Uuid,
    pub percent: u8,
    pub metrics: Metrics,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

pub struct TextService<O: Operation> {
    pool: Arc<PoolRegistry>,
    backend: Arc<dyn NativeBackend>,
    options: ServiceOptions,
    history: Mutex<MetricsHistory>,
    /// The job whose result this service still wants.
    active: Mutex<Option<(Uuid, CancellationToken)>>,
    progress: Mutex<Option<ProgressCallback>>,
    _operation: PhantomData<fn() -> O>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<O: Operation> TextService<O> {
    pub fn new(pool: Arc<PoolRegistry>, backend: Arc<dyn NativeBackend>, options: ServiceOptions) -> Self {
        Self {
            pool,
            backend,
            options,
            history: Mutex::new(MetricsHistory::new(options.history)),
            active: Mutex::new(None),
            progress: Mutex::new(None),
            _operation: PhantomData,
        }
    }

    pub fn kind(&self) -> OperationKind {
        O::KIND
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    pub fn set_progress(&self, callback: Option<ProgressCallback>) {
        *lock(&self.progress) = callback;
    }

    pub fn metrics_current(&self) -> Option<Metrics> {
        lock(&self.history).current()
    }

    pub fn metrics_history(&self) -> Vec<Metrics> {
        lock(&self.history).recent().copied().collect()
    }

    pub fn metrics_average(&self) -> Option<Metrics> {
        lock(&self.history).average()
    }

    /// Pick a route. `None` probes the backend once.
    pub async fn select_route(&self, prefer_backend: Option<bool>) -> Route {
        let use_backend = match prefer_backend {
            Some(preference) => preference,
            None => self.backend.is_available().await,
        };
        if use_backend {
            Route::Native
        } else if self.options.capabilities.worker_threads {
            Route::Pooled
        } else {
            Route::InProcess
        }
    }

    pub async fn invoke(
        &self,
        config: OperationConfig<O::Params>,
        prefer_backend: Option<bool>,
    ) -> Result<Envelope, ProcessingError> {
        O::validate(&config)?;

        let route = self.select_route(prefer_backend).await;
        debug!("{} routed to {:?}", O::KIND, route);
        let (result, metrics) = match route {
            Route::Native => self.run_native(config).await?,
            Route::Pooled => self.run_pooled(config).await?,
            Route::InProcess => run_in_process(&O::into_job(config))?,
        };

        lock(&self.history).record(metrics);
        Ok(result)
    }

    async fn run_native(&self, config: OperationConfig<O::Params>) -> Result<(Envelope, Metrics), ProcessingError> {
        let started = Instant::now();
        let input = config.source_text.len();
        let reply = O::native_request(&config).call(&*self.backend).await?;
        let reported = reply.metrics.clone();
        let result = O::from_native(reply)?;

        let execution_time_ms = if reported.execution_time_ms > 0.0 {
            reported.execution_time_ms
        } else {
            started.elapsed().as_secs_f64() * 1000.0
        };
        let metrics = Metrics {
            execution_time_ms,
            memory_usage_bytes: reported.memory_usage_kb * 1024,
            input_size_bytes: input as u64,
            output_size_bytes: result.byte_len() as u64,
        };
        Ok((result, metrics))
    }

    async fn run_pooled(&self, config: OperationConfig<O::Params>) -> Result<(Envelope, Metrics), ProcessingError> {
        let job_id = Uuid::new_v4();
        let token = CancellationToken::new();
        if let Some((previous, stale)) = lock(&self.active).replace((job_id, token.clone())) {
            debug!("{} job {} superseded by {}", O::KIND, previous, job_id);
            stale.cancel();
        }

        let mut worker = match self.pool.acquire(O::KIND) {
            Ok(worker) => worker,
            Err(e) => {
                self.clear_active(job_id);
                return Err(e);
            }
        };

        let request = JobRequest {
            job_id,
            config: O::into_job(config),
            chunking: Chunking::from_lines(self.options.chunk_lines),
            cancel: token.clone(),
        };
        let outcome = match worker.send(WorkerRequest::Job(request)) {
            Ok(()) => {
                tokio::select! {
                    _ = token.cancelled() => Err(ProcessingError::Cancelled { kind: O::KIND }),
                    waited = tokio::time::timeout(self.options.timeout, self.await_terminal(&mut worker, job_id)) => {
                        waited.unwrap_or(Err(ProcessingError::Timeout {
                            kind: O::KIND,
                            after: self.options.timeout,
                        }))
                    }
                }
            }
            Err(e) => Err(e),
        };
        self.clear_active(job_id);

        let reusable = match &outcome {
            Ok(_) => true,
            Err(ProcessingError::Timeout { after, .. }) => {
                warn!("{} job {} timed out after {:?}, terminating worker {}", O::KIND, job_id, after, worker.id);
                token.cancel();
                false
            }
            Err(ProcessingError::Cancelled { .. }) => {
                debug!("{} job {} abandoned", O::KIND, job_id);
                self.pool.sweep();
                false
            }
            Err(ProcessingError::TransportFailure(_)) => false,
            // The worker reported the failure itself and is still healthy.
            Err(_) => true,
        };
        self.spawn_release(worker, reusable);
        outcome
    }

    /// Wait for this job's `Complete` or `Error`, forwarding progress and
    /// dropping events of other jobs.
    async fn await_terminal(&self, worker: &mut PooledWorker, job_id: Uuid) -> Result<(Envelope, Metrics), ProcessingError> {
        while let Some(event) = worker.next_event().await {
            match event {
                WorkerEvent::Progress {
                    job_id: id,
                    percent,
                    metrics,
                } if id == job_id => {
                    let callback = lock(&self.progress).clone();
                    if let Some(callback) = callback {
                        callback(ProgressUpdate {
                            kind: O::KIND,
                            job_id,
                            percent,
                            metrics,
                        });
                    }
                }
                WorkerEvent::Complete {
                    job_id: id,
                    result,
                    metrics,
                } if id == job_id => return Ok((result, metrics)),
                WorkerEvent::Error { job_id: id, error } if id == job_id => return Err(error),
                other => trace!("Discarding stale event for {:?}", other.job_id()),
            }
        }
        Err(ProcessingError::TransportFailure(format!(
            "worker {} closed its channel",
            worker.id
        )))
    }

    fn clear_active(&self, job_id: Uuid) {
        let mut active = lock(&self.active);
        if active.as_ref().is_some_and(|(id, _)| *id == job_id) {
            *active = None;
        }
    }

    fn spawn_release(&self, worker: PooledWorker, reusable: bool) {
        let pool = Arc::clone(&self.pool);
        tokio::spawn(async move {
            pool.release(worker, reusable).await;
        });
    }
}
