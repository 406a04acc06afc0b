//! Messages exchanged between a caller and one pooled worker thread.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crossbeam::channel::Receiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};
use uuid::Uuid;

use super::chunk::{JobOutcome, run_job};
use crate::envelope::{Envelope, Metrics};
use crate::error::ProcessingError;
use crate::operations::JobConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunking {
    /// Fixed number of lines per chunk.
    Lines(usize),
    /// One call over the entire input.
    WholeText,
}

impl Chunking {
    /// `0` means whole-text processing.
    pub fn from_lines(lines: usize) -> Self {
        if lines == 0 {
            Chunking::WholeText
        } else {
            Chunking::Lines(lines)
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_id: Uuid,
    pub config: JobConfig,
    pub chunking: Chunking,
    /// Checked between chunks.
    pub cancel: CancellationToken,
}

/// Caller to worker.
#[derive(Debug, Clone)]
pub enum WorkerRequest {
    Job(JobRequest),
    /// Liveness probe; answered with [`WorkerEvent::Pong`], never treated as a job.
    Ping { nonce: u64 },
    Shutdown,
}

/// Worker to caller.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// Never terminal.
    Progress {
        job_id: Uuid,
        percent: u8,
        metrics: Metrics,
    },
    Complete {
        job_id: Uuid,
        result: Envelope,
        metrics: Metrics,
    },
    Error {
        job_id: Uuid,
        error: ProcessingError,
    },
    Pong { nonce: u64 },
}

impl WorkerEvent {
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            WorkerEvent::Progress { job_id, .. }
            | WorkerEvent::Complete { job_id, .. }
            | WorkerEvent::Error { job_id, .. } => Some(*job_id),
            WorkerEvent::Pong { .. } => None,
        }
    }
}

/// Body of a worker thread. Returns when asked to shut down or when either
/// channel closes.
pub fn worker_loop(
    name: &str,
    requests: Receiver<WorkerRequest>,
    events: UnboundedSender<WorkerEvent>,
) {
    debug!("Worker {} started", name);
    while let Ok(request) = requests.recv() {
        match request {
            WorkerRequest::Job(job) => {
                let job_id = job.job_id;
                trace!("Worker {} picked up job {}", name, job_id);
                let sink = &events;
                let run = catch_unwind(AssertUnwindSafe(|| handle_job(&job, sink)));
                let delivered = match run {
                    Ok(delivered) => delivered,
                    Err(panic) => {
                        let reason = panic
                            .downcast_ref::<&str>()
                            .map(|s| s.to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        error!("Worker {} panicked on job {}: {}", name, job_id, reason);
                        events
                            .send(WorkerEvent::Error {
                                job_id,
                                error: ProcessingError::Unknown(format!("worker panicked: {reason}")),
                            })
                            .is_ok()
                    }
                };
                if !delivered {
                    break;
                }
            }
            WorkerRequest::Ping { nonce } => {
                if events.send(WorkerEvent::Pong { nonce }).is_err() {
                    break;
                }
            }
            WorkerRequest::Shutdown => break,
        }
    }
    debug!("Worker {} stopped", name);
}

/// Runs one job, streaming events. `false` means the caller is gone.
fn handle_job(job: &JobRequest, events: &UnboundedSender<WorkerEvent>) -> bool {
    let job_id = job.job_id;
    let mut connected = true;
    let outcome = run_job(&job.config, job.chunking, Some(&job.cancel), |percent, metrics| {
        connected &= events
            .send(WorkerEvent::Progress {
                job_id,
                percent,
                metrics,
            })
            .is_ok();
    });

    let terminal = match outcome {
        Ok(JobOutcome::Complete(result, metrics)) => WorkerEvent::Complete {
            job_id,
            result,
            metrics,
        },
        Ok(JobOutcome::Aborted) => {
            debug!("Job {} aborted", job_id);
            return connected;
        }
        Err(error) => WorkerEvent::Error { job_id, error },
    };
    connected && events.send(terminal).is_ok()
}
