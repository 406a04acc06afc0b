//! Isolated worker threads: the message protocol, the chunk loop they run,
//! and the registry that pools them per operation kind.

pub mod chunk;
pub mod pool;
pub mod protocol;

pub use chunk::{Accumulator, JobOutcome, run_in_process, run_job};
pub use pool::{PoolRegistry, PoolSettings, PooledWorker, WorkerSpawner};
pub use protocol::{Chunking, JobRequest, WorkerEvent, WorkerRequest, worker_loop};
