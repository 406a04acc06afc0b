//! # textsplit - tiered text transformation engine
//!
//! Four line-oriented operations (split, diff, filter, remove) behind one
//! selector that runs each call on the first available route:
//!
//! - a **native backend** process speaking JSON lines,
//! - a **pool of worker threads** processing the text in chunks with
//!   progress, timeouts and cooperative cancellation,
//! - or **in-process** on the caller's thread.
//!
//! Every route returns the same [`Envelope`] shape and records [`Metrics`].
//!
//! ## Quick Start
//!
//! ```no_run
//! # async fn demo() -> textsplit::Result<()> {
//! use textsplit::{Engine, OperationConfig, Settings, SplitParams};
//!
//! let engine = Engine::without_backend(&Settings::default());
//! let columns = engine
//!     .split(OperationConfig::new("a_b_c", "_", SplitParams::default()))
//!     .await?;
//! let flat: Vec<String> = columns.try_convert()?;
//! assert_eq!(flat, ["a", "b", "c"]);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod diff;
pub mod envelope;
pub mod error;
pub mod operations;
pub mod service;
pub mod worker;

pub use cli::{Cli, Output};
pub use config::{Settings, TextsplitConfig};
pub use envelope::{Envelope, EnvelopeKind, Metrics};
pub use error::{ErrorCategory, ProcessingError};
pub use operations::{
    DiffParams, FilterMode, FilterParams, OperationConfig, OperationKind, RemoveMode, RemoveParams,
    SplitParams,
};
pub use service::{Engine, ExecutionMode, TextService};

/// Result type alias for application-level textsplit operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
