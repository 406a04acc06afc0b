//! Operation kinds, their typed configurations and per-chunk transforms.
//!
//! Each kind has a marker type implementing [`Operation`]: validation, the job
//! payload shipped to workers, and the mapping to and from native backend
//! calls. The transforms themselves implement [`ChunkTransform`] and are
//! shared by the pooled and in-process routes.

mod connect;
mod diff;
mod filter;
mod remove;
mod split;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{NativeRequest, ProcessedText};
use crate::envelope::{Envelope, EnvelopeKind};
use crate::error::ProcessingError;

pub use connect::connect_texts;
pub use diff::{Diff, DiffParams, DiffTransform, parse_diff_entries, render_diff_entries};
pub use filter::{Filter, FilterMode, FilterParams, FilterTransform};
pub use remove::{Remove, RemoveMode, RemoveParams, RemoveTransform};
pub use split::{Split, SplitParams, SplitTransform};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Split,
    Diff,
    Filter,
    Remove,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::Split,
        OperationKind::Diff,
        OperationKind::Filter,
        OperationKind::Remove,
    ];

    /// Caller-side deadline for the pooled route.
    pub fn default_timeout(self) -> Duration {
        match self {
            OperationKind::Split | OperationKind::Filter => Duration::from_secs(10),
            OperationKind::Remove => Duration::from_secs(12),
            OperationKind::Diff => Duration::from_secs(15),
        }
    }

    pub fn output_shape(self) -> EnvelopeKind {
        match self {
            OperationKind::Split => EnvelopeKind::ColumnList,
            OperationKind::Diff | OperationKind::Filter => EnvelopeKind::Text,
            OperationKind::Remove => EnvelopeKind::RichText,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Split => "split",
            OperationKind::Diff => "diff",
            OperationKind::Filter => "filter",
            OperationKind::Remove => "remove",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation's input. `main_param` is the separator, pattern or new text
/// depending on the kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationConfig<P> {
    pub source_text: String,
    pub main_param: String,
    pub config_params: P,
}

impl<P> OperationConfig<P> {
    pub fn new(source_text: impl Into<String>, main_param: impl Into<String>, config_params: P) -> Self {
        Self {
            source_text: source_text.into(),
            main_param: main_param.into(),
            config_params,
        }
    }
}

/// Type-erased job payload carried to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "config", rename_all = "lowercase")]
pub enum JobConfig {
    Split(OperationConfig<SplitParams>),
    Diff(OperationConfig<DiffParams>),
    Filter(OperationConfig<FilterParams>),
    Remove(OperationConfig<RemoveParams>),
}

impl JobConfig {
    pub fn kind(&self) -> OperationKind {
        match self {
            JobConfig::Split(_) => OperationKind::Split,
            JobConfig::Diff(_) => OperationKind::Diff,
            JobConfig::Filter(_) => OperationKind::Filter,
            JobConfig::Remove(_) => OperationKind::Remove,
        }
    }

    pub fn source_text(&self) -> &str {
        match self {
            JobConfig::Split(c) => &c.source_text,
            JobConfig::Diff(c) => &c.source_text,
            JobConfig::Filter(c) => &c.source_text,
            JobConfig::Remove(c) => &c.source_text,
        }
    }

    /// Build the stateful transform for one job. Patterns compile here, once.
    pub fn transformer(&self) -> Result<Box<dyn ChunkTransform>, ProcessingError> {
        Ok(match self {
            JobConfig::Split(c) => Box::new(SplitTransform::new(c)?),
            JobConfig::Diff(c) => Box::new(DiffTransform::new(c)),
            JobConfig::Filter(c) => Box::new(FilterTransform::new(c)?),
            JobConfig::Remove(c) => Box::new(RemoveTransform::new(c)?),
        })
    }
}

/// Where a chunk sits within the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPosition {
    /// Index of the chunk's first line.
    pub offset: usize,
    pub last: bool,
}

impl ChunkPosition {
    pub const WHOLE: ChunkPosition = ChunkPosition {
        offset: 0,
        last: true,
    };
}

/// Per-job transform applied chunk by chunk.
///
/// Implementations may keep state across chunks (a seen-set, the new-text
/// lines of a diff); a fresh instance is built for every job. A source text
/// with no lines is applied once as an empty last chunk.
pub trait ChunkTransform: Send {
    fn apply(&mut self, lines: &[&str], at: ChunkPosition) -> Result<Envelope, ProcessingError>;
}

/// Static description of one operation kind.
pub trait Operation: Send + Sync + 'static {
    const KIND: OperationKind;
    type Params: Clone + fmt::Debug + Send + Sync + 'static;

    /// Reject bad input before any route is touched.
    fn validate(config: &OperationConfig<Self::Params>) -> Result<(), ProcessingError>;

    fn into_job(config: OperationConfig<Self::Params>) -> JobConfig;

    /// Arguments for this kind's native procedure, in backend naming.
    fn native_request(config: &OperationConfig<Self::Params>) -> NativeRequest;

    /// Translate a native reply into the in-process envelope.
    fn from_native(reply: ProcessedText<serde_json::Value>) -> Result<Envelope, ProcessingError>;
}

pub(crate) fn require_source(source_text: &str) -> Result<(), ProcessingError> {
    if source_text.is_empty() {
        return Err(ProcessingError::MissingInput("source text is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_metadata() {
        assert_eq!(OperationKind::Diff.default_timeout(), Duration::from_secs(15));
        assert_eq!(OperationKind::Remove.default_timeout(), Duration::from_secs(12));
        assert_eq!(OperationKind::Split.output_shape(), EnvelopeKind::ColumnList);
        assert_eq!(OperationKind::Filter.to_string(), "filter");
    }

    #[test]
    fn test_job_config_serializes_with_kind_tag() {
        let job = JobConfig::Split(OperationConfig::new("a_b", "_", SplitParams::default()));
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["kind"], "split");
        assert_eq!(value["config"]["mainParam"], "_");
        assert_eq!(job.kind(), OperationKind::Split);
        assert_eq!(job.source_text(), "a_b");
    }
}
