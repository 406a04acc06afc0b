//! Native backend interface.
//!
//! The native service is an out-of-process collaborator with its own naming
//! convention (flat lowercase argument names, snake_case replies). Operations
//! translate to and from it through [`NativeRequest`] and
//! [`crate::operations::Operation::from_native`].

mod process;
pub mod service;
mod wire;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::{DiffEntry, DiffKind};
use crate::envelope::BackendMetrics;
use crate::error::ProcessingError;

pub use process::ProcessBackend;
pub use wire::{RpcError, RpcReply, RpcRequest};

/// Reply of every native text procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedText<T> {
    pub result_text: T,
    #[serde(default)]
    pub removed_lines: usize,
    #[serde(default)]
    pub metrics: BackendMetrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitArgs {
    pub text: String,
    pub delimiter: String,
    pub trimparts: bool,
    pub useregex: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffArgs {
    pub oldtext: String,
    pub newtext: String,
    pub ignorewhitespace: bool,
    #[serde(default = "default_true")]
    pub casesensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterArgs {
    pub text: String,
    pub pattern: String,
    pub filtermode: String,
    pub casesensitive: bool,
    pub splitmatches: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveArgs {
    pub text: String,
    pub pattern: String,
    pub removemode: String,
    pub casesensitive: bool,
    pub useregex: bool,
    pub trimparts: bool,
}

/// Arguments of `connect_texts`: the two texts are joined line by line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectArgs {
    pub text1: String,
    pub text2: String,
    pub separator: String,
}

fn default_true() -> bool {
    true
}

/// Diff line in backend naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDiffEntry {
    pub text: String,
    pub diff_type: DiffKind,
    pub line_number: usize,
}

impl From<BackendDiffEntry> for DiffEntry {
    fn from(entry: BackendDiffEntry) -> Self {
        DiffEntry::new(entry.diff_type, entry.text, entry.line_number)
    }
}

impl From<&DiffEntry> for BackendDiffEntry {
    fn from(entry: &DiffEntry) -> Self {
        Self {
            text: entry.text.clone(),
            diff_type: entry.kind,
            line_number: entry.line_number,
        }
    }
}

pub type NativeResult = Result<ProcessedText<Value>, ProcessingError>;

#[async_trait]
pub trait NativeBackend: Send + Sync {
    /// Never fails; any probe error means unavailable.
    async fn is_available(&self) -> bool;

    async fn process_text_block(&self, args: SplitArgs) -> NativeResult;

    async fn get_text_diff(&self, args: DiffArgs) -> NativeResult;

    async fn filter_text(&self, args: FilterArgs) -> NativeResult;

    async fn remove_lines(&self, args: RemoveArgs) -> NativeResult;

    /// Replies with the bare joined text, without metrics.
    async fn connect_texts(&self, args: ConnectArgs) -> Result<String, ProcessingError>;
}

/// One native procedure call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeRequest {
    Split(SplitArgs),
    Diff(DiffArgs),
    Filter(FilterArgs),
    Remove(RemoveArgs),
}

impl NativeRequest {
    pub fn command(&self) -> &'static str {
        match self {
            NativeRequest::Split(_) => "process_text_block",
            NativeRequest::Diff(_) => "get_text_diff",
            NativeRequest::Filter(_) => "filter_text",
            NativeRequest::Remove(_) => "remove_lines",
        }
    }

    pub async fn call(self, backend: &dyn NativeBackend) -> NativeResult {
        match self {
            NativeRequest::Split(args) => backend.process_text_block(args).await,
            NativeRequest::Diff(args) => backend.get_text_diff(args).await,
            NativeRequest::Filter(args) => backend.filter_text(args).await,
            NativeRequest::Remove(args) => backend.remove_lines(args).await,
        }
    }
}

/// Backend for hosts without a native service.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBackend;

impl UnavailableBackend {
    fn refusal() -> ProcessingError {
        ProcessingError::TransportFailure("native backend is not available".to_string())
    }
}

#[async_trait]
impl NativeBackend for UnavailableBackend {
    async fn is_available(&self) -> bool {
        false
    }

    async fn process_text_block(&self, _args: SplitArgs) -> NativeResult {
        Err(Self::refusal())
    }

    async fn get_text_diff(&self, _args: DiffArgs) -> NativeResult {
        Err(Self::refusal())
    }

    async fn filter_text(&self, _args: FilterArgs) -> NativeResult {
        Err(Self::refusal())
    }

    async fn remove_lines(&self, _args: RemoveArgs) -> NativeResult {
        Err(Self::refusal())
    }

    async fn connect_texts(&self, _args: ConnectArgs) -> Result<String, ProcessingError> {
        Err(Self::refusal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_args_use_backend_names() {
        let args = SplitArgs {
            text: "a_b".into(),
            delimiter: "_".into(),
            trimparts: true,
            useregex: false,
        };
        assert_eq!(
            serde_json::to_value(&args).unwrap(),
            json!({"text": "a_b", "delimiter": "_", "trimparts": true, "useregex": false})
        );
    }

    #[test]
    fn test_diff_entry_naming_round_trip() {
        let entry = DiffEntry::new(DiffKind::Moved, "L3", 2);
        let backend = BackendDiffEntry::from(&entry);
        assert_eq!(
            serde_json::to_value(&backend).unwrap(),
            json!({"text": "L3", "diff_type": "moved", "line_number": 2})
        );
        assert_eq!(DiffEntry::from(backend), entry);
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let backend = UnavailableBackend;
        assert!(!backend.is_available().await);
        let request = NativeRequest::Filter(FilterArgs {
            text: "x".into(),
            pattern: "x".into(),
            filtermode: "keep".into(),
            casesensitive: true,
            splitmatches: false,
        });
        assert_eq!(request.command(), "filter_text");
        assert!(matches!(
            request.call(&backend).await,
            Err(ProcessingError::TransportFailure(_))
        ));
    }
}
