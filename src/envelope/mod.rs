//! Result envelope: the only value returned across the execution boundary.
//!
//! Transforms build envelopes through the explicit constructors. [`Envelope::wrap`]
//! exists for untyped JSON payloads (native backend replies) and infers the
//! shape from the value.

mod convert;
mod metrics;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use convert::FromEnvelope;
pub use metrics::{BackendMetrics, MemoryProbe, Metrics, MetricsHistory, format_memory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeKind {
    Text,
    Column,
    ColumnList,
    RichText,
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnvelopeKind::Text => "text",
            EnvelopeKind::Column => "column",
            EnvelopeKind::ColumnList => "columnList",
            EnvelopeKind::RichText => "richText",
        };
        f.write_str(name)
    }
}

/// Transformed text bundled with a removed-line count and backend timing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichText {
    pub result_text: String,
    pub removed_count: usize,
    #[serde(default)]
    pub metrics: BackendMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "camelCase")]
pub enum Envelope {
    Text(String),
    Column(Vec<String>),
    ColumnList(Vec<Vec<String>>),
    RichText(RichText),
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope::Text(String::new())
    }
}

impl Envelope {
    pub fn text(text: impl Into<String>) -> Self {
        Envelope::Text(text.into())
    }

    pub fn column(items: Vec<String>) -> Self {
        Envelope::Column(items)
    }

    pub fn column_list(columns: Vec<Vec<String>>) -> Self {
        Envelope::ColumnList(columns)
    }

    pub fn rich_text(result_text: impl Into<String>, removed_count: usize) -> Self {
        Envelope::RichText(RichText {
            result_text: result_text.into(),
            removed_count,
            metrics: BackendMetrics::default(),
        })
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Text(_) => EnvelopeKind::Text,
            Envelope::Column(_) => EnvelopeKind::Column,
            Envelope::ColumnList(_) => EnvelopeKind::ColumnList,
            Envelope::RichText(_) => EnvelopeKind::RichText,
        }
    }

    /// True when the payload carries nothing.
    pub fn is_null(&self) -> bool {
        match self {
            Envelope::Text(text) => text.is_empty(),
            Envelope::Column(items) => items.is_empty(),
            Envelope::ColumnList(columns) => columns.iter().all(Vec::is_empty),
            Envelope::RichText(rich) => rich.result_text.is_empty() && rich.removed_count == 0,
        }
    }

    /// Payload size in bytes, used for output metrics.
    pub fn byte_len(&self) -> usize {
        match self {
            Envelope::Text(text) => text.len(),
            Envelope::Column(items) => items.iter().map(String::len).sum(),
            Envelope::ColumnList(columns) => columns.iter().flatten().map(String::len).sum(),
            Envelope::RichText(rich) => rich.result_text.len(),
        }
    }

    /// Infer an envelope from an untyped JSON payload.
    ///
    /// Arrays of arrays become `ColumnList`, other arrays `Column`, objects
    /// carrying `resultText` (or `result_text`) become `RichText`, and anything
    /// else is rendered as `Text`. `null` yields an empty `Text`.
    pub fn wrap(value: Value) -> Self {
        match value {
            Value::Null => Envelope::default(),
            Value::String(text) => Envelope::Text(text),
            Value::Array(items) => {
                if !items.is_empty() && items.iter().all(Value::is_array) {
                    let columns = items
                        .into_iter()
                        .map(|column| match column {
                            Value::Array(cells) => cells.into_iter().map(value_to_string).collect(),
                            _ => Vec::new(),
                        })
                        .collect();
                    Envelope::ColumnList(columns)
                } else {
                    Envelope::Column(items.into_iter().map(value_to_string).collect())
                }
            }
            Value::Object(map) => {
                let text = map.get("resultText").or_else(|| map.get("result_text"));
                match text {
                    Some(text) => {
                        let removed_count = ["removedCount", "removed_count", "removed_lines"]
                            .iter()
                            .find_map(|key| map.get(*key).and_then(Value::as_u64))
                            .unwrap_or(0) as usize;
                        let metrics = map
                            .get("metrics")
                            .cloned()
                            .and_then(|m| serde_json::from_value(m).ok())
                            .unwrap_or_default();
                        Envelope::RichText(RichText {
                            result_text: value_to_string(text.clone()),
                            removed_count,
                            metrics,
                        })
                    }
                    None => Envelope::Text(Value::Object(map).to_string()),
                }
            }
            other => Envelope::Text(other.to_string()),
        }
    }

    /// Convert to `T`, failing for pairs outside the coercion table.
    pub fn try_convert<T: FromEnvelope>(&self) -> Result<T, crate::ProcessingError> {
        T::from_envelope(self).ok_or(crate::ProcessingError::UnsupportedConversion {
            from: self.kind(),
            to: T::KIND,
        })
    }

    /// Convert to `T`, resolving unsupported pairs to `fallback`.
    pub fn convert<T: FromEnvelope>(&self, fallback: T) -> T {
        T::from_envelope(self).unwrap_or(fallback)
    }
}

fn value_to_string(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
