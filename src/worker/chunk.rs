//! Chunk-and-aggregate loop shared by pooled workers and in-process execution.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::protocol::Chunking;
use crate::envelope::{BackendMetrics, Envelope, EnvelopeKind, MemoryProbe, Metrics, RichText};
use crate::error::ProcessingError;
use crate::operations::{ChunkPosition, JobConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Complete(Envelope, Metrics),
    /// Cancellation was observed between chunks.
    Aborted,
}

/// Merges chunk envelopes by shape.
#[derive(Debug, Default)]
pub enum Accumulator {
    #[default]
    Empty,
    Text(Vec<String>),
    RichText {
        lines: Vec<String>,
        removed: usize,
        metrics: BackendMetrics,
    },
    Column(Vec<String>),
    ColumnList(Vec<Vec<String>>),
}

impl Accumulator {
    pub fn merge(&mut self, chunk: Envelope) -> Result<(), ProcessingError> {
        if let Accumulator::Empty = self {
            *self = match chunk.kind() {
                EnvelopeKind::Text => Accumulator::Text(Vec::new()),
                EnvelopeKind::RichText => Accumulator::RichText {
                    lines: Vec::new(),
                    removed: 0,
                    metrics: BackendMetrics::default(),
                },
                EnvelopeKind::Column => Accumulator::Column(Vec::new()),
                EnvelopeKind::ColumnList => Accumulator::ColumnList(Vec::new()),
            };
        }

        match (self, chunk) {
            (Accumulator::Text(lines), Envelope::Text(text)) => {
                if !text.is_empty() {
                    lines.push(text);
                }
            }
            (
                Accumulator::RichText {
                    lines,
                    removed,
                    metrics,
                },
                Envelope::RichText(rich),
            ) => {
                if !rich.result_text.is_empty() {
                    lines.push(rich.result_text);
                }
                *removed += rich.removed_count;
                *metrics = rich.metrics;
            }
            (Accumulator::Column(items), Envelope::Column(more)) => items.extend(more),
            (Accumulator::ColumnList(columns), Envelope::ColumnList(more)) => {
                merge_columns(columns, more);
            }
            (acc, chunk) => {
                return Err(ProcessingError::Unknown(format!(
                    "chunk produced {} after {}",
                    chunk.kind(),
                    acc.describe()
                )));
            }
        }
        Ok(())
    }

    fn describe(&self) -> &'static str {
        match self {
            Accumulator::Empty => "nothing",
            Accumulator::Text(_) => "text",
            Accumulator::RichText { .. } => "richText",
            Accumulator::Column(_) => "column",
            Accumulator::ColumnList(_) => "columnList",
        }
    }

    pub fn finish(self) -> Envelope {
        match self {
            Accumulator::Empty => Envelope::default(),
            Accumulator::Text(lines) => Envelope::text(lines.join("\n")),
            Accumulator::RichText {
                lines,
                removed,
                metrics,
            } => Envelope::RichText(RichText {
                result_text: lines.join("\n"),
                removed_count: removed,
                metrics,
            }),
            Accumulator::Column(items) => Envelope::column(items),
            Accumulator::ColumnList(columns) => Envelope::column_list(columns),
        }
    }

    fn byte_len(&self) -> usize {
        match self {
            Accumulator::Empty => 0,
            Accumulator::Text(lines) | Accumulator::Column(lines) => lines.iter().map(String::len).sum(),
            Accumulator::RichText { lines, .. } => lines.iter().map(String::len).sum(),
            Accumulator::ColumnList(columns) => columns.iter().flatten().map(String::len).sum(),
        }
    }
}

/// Column `i` of `more` extends column `i` of `columns`. Rows stay aligned:
/// new columns are back-filled and short ones padded with empty cells.
fn merge_columns(columns: &mut Vec<Vec<String>>, more: Vec<Vec<String>>) {
    let rows_before = columns.first().map(Vec::len).unwrap_or(0);
    let rows_added = more.first().map(Vec::len).unwrap_or(0);
    while columns.len() < more.len() {
        columns.push(vec![String::new(); rows_before]);
    }
    let mut more = more.into_iter();
    for column in columns.iter_mut() {
        match more.next() {
            Some(cells) => column.extend(cells),
            None => column.extend(std::iter::repeat_n(String::new(), rows_added)),
        }
    }
}

/// Run a job chunk by chunk, reporting progress after every chunk.
///
/// Returns [`JobOutcome::Aborted`] if `cancel` fires before a chunk starts or
/// before the result is handed back.
pub fn run_job(
    config: &JobConfig,
    chunking: Chunking,
    cancel: Option<&CancellationToken>,
    mut on_progress: impl FnMut(u8, Metrics),
) -> Result<JobOutcome, ProcessingError> {
    let started = Instant::now();
    let mut probe = MemoryProbe::new();
    let baseline_memory = probe.sample();
    let cancelled = || cancel.is_some_and(CancellationToken::is_cancelled);

    let source = config.source_text();
    let lines: Vec<&str> = source.lines().collect();
    let total = lines.len();
    let mut transform = config.transformer()?;
    let mut acc = Accumulator::default();

    let size = match chunking {
        Chunking::Lines(n) if n > 0 => n,
        _ => total.max(1),
    };

    if lines.is_empty() {
        if cancelled() {
            return Ok(JobOutcome::Aborted);
        }
        acc.merge(transform.apply(&[], ChunkPosition::WHOLE)?)?;
    }

    let chunk_count = lines.len().div_ceil(size);
    for (index, chunk) in lines.chunks(size).enumerate() {
        if cancelled() {
            return Ok(JobOutcome::Aborted);
        }
        let offset = index * size;
        let at = ChunkPosition {
            offset,
            last: index + 1 == chunk_count,
        };
        acc.merge(transform.apply(chunk, at)?)?;

        let processed = offset + chunk.len();
        let percent = ((processed * 100) / total.max(1)).min(100) as u8;
        trace!("{} chunk {} done ({}%)", config.kind(), index, percent);
        on_progress(
            percent,
            Metrics::measure(started, baseline_memory, source.len(), acc.byte_len()),
        );
    }

    if cancelled() {
        return Ok(JobOutcome::Aborted);
    }
    let result = acc.finish();
    let metrics = Metrics::measure(started, probe.sample(), source.len(), result.byte_len());
    Ok(JobOutcome::Complete(result, metrics))
}

/// Whole-text execution on the calling thread, without progress.
pub fn run_in_process(config: &JobConfig) -> Result<(Envelope, Metrics), ProcessingError> {
    match run_job(config, Chunking::WholeText, None, |_, _| {})? {
        JobOutcome::Complete(result, metrics) => Ok((result, metrics)),
        JobOutcome::Aborted => Err(ProcessingError::Cancelled { kind: config.kind() }),
    }
}
