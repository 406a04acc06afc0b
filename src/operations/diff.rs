use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{ChunkPosition, ChunkTransform, JobConfig, Operation, OperationConfig, OperationKind};
use crate::backend::{BackendDiffEntry, DiffArgs, NativeRequest, ProcessedText};
use crate::diff::{DiffEntry, LineDiffOptions, compute_line_diff_with};
use crate::envelope::Envelope;
use crate::error::ProcessingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiffParams {
    pub case_sensitive: bool,
    pub ignore_whitespace: bool,
}

impl Default for DiffParams {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            ignore_whitespace: false,
        }
    }
}

impl DiffParams {
    pub fn line_options(&self) -> LineDiffOptions {
        LineDiffOptions {
            case_sensitive: self.case_sensitive,
            ignore_whitespace: self.ignore_whitespace,
        }
    }
}

/// Line diff of `source_text` (old) against `main_param` (new).
///
/// Output is `Text` holding one serialized [`DiffEntry`] per line.
pub struct Diff;

impl Operation for Diff {
    const KIND: OperationKind = OperationKind::Diff;
    type Params = DiffParams;

    /// Either side may be empty.
    fn validate(_config: &OperationConfig<DiffParams>) -> Result<(), ProcessingError> {
        Ok(())
    }

    fn into_job(config: OperationConfig<DiffParams>) -> JobConfig {
        JobConfig::Diff(config)
    }

    fn native_request(config: &OperationConfig<DiffParams>) -> NativeRequest {
        NativeRequest::Diff(DiffArgs {
            oldtext: config.source_text.clone(),
            newtext: config.main_param.clone(),
            ignorewhitespace: config.config_params.ignore_whitespace,
            casesensitive: config.config_params.case_sensitive,
        })
    }

    fn from_native(reply: ProcessedText<Value>) -> Result<Envelope, ProcessingError> {
        let raw = match reply.result_text {
            Value::String(text) => text,
            Value::Null => String::new(),
            other => {
                return Err(ProcessingError::TransportFailure(format!(
                    "diff reply is not text: {other}"
                )));
            }
        };
        let mut entries = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            let entry: BackendDiffEntry = serde_json::from_str(line).map_err(|e| {
                ProcessingError::TransportFailure(format!("malformed diff entry: {e}"))
            })?;
            entries.push(DiffEntry::from(entry));
        }
        render_diff_entries(&entries)
    }
}

/// One JSON object per line.
pub fn render_diff_entries(entries: &[DiffEntry]) -> Result<Envelope, ProcessingError> {
    let lines = entries
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ProcessingError::Unknown(e.to_string()))?;
    Ok(Envelope::text(lines.join("\n")))
}

/// Parse a diff envelope's text back into entries.
pub fn parse_diff_entries(text: &str) -> Result<Vec<DiffEntry>, ProcessingError> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| ProcessingError::Unknown(e.to_string())))
        .collect()
}

/// Diffs each old-text chunk against the same line range of the new text.
/// The last chunk also takes every remaining new line.
pub struct DiffTransform {
    new_lines: Vec<String>,
    options: LineDiffOptions,
}

impl DiffTransform {
    pub fn new(config: &OperationConfig<DiffParams>) -> Self {
        Self {
            new_lines: config.main_param.lines().map(str::to_string).collect(),
            options: config.config_params.line_options(),
        }
    }
}

impl ChunkTransform for DiffTransform {
    fn apply(&mut self, lines: &[&str], at: ChunkPosition) -> Result<Envelope, ProcessingError> {
        let start = at.offset.min(self.new_lines.len());
        let end = if at.last {
            self.new_lines.len()
        } else {
            (at.offset + lines.len()).min(self.new_lines.len())
        };
        let new_slice: Vec<&str> = self.new_lines[start..end].iter().map(String::as_str).collect();

        let mut entries = compute_line_diff_with(lines, &new_slice, &self.options);
        for entry in &mut entries {
            entry.line_number += at.offset;
        }
        render_diff_entries(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffKind;

    fn run_chunked(old: &str, new: &str, chunk: usize) -> Vec<DiffEntry> {
        let config = OperationConfig::new(old, new, DiffParams::default());
        let mut transform = DiffTransform::new(&config);
        let lines: Vec<&str> = old.lines().collect();
        let mut out = Vec::new();
        let chunks: Vec<&[&str]> = lines.chunks(chunk).collect();
        for (i, c) in chunks.iter().enumerate() {
            let at = ChunkPosition {
                offset: i * chunk,
                last: i + 1 == chunks.len(),
            };
            match transform.apply(c, at).unwrap() {
                Envelope::Text(text) => out.extend(parse_diff_entries(&text).unwrap()),
                other => panic!("unexpected {other:?}"),
            }
        }
        out
    }

    #[test]
    fn test_whole_text_scenario() {
        let entries = run_chunked("L1\nL2\nL3", "L1\nL3\nL4", 10);
        assert!(entries.contains(&DiffEntry::new(DiffKind::Unchanged, "L1", 1)));
        assert!(entries.contains(&DiffEntry::new(DiffKind::Moved, "L3", 2)));
        assert!(entries.contains(&DiffEntry::new(DiffKind::Added, "L4", 3)));
        assert!(entries.contains(&DiffEntry::new(DiffKind::Removed, "L2", 2)));
        assert_eq!(entries.len(), 4);
    }

    #[test]
    fn test_chunks_offset_line_numbers_and_keep_tail() {
        let entries = run_chunked("a\nb\nc", "a\nb\nX\nY", 2);
        assert_eq!(
            entries,
            vec![
                DiffEntry::new(DiffKind::Unchanged, "a", 1),
                DiffEntry::new(DiffKind::Unchanged, "b", 2),
                DiffEntry::new(DiffKind::Added, "X", 3),
                DiffEntry::new(DiffKind::Removed, "c", 3),
                DiffEntry::new(DiffKind::Added, "Y", 4),
            ]
        );
    }

    #[test]
    fn test_line_crossing_chunk_boundary_is_removed_and_added() {
        let old = "a\nb\nc\nd";
        let new = "X\na\nb\nc\nd";

        let whole = crate::diff::diff_texts(old, new, &LineDiffOptions::default());
        assert_eq!(
            whole,
            vec![
                DiffEntry::new(DiffKind::Added, "X", 1),
                DiffEntry::new(DiffKind::Moved, "a", 2),
                DiffEntry::new(DiffKind::Moved, "b", 3),
                DiffEntry::new(DiffKind::Moved, "c", 4),
                DiffEntry::new(DiffKind::Moved, "d", 5),
            ]
        );

        // "b" is pushed into the next chunk's range of new lines
        assert_eq!(
            run_chunked(old, new, 2),
            vec![
                DiffEntry::new(DiffKind::Added, "X", 1),
                DiffEntry::new(DiffKind::Moved, "a", 2),
                DiffEntry::new(DiffKind::Removed, "b", 2),
                DiffEntry::new(DiffKind::Added, "b", 3),
                DiffEntry::new(DiffKind::Moved, "c", 4),
                DiffEntry::new(DiffKind::Moved, "d", 5),
            ]
        );
    }

    #[test]
    fn test_native_entries_are_renamed() {
        let reply = ProcessedText {
            result_text: Value::String(
                "{\"text\":\"x\",\"diff_type\":\"added\",\"line_number\":1}".into(),
            ),
            removed_lines: 0,
            metrics: Default::default(),
        };
        let env = Diff::from_native(reply).unwrap();
        assert_eq!(
            env,
            Envelope::text("{\"kind\":\"added\",\"text\":\"x\",\"lineNumber\":1}")
        );
    }
}
