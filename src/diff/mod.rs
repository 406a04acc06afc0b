//! Line-level and word-level difference computation.
//!
//! Pure functions only; the Diff operation and the CLI both build on these.

mod line;
mod pairing;
mod word;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use line::{LineDiffOptions, compute_line_diff, compute_line_diff_with, diff_texts};
pub use pairing::{DiffGroups, DiffPair, group_diff_results, pair_diff_results};
pub use word::{WordDiff, WordDiffKind, similarity, tokenize, word_diffs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Added,
    Removed,
    Moved,
    Unchanged,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiffKind::Added => "added",
            DiffKind::Removed => "removed",
            DiffKind::Moved => "moved",
            DiffKind::Unchanged => "unchanged",
        };
        f.write_str(name)
    }
}

/// One classified line. `line_number` is 1-based and refers to the new text
/// for added/moved/unchanged lines and to the old text for removed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffEntry {
    pub kind: DiffKind,
    pub text: String,
    pub line_number: usize,
}

impl DiffEntry {
    pub fn new(kind: DiffKind, text: impl Into<String>, line_number: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line_number,
        }
    }
}
