use serde::{Deserialize, Serialize};

use super::{DiffEntry, DiffKind, similarity};

const PAIR_THRESHOLD: f64 = 0.5;

/// Diff entries split by side for a two-pane view. Moved and unchanged lines
/// land in `other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffGroups {
    pub removed: Vec<DiffEntry>,
    pub added: Vec<DiffEntry>,
    pub other: Vec<DiffEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffPair {
    pub left: Option<DiffEntry>,
    pub right: Option<DiffEntry>,
}

impl DiffPair {
    fn sort_key(&self) -> usize {
        self.left
            .as_ref()
            .or(self.right.as_ref())
            .map(|e| e.line_number)
            .unwrap_or(0)
    }
}

pub fn group_diff_results(entries: &[DiffEntry]) -> DiffGroups {
    let mut groups = DiffGroups::default();
    for entry in entries {
        match entry.kind {
            DiffKind::Removed => groups.removed.push(entry.clone()),
            DiffKind::Added => groups.added.push(entry.clone()),
            DiffKind::Moved | DiffKind::Unchanged => groups.other.push(entry.clone()),
        }
    }
    groups
}

/// Pair removed lines with similar added lines for side-by-side display.
///
/// Non-removed, non-added lines pair with themselves. Each removed line takes
/// the first unclaimed added line whose similarity exceeds 0.5; leftovers get
/// an empty partner. Pairs are ordered by line number.
pub fn pair_diff_results(entries: &[DiffEntry]) -> Vec<DiffPair> {
    if entries.is_empty() {
        return Vec::new();
    }
    let DiffGroups {
        removed,
        added,
        other,
    } = group_diff_results(entries);

    let mut pairs: Vec<DiffPair> = other
        .into_iter()
        .map(|entry| DiffPair {
            left: Some(entry.clone()),
            right: Some(entry),
        })
        .collect();

    let mut added_claimed = vec![false; added.len()];
    let mut leftovers = Vec::new();
    for line in removed {
        let hit = added.iter().enumerate().position(|(i, candidate)| {
            !added_claimed[i] && similarity(&line.text, &candidate.text) > PAIR_THRESHOLD
        });
        match hit {
            Some(i) => {
                added_claimed[i] = true;
                pairs.push(DiffPair {
                    left: Some(line),
                    right: Some(added[i].clone()),
                });
            }
            None => leftovers.push(DiffPair {
                left: Some(line),
                right: None,
            }),
        }
    }
    pairs.extend(leftovers);
    pairs.extend(
        added
            .into_iter()
            .zip(added_claimed)
            .filter(|(_, claimed)| !claimed)
            .map(|(entry, _)| DiffPair {
                left: None,
                right: Some(entry),
            }),
    );

    pairs.sort_by_key(DiffPair::sort_key);
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::compute_line_diff;

    #[test]
    fn test_grouping() {
        let entries = compute_line_diff(&["L1", "L2", "L3"], &["L1", "L3", "L4"]);
        let groups = group_diff_results(&entries);
        assert_eq!(groups.removed.len(), 1);
        assert_eq!(groups.added.len(), 1);
        assert_eq!(groups.other.len(), 2);
    }

    #[test]
    fn test_similar_lines_pair_up() {
        let entries = compute_line_diff(&["let x = 1;", "fn main() {}"], &["let x = 2;", "fn main() {}"]);
        let pairs = pair_diff_results(&entries);
        assert_eq!(pairs.len(), 2);

        let first = &pairs[0];
        assert_eq!(first.left.as_ref().unwrap().text, "let x = 1;");
        assert_eq!(first.right.as_ref().unwrap().text, "let x = 2;");

        let second = &pairs[1];
        assert_eq!(second.left, second.right);
    }

    #[test]
    fn test_unrelated_lines_stay_apart() {
        let entries = compute_line_diff(&["alpha"], &["zzzzz"]);
        let pairs = pair_diff_results(&entries);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().any(|p| p.left.is_some() && p.right.is_none()));
        assert!(pairs.iter().any(|p| p.left.is_none() && p.right.is_some()));
    }

    #[test]
    fn test_empty() {
        assert!(pair_diff_results(&[]).is_empty());
    }
}
