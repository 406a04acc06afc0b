use std::collections::HashMap;

use super::{DiffEntry, DiffKind};

/// Comparison options for line classification. Emitted text is always the
/// original line; only the comparison key is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineDiffOptions {
    pub case_sensitive: bool,
    pub ignore_whitespace: bool,
}

impl Default for LineDiffOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            ignore_whitespace: false,
        }
    }
}

impl LineDiffOptions {
    fn key(&self, line: &str) -> String {
        let line = if self.ignore_whitespace {
            line.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            line.to_string()
        };
        if self.case_sensitive {
            line
        } else {
            line.to_lowercase()
        }
    }
}

/// Diff two texts line by line with exact comparison.
pub fn compute_line_diff(old_lines: &[&str], new_lines: &[&str]) -> Vec<DiffEntry> {
    compute_line_diff_with(old_lines, new_lines, &LineDiffOptions::default())
}

/// Split both texts on line boundaries and diff them.
pub fn diff_texts(old_text: &str, new_text: &str, options: &LineDiffOptions) -> Vec<DiffEntry> {
    let old_lines: Vec<&str> = old_text.lines().collect();
    let new_lines: Vec<&str> = new_text.lines().collect();
    compute_line_diff_with(&old_lines, &new_lines, options)
}

pub fn compute_line_diff_with(
    old_lines: &[&str],
    new_lines: &[&str],
    options: &LineDiffOptions,
) -> Vec<DiffEntry> {
    if old_lines.is_empty() && new_lines.is_empty() {
        return Vec::new();
    }

    let old_keys: Vec<String> = old_lines.iter().map(|l| options.key(l)).collect();
    let new_keys: Vec<String> = new_lines.iter().map(|l| options.key(l)).collect();

    let mut old_counts: HashMap<&str, usize> = HashMap::new();
    let mut first_old_index: HashMap<&str, usize> = HashMap::new();
    for (i, key) in old_keys.iter().enumerate() {
        *old_counts.entry(key).or_default() += 1;
        first_old_index.entry(key).or_insert(i);
    }
    let mut new_counts: HashMap<&str, usize> = HashMap::new();
    for key in &new_keys {
        *new_counts.entry(key).or_default() += 1;
    }

    fn count(map: &HashMap<&str, usize>, key: &str) -> usize {
        map.get(key).copied().unwrap_or(0)
    }
    let is_common = |key: &str| old_counts.contains_key(key) && new_counts.contains_key(key);

    // Entries keep their comparison key until the moved-pairing pass.
    let mut entries: Vec<(DiffEntry, &str)> = Vec::with_capacity(old_lines.len() + new_lines.len());

    for (i, (line, key)) in new_lines.iter().zip(&new_keys).enumerate() {
        let key = key.as_str();
        let common = is_common(key);
        let kind = if common && first_old_index.get(key).is_some_and(|&idx| idx != i) {
            DiffKind::Moved
        } else if !common || count(&new_counts, key) > count(&old_counts, key) {
            DiffKind::Added
        } else {
            DiffKind::Unchanged
        };
        entries.push((DiffEntry::new(kind, *line, i + 1), key));
    }

    for (i, (line, key)) in old_lines.iter().zip(&old_keys).enumerate() {
        let key = key.as_str();
        if !is_common(key) || count(&old_counts, key) > count(&new_counts, key) {
            entries.push((DiffEntry::new(DiffKind::Removed, *line, i + 1), key));
        }
    }

    entries.sort_by_key(|(entry, _)| entry.line_number);
    pair_moved_lines(&mut entries);

    entries.into_iter().map(|(entry, _)| entry).collect()
}

/// Each removed line claims the first unclaimed added line with the same key;
/// both become moved. Identical but unrelated lines pair up too.
fn pair_moved_lines(entries: &mut [(DiffEntry, &str)]) {
    let added: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, (e, _))| e.kind == DiffKind::Added)
        .map(|(i, _)| i)
        .collect();
    let removed: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, (e, _))| e.kind == DiffKind::Removed)
        .map(|(i, _)| i)
        .collect();

    let mut claimed = vec![false; added.len()];
    for r in removed {
        let key = entries[r].1;
        let hit = added
            .iter()
            .enumerate()
            .find(|(slot, a)| !claimed[*slot] && entries[**a].1 == key)
            .map(|(slot, a)| (slot, *a));
        if let Some((slot, a)) = hit {
            claimed[slot] = true;
            entries[a].0.kind = DiffKind::Moved;
            entries[r].0.kind = DiffKind::Moved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(entries: &[DiffEntry]) -> Vec<(DiffKind, &str, usize)> {
        entries
            .iter()
            .map(|e| (e.kind, e.text.as_str(), e.line_number))
            .collect()
    }

    #[test]
    fn test_empty_inputs_yield_nothing() {
        assert!(compute_line_diff(&[], &[]).is_empty());
        assert!(diff_texts("", "", &LineDiffOptions::default()).is_empty());
    }

    #[test]
    fn test_moved_added_removed_classification() {
        let result = compute_line_diff(&["L1", "L2", "L3"], &["L1", "L3", "L4"]);
        assert_eq!(
            kinds(&result),
            vec![
                (DiffKind::Unchanged, "L1", 1),
                (DiffKind::Moved, "L3", 2),
                (DiffKind::Removed, "L2", 2),
                (DiffKind::Added, "L4", 3),
            ]
        );
    }

    #[test]
    fn test_sorted_by_line_number() {
        let result = compute_line_diff(&["a", "b", "c", "d"], &["x", "a"]);
        let numbers: Vec<usize> = result.iter().map(|e| e.line_number).collect();
        let mut sorted = numbers.clone();
        sorted.sort();
        assert_eq!(numbers, sorted);
    }

    #[test]
    fn test_extra_occurrence_is_added() {
        // "x" appears twice in new, once in old: the first copy is the surplus,
        // the second sits at a different index than the old one.
        let result = compute_line_diff(&["x"], &["x", "x"]);
        assert_eq!(
            kinds(&result),
            vec![(DiffKind::Added, "x", 1), (DiffKind::Moved, "x", 2)]
        );
    }

    #[test]
    fn test_surplus_old_occurrences_are_removed() {
        // Both old copies of "y" outnumber the single new one.
        let result = compute_line_diff(&["y", "y"], &["p", "y"]);
        assert_eq!(
            kinds(&result),
            vec![
                (DiffKind::Added, "p", 1),
                (DiffKind::Removed, "y", 1),
                (DiffKind::Moved, "y", 2),
                (DiffKind::Removed, "y", 2),
            ]
        );
    }

    #[test]
    fn test_ignore_whitespace_and_case() {
        let opts = LineDiffOptions {
            case_sensitive: false,
            ignore_whitespace: true,
        };
        let result = diff_texts("Hello   World\nfoo", "hello world\nfoo", &opts);
        assert!(result.iter().all(|e| e.kind == DiffKind::Unchanged));
        assert_eq!(result[0].text, "hello world");

        let strict = diff_texts("Hello   World", "hello world", &LineDiffOptions::default());
        assert_eq!(
            kinds(&strict),
            vec![
                (DiffKind::Added, "hello world", 1),
                (DiffKind::Removed, "Hello   World", 1),
            ]
        );
    }
}
