use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"\S+|\s+").unwrap();
}

/// Tokens within this many positions count as "nearby" when looking for swaps.
const LOOK_AHEAD: usize = 3;
const CHANGED_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WordDiffKind {
    Added,
    Removed,
    Moved,
    Changed,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordDiff {
    pub kind: WordDiffKind,
    pub text: String,
}

impl WordDiff {
    fn new(kind: WordDiffKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
        }
    }
}

/// Alternating runs of whitespace and non-whitespace.
pub fn tokenize(line: &str) -> Vec<&str> {
    TOKEN.find_iter(line).map(|m| m.as_str()).collect()
}

/// Ratio of positionally equal characters to the longer string's length.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let same = a.chars().zip(b.chars()).filter(|(x, y)| x == y).count();
    same as f64 / len_a.max(len_b) as f64
}

/// Word-level differences between one old line and its paired new line, in
/// reading order.
pub fn word_diffs(old_line: &str, new_line: &str) -> Vec<WordDiff> {
    if old_line.is_empty() || new_line.is_empty() {
        return match (old_line.is_empty(), new_line.is_empty()) {
            (false, _) => vec![WordDiff::new(WordDiffKind::Removed, old_line)],
            (true, false) => vec![WordDiff::new(WordDiffKind::Added, new_line)],
            (true, true) => Vec::new(),
        };
    }

    let old_tokens = tokenize(old_line);
    let new_tokens = tokenize(new_line);
    let mut result = Vec::with_capacity(old_tokens.len().max(new_tokens.len()));
    let (mut o, mut n) = (0, 0);

    while o < old_tokens.len() && n < new_tokens.len() {
        let old_tok = old_tokens[o];
        let new_tok = new_tokens[n];

        if old_tok == new_tok {
            result.push(WordDiff::new(WordDiffKind::Unchanged, old_tok));
            o += 1;
            n += 1;
            continue;
        }

        let old_ahead = window(&old_tokens, o);
        let new_ahead = window(&new_tokens, n);
        let old_in_new = new_ahead.contains(&old_tok);
        let new_in_old = old_ahead.contains(&new_tok);

        match (old_in_new, new_in_old) {
            (true, true) => {
                result.push(WordDiff::new(WordDiffKind::Moved, old_tok));
                o += 1;
            }
            (true, false) => {
                result.push(WordDiff::new(WordDiffKind::Added, new_tok));
                n += 1;
            }
            (false, true) => {
                result.push(WordDiff::new(WordDiffKind::Removed, old_tok));
                o += 1;
            }
            (false, false) => {
                if similarity(old_tok, new_tok) > CHANGED_THRESHOLD {
                    result.push(WordDiff::new(WordDiffKind::Changed, new_tok));
                } else {
                    result.push(WordDiff::new(WordDiffKind::Removed, old_tok));
                    result.push(WordDiff::new(WordDiffKind::Added, new_tok));
                }
                o += 1;
                n += 1;
            }
        }
    }

    result.extend(
        old_tokens[o..]
            .iter()
            .map(|t| WordDiff::new(WordDiffKind::Removed, t)),
    );
    result.extend(
        new_tokens[n..]
            .iter()
            .map(|t| WordDiff::new(WordDiffKind::Added, t)),
    );
    result
}

fn window<'a>(tokens: &'a [&'a str], at: usize) -> &'a [&'a str] {
    let start = (at + 1).min(tokens.len());
    let end = (at + 1 + LOOK_AHEAD).min(tokens.len());
    &tokens[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(diffs: &[WordDiff]) -> Vec<(WordDiffKind, &str)> {
        diffs.iter().map(|d| (d.kind, d.text.as_str())).collect()
    }

    #[test]
    fn test_tokenize_preserves_whitespace_runs() {
        assert_eq!(tokenize("a  bc\td"), vec!["a", "  ", "bc", "\t", "d"]);
    }

    #[test]
    fn test_empty_sides() {
        assert!(word_diffs("", "").is_empty());
        assert_eq!(render(&word_diffs("old", "")), vec![(WordDiffKind::Removed, "old")]);
        assert_eq!(render(&word_diffs("", "new")), vec![(WordDiffKind::Added, "new")]);
    }

    #[test]
    fn test_similar_word_is_changed() {
        let diffs = word_diffs("the color red", "the colour red");
        assert_eq!(
            render(&diffs),
            vec![
                (WordDiffKind::Unchanged, "the"),
                (WordDiffKind::Unchanged, " "),
                (WordDiffKind::Changed, "colour"),
                (WordDiffKind::Unchanged, " "),
                (WordDiffKind::Unchanged, "red"),
            ]
        );
    }

    #[test]
    fn test_dissimilar_word_is_replaced() {
        let diffs = word_diffs("cat", "dog");
        assert_eq!(
            render(&diffs),
            vec![(WordDiffKind::Removed, "cat"), (WordDiffKind::Added, "dog")]
        );
    }

    #[test]
    fn test_inserted_word_is_added() {
        let diffs = word_diffs("a c", "a b c");
        assert_eq!(
            render(&diffs),
            vec![
                (WordDiffKind::Unchanged, "a"),
                (WordDiffKind::Unchanged, " "),
                (WordDiffKind::Added, "b"),
                (WordDiffKind::Added, " "),
                (WordDiffKind::Unchanged, "c"),
            ]
        );
    }

    #[test]
    fn test_trailing_tokens() {
        let diffs = word_diffs("a", "a b");
        assert_eq!(
            render(&diffs),
            vec![
                (WordDiffKind::Unchanged, "a"),
                (WordDiffKind::Added, " "),
                (WordDiffKind::Added, "b"),
            ]
        );
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("abcd", "abxd"), 0.75);
    }
}
