/// Join two texts line by line: row *i* is `left[i] + separator + right[i]`.
///
/// The shorter text is padded with empty lines, so the result has as many
/// rows as the longer input.
pub fn connect_texts(left: &str, right: &str, separator: &str) -> String {
    let left: Vec<&str> = left.lines().collect();
    let right: Vec<&str> = right.lines().collect();
    let rows = left.len().max(right.len());

    (0..rows)
        .map(|i| {
            let l = left.get(i).copied().unwrap_or("");
            let r = right.get(i).copied().unwrap_or("");
            format!("{l}{separator}{r}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
