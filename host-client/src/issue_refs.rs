//! Extracts issue numbers referenced by a PR's title/body.

use regex::Regex;
use std::sync::LazyLock;

static STRONG_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(close[sd]?|fix(?:e[sd])?|resolve[sd]?|related to|addresses|refs?)\s+#(\d+)\b")
        .expect("static regex")
});

static LOOSE_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(\d+)").expect("static regex"));

/// Strong conventional-closing-phrase matches first; if none are found,
/// falls back to any `#N` with `0 < N < 100000`. The loose fallback may
/// yield duplicate numbers — retained deliberately for fidelity.
pub fn extract_issue_numbers(title: &str, body: &str) -> Vec<i64> {
    let text = format!("{title}\n{body}");

    let strong: Vec<i64> = STRONG_REF
        .captures_iter(&text)
        .filter_map(|c| c.get(2)?.as_str().parse().ok())
        .collect();
    if !strong.is_empty() {
        return strong;
    }

    LOOSE_REF
        .captures_iter(&text)
        .filter_map(|c| c.get(1)?.as_str().parse::<i64>().ok())
        .filter(|&n| n > 0 && n < 100_000)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_strong_matches() {
        let refs = extract_issue_numbers("fix: handle edge case", "Closes #12 and mentions #99 too");
        assert_eq!(refs, vec![12]);
    }

    #[test]
    fn falls_back_to_loose_matches_with_possible_duplicates() {
        let refs = extract_issue_numbers("see #5", "also #5 again");
        assert_eq!(refs, vec![5, 5]);
    }

    #[test]
    fn rejects_out_of_range_loose_numbers() {
        let refs = extract_issue_numbers("ref #100000", "");
        assert!(refs.is_empty());
    }
}
