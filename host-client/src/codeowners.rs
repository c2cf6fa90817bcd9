//! CODEOWNERS parsing and glob matching.

use std::collections::HashMap;

use regex::Regex;

pub const CODEOWNERS_PATHS: [&str; 3] =
    [".github/CODEOWNERS", "CODEOWNERS", "docs/CODEOWNERS"];

/// Map from glob pattern to the list of owners responsible for it, in file
/// order (later entries in CODEOWNERS override earlier ones by convention,
/// but this type only records the mapping — last-match-wins is the caller's
/// responsibility).
pub type CodeownersMap = HashMap<String, Vec<String>>;

pub fn parse(contents: &str) -> CodeownersMap {
    let mut map = CodeownersMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let Some(pattern) = parts.next() else {
            continue;
        };
        let owners: Vec<String> = parts
            .map(|o| o.strip_prefix('@').unwrap_or(o).to_string())
            .collect();
        if !owners.is_empty() {
            map.insert(pattern.to_string(), owners);
        }
    }
    map
}

/// Converts a CODEOWNERS glob into an anchored regex: `*` → `.*`, `?` → `.`,
/// `.` → `\.`.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '.' => re.push_str("\\."),
            other => re.push(other),
        }
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Returns the union of owners whose pattern matches any of `changed_files`.
pub fn owners_for_files(map: &CodeownersMap, changed_files: &[String]) -> Vec<String> {
    let mut owners = Vec::new();
    for (pattern, pattern_owners) in map {
        let Some(re) = glob_to_regex(pattern) else {
            continue;
        };
        if changed_files.iter().any(|f| re.is_match(f)) {
            for o in pattern_owners {
                if !owners.contains(o) {
                    owners.push(o.clone());
                }
            }
        }
    }
    owners
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_matches_glob() {
        let map = parse("# comment\n*.rs @alice @bob\n/docs/* @carol\n");
        let owners = owners_for_files(&map, &["src/lib.rs".to_string()]);
        assert!(owners.contains(&"alice".to_string()));
        assert!(owners.contains(&"bob".to_string()));
        assert!(!owners.contains(&"carol".to_string()));
    }

    #[test]
    fn ignores_blank_and_comment_lines() {
        let map = parse("\n# nothing here\n\n");
        assert!(map.is_empty());
    }
}
