//! The 20 weighted signals and their default weights.

use core_types::{CiStatus, Intent, Mergeable, PrRecord, ReviewState, SignalScore};

pub const DEFAULT_SPAM_THRESHOLD: f64 = 25.0;

#[derive(Debug, Clone, Copy)]
pub struct SignalWeights {
    pub ci_status: f64,
    pub diff_size: f64,
    pub commit_quality: f64,
    pub contributor: f64,
    pub issue_ref: f64,
    pub spam: f64,
    pub test_coverage: f64,
    pub staleness: f64,
    pub mergeability: f64,
    pub review_status: f64,
    pub body_quality: f64,
    pub activity: f64,
    pub breaking_change: f64,
    pub draft_status: f64,
    pub milestone: f64,
    pub label_priority: f64,
    pub codeowners: f64,
    pub requested_reviewers: f64,
    pub scope_coherence: f64,
    pub complexity: f64,
    pub intent: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        SignalWeights {
            ci_status: 0.15,
            diff_size: 0.07,
            commit_quality: 0.04,
            contributor: 0.12,
            issue_ref: 0.07,
            spam: 0.12,
            test_coverage: 0.12,
            staleness: 0.07,
            mergeability: 0.12,
            review_status: 0.08,
            body_quality: 0.04,
            activity: 0.04,
            breaking_change: 0.04,
            draft_status: 0.08,
            milestone: 0.07,
            label_priority: 0.05,
            codeowners: 0.10,
            requested_reviewers: 0.05,
            scope_coherence: 0.05,
            complexity: 0.05,
            intent: 0.09,
        }
    }
}

impl SignalWeights {
    pub fn as_pairs(&self) -> [(&'static str, f64); 21] {
        [
            ("ci_status", self.ci_status),
            ("diff_size", self.diff_size),
            ("commit_quality", self.commit_quality),
            ("contributor", self.contributor),
            ("issue_ref", self.issue_ref),
            ("spam", self.spam),
            ("test_coverage", self.test_coverage),
            ("staleness", self.staleness),
            ("mergeability", self.mergeability),
            ("review_status", self.review_status),
            ("body_quality", self.body_quality),
            ("activity", self.activity),
            ("breaking_change", self.breaking_change),
            ("draft_status", self.draft_status),
            ("milestone", self.milestone),
            ("label_priority", self.label_priority),
            ("codeowners", self.codeowners),
            ("requested_reviewers", self.requested_reviewers),
            ("scope_coherence", self.scope_coherence),
            ("complexity", self.complexity),
            ("intent", self.intent),
        ]
    }

    /// Multiplies the baseline weights by a per-intent profile and
    /// renormalises so the weights sum to 1.
    pub fn for_intent(&self, intent: Option<Intent>) -> SignalWeights {
        let mut w = *self;
        match intent {
            Some(Intent::Bugfix) => {
                w.ci_status *= 1.4;
                w.test_coverage *= 1.3;
            }
            Some(Intent::Docs) => {
                w.ci_status *= 0.5;
                w.test_coverage *= 0.4;
            }
            Some(Intent::Dependency) => {
                w.ci_status *= 1.3;
                w.diff_size *= 0.6;
            }
            Some(Intent::Refactor) => {
                w.test_coverage *= 1.3;
                w.breaking_change *= 1.4;
            }
            Some(Intent::Chore) => {
                w.ci_status *= 1.2;
            }
            Some(Intent::Feature) => {
                w.body_quality *= 1.3;
                w.scope_coherence *= 1.3;
            }
            None => {}
        }

        let sum: f64 = w.as_pairs().iter().map(|(_, v)| v).sum();
        if sum > 0.0 {
            let scale = |v: f64| v / sum;
            w.ci_status = scale(w.ci_status);
            w.diff_size = scale(w.diff_size);
            w.commit_quality = scale(w.commit_quality);
            w.contributor = scale(w.contributor);
            w.issue_ref = scale(w.issue_ref);
            w.spam = scale(w.spam);
            w.test_coverage = scale(w.test_coverage);
            w.staleness = scale(w.staleness);
            w.mergeability = scale(w.mergeability);
            w.review_status = scale(w.review_status);
            w.body_quality = scale(w.body_quality);
            w.activity = scale(w.activity);
            w.breaking_change = scale(w.breaking_change);
            w.draft_status = scale(w.draft_status);
            w.milestone = scale(w.milestone);
            w.label_priority = scale(w.label_priority);
            w.codeowners = scale(w.codeowners);
            w.requested_reviewers = scale(w.requested_reviewers);
            w.scope_coherence = scale(w.scope_coherence);
            w.complexity = scale(w.complexity);
            w.intent = scale(w.intent);
        }
        w
    }

    pub fn weight_for(&self, name: &str) -> f64 {
        self.as_pairs()
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }
}

fn sig(name: &str, score: f64, weight: f64, reason: impl Into<String>) -> SignalScore {
    SignalScore {
        name: name.to_string(),
        score: score.clamp(0.0, 100.0),
        weight,
        reason: reason.into(),
    }
}

pub fn ci_status(pr: &PrRecord, w: f64) -> SignalScore {
    let (score, reason) = match pr.ci_status {
        CiStatus::Success => (100.0, "CI succeeded"),
        CiStatus::Pending => (50.0, "CI pending"),
        CiStatus::Unknown => (40.0, "CI status unknown"),
        CiStatus::Failure => (10.0, "CI failed"),
    };
    sig("ci_status", score, w, reason)
}

pub fn diff_size(pr: &PrRecord, w: f64) -> SignalScore {
    let lines = pr.additions + pr.deletions;
    let score = match lines {
        0..=4 => 20.0,
        5..=49 => 70.0,
        50..=499 => 100.0,
        500..=1999 => 60.0,
        _ => 30.0,
    };
    sig("diff_size", score, w, format!("{lines} lines changed"))
}

pub fn commit_quality(pr: &PrRecord, w: f64) -> SignalScore {
    let conventional = crate::intent::CONVENTIONAL_PREFIX.is_match(&pr.title);
    let score = if conventional { 90.0 } else { 50.0 };
    sig("commit_quality", score, w, "conventional-commit title check")
}

pub fn contributor(pr: &PrRecord, reputation: Option<u8>, w: f64) -> SignalScore {
    let base = pr.author_association.baseline_score();
    let score = match reputation {
        Some(rep) => 0.7 * base + 0.3 * rep as f64,
        None => base,
    };
    sig("contributor", score, w, format!("author association {:?}", pr.author_association))
}

pub fn issue_ref(pr: &PrRecord, w: f64) -> SignalScore {
    let score = if pr.issue_numbers.is_empty() { 30.0 } else { 90.0 };
    sig("issue_ref", score, w, "issue reference presence")
}

pub fn spam(pr: &PrRecord, trusted: bool, w: f64) -> (SignalScore, Vec<String>) {
    if trusted {
        return (sig("spam", 100.0, w, "trusted contributor exemption"), vec![]);
    }
    let lines = pr.additions + pr.deletions;
    let mut points = 0u32;
    let mut reasons = Vec::new();
    if lines < 3 {
        points += 2;
        reasons.push("fewer than 3 lines changed".to_string());
    } else if lines < 5 {
        points += 1;
        reasons.push("fewer than 5 lines changed".to_string());
    }
    if pr.issue_numbers.is_empty() {
        points += 1;
        reasons.push("no issue reference".to_string());
    }
    if pr.body.trim().len() < 20 {
        points += 1;
        reasons.push("body shorter than 20 characters".to_string());
    }
    let docs_only = !pr.changed_files.is_empty()
        && pr.changed_files.iter().all(|f| f.ends_with(".md") || f.contains("docs/"));
    if docs_only {
        points += 1;
        reasons.push("trivial docs-only change".to_string());
    }
    let score = (100.0 - 25.0 * points as f64).max(0.0);
    (sig("spam", score, w, reasons.join("; ")), reasons)
}

pub fn test_coverage(pr: &PrRecord, w: f64) -> SignalScore {
    let score = if pr.has_tests {
        90.0
    } else if pr.changed_files.iter().all(|f| {
        f.ends_with(".md") || f.ends_with(".toml") || f.ends_with(".yml") || f.ends_with(".yaml") || f.ends_with(".json")
    }) && !pr.changed_files.is_empty()
    {
        60.0
    } else {
        20.0
    };
    sig("test_coverage", score, w, "test file presence")
}

pub fn staleness(pr: &PrRecord, w: f64) -> SignalScore {
    let score = match pr.age_in_days {
        0..=6 => 100.0,
        7..=30 => 70.0,
        31..=90 => 40.0,
        _ => 15.0,
    };
    sig("staleness", score, w, format!("{} days old", pr.age_in_days))
}

pub fn mergeability(pr: &PrRecord, w: f64) -> SignalScore {
    let score = match pr.mergeable {
        Mergeable::Mergeable => 100.0,
        Mergeable::Unknown => 50.0,
        Mergeable::Conflicting => 10.0,
    };
    sig("mergeability", score, w, format!("{:?}", pr.mergeable))
}

pub fn review_status(pr: &PrRecord, w: f64) -> SignalScore {
    let mut score = match pr.review_state {
        ReviewState::Approved => 100.0,
        ReviewState::ChangesRequested => 30.0,
        ReviewState::Commented => 60.0,
        ReviewState::NoneState => 40.0,
    };
    if pr.review_count >= 2 {
        score += 10.0;
    }
    sig("review_status", score, w, format!("{:?}, {} reviews", pr.review_state, pr.review_count))
}

pub fn body_quality(pr: &PrRecord, w: f64) -> SignalScore {
    let len = pr.body.len();
    let mut score = if len > 500 {
        90.0
    } else if len >= 200 {
        70.0
    } else if len >= 50 {
        50.0
    } else {
        20.0
    };
    if pr.body.contains("- [ ]") || pr.body.contains("- [x]") {
        score += 10.0;
    }
    if pr.body.contains("![") || pr.body.contains("<img") {
        score += 10.0;
    }
    sig("body_quality", score, w, format!("body length {len}"))
}

pub fn activity(pr: &PrRecord, w: f64) -> SignalScore {
    let score = match pr.comment_count {
        0 => 30.0,
        1 => 50.0,
        2..=4 => 70.0,
        _ => 90.0,
    };
    sig("activity", score, w, format!("{} comments", pr.comment_count))
}

pub fn breaking_change(pr: &PrRecord, w: f64) -> SignalScore {
    let title_lower = pr.title.to_lowercase();
    let touches_api_or_config = pr
        .changed_files
        .iter()
        .any(|f| f.contains("api/") || f.ends_with(".toml") || f.ends_with(".yml") || f.ends_with(".yaml"));
    let breaking = title_lower.contains("breaking")
        || crate::intent::CONVENTIONAL_BANG.is_match(&pr.title)
        || pr.deletions > 100
        || touches_api_or_config;
    let score = if breaking { 40.0 } else { 80.0 };
    sig("breaking_change", score, w, "breaking-change heuristic")
}

pub fn draft_status(pr: &PrRecord, w: f64) -> SignalScore {
    let score = if pr.is_draft { 10.0 } else { 90.0 };
    sig("draft_status", score, w, "draft flag")
}

pub fn milestone(pr: &PrRecord, w: f64) -> SignalScore {
    let score = if pr.milestone.is_some() { 90.0 } else { 40.0 };
    sig("milestone", score, w, "milestone presence")
}

const PRIORITY_LABELS: [&str; 7] = [
    "high-priority",
    "urgent",
    "critical",
    "p0",
    "p1",
    "security",
    "bug",
];

pub fn label_priority(pr: &PrRecord, w: f64) -> SignalScore {
    let has_priority = pr.labels.iter().any(|l| PRIORITY_LABELS.contains(&l.to_lowercase().as_str()));
    let score = if has_priority {
        95.0
    } else if !pr.labels.is_empty() {
        50.0
    } else {
        30.0
    };
    sig("label_priority", score, w, "label priority heuristic")
}

pub fn codeowners(pr: &PrRecord, w: f64) -> SignalScore {
    let score = if pr.codeowners.is_empty() {
        40.0
    } else if pr.codeowners.iter().any(|o| o == &pr.author) {
        95.0
    } else {
        80.0
    };
    sig("codeowners", score, w, "codeowners match")
}

pub fn requested_reviewers(pr: &PrRecord, w: f64) -> SignalScore {
    let score = if pr.requested_reviewers.is_empty() { 40.0 } else { 80.0 };
    sig("requested_reviewers", score, w, "requested reviewer presence")
}

/// Heuristic cohesion of changed files: the fraction sharing the most
/// common top-level path segment.
pub fn scope_coherence(pr: &PrRecord, w: f64) -> SignalScore {
    if pr.changed_files.is_empty() {
        return sig("scope_coherence", 50.0, w, "no changed files to assess");
    }
    use std::collections::HashMap;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for f in &pr.changed_files {
        let top = f.split('/').next().unwrap_or(f);
        *counts.entry(top).or_insert(0) += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    let ratio = max as f64 / pr.changed_files.len() as f64;
    let score = (30.0 + 70.0 * ratio).clamp(30.0, 100.0);
    sig("scope_coherence", score, w, format!("{:.0}% of files share a top-level path", ratio * 100.0))
}

pub fn complexity(pr: &PrRecord, w: f64) -> SignalScore {
    let score = (100.0 - 5.0 * pr.commits as f64 - 2.0 * pr.files_changed as f64).clamp(20.0, 100.0);
    sig("complexity", score, w, format!("{} commits across {} files", pr.commits, pr.files_changed))
}

pub fn intent(intent: Option<Intent>, w: f64) -> SignalScore {
    let score = intent.map(Intent::signal_score).unwrap_or(50.0);
    sig("intent", score, w, format!("classified intent: {:?}", intent))
}
