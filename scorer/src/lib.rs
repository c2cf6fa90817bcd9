//! Weighted multi-signal scorer with intent-aware weight profiles and an
//! optional LLM risk blend.

pub mod intent;
pub mod reputation;
pub mod signals;
pub mod vision;

use core_types::{Item, PrRecord, RiskLevel, ScoredItem, SignalScore};
use llm_service::{GenerateOpts, ProviderAdapter};
use serde::Deserialize;
use tracing::{debug, warn};

pub use intent::{IntentClassifier, IntentResult};
pub use reputation::{blend as blend_reputation, AccountProfile, ReputationProbe};
pub use signals::SignalWeights;
pub use vision::VisionChecker;

#[derive(Debug, Clone)]
pub struct ScorerConfig {
    pub weights: SignalWeights,
    pub spam_threshold: f64,
    pub trust_contributors: bool,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        ScorerConfig {
            weights: SignalWeights::default(),
            spam_threshold: signals::DEFAULT_SPAM_THRESHOLD,
            trust_contributors: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LlmScoreResponse {
    score: f64,
    risk: String,
    reason: String,
}

pub struct Scorer {
    config: ScorerConfig,
    reputation: ReputationProbe,
    provider: Option<ProviderAdapter>,
}

impl Scorer {
    pub fn new(config: ScorerConfig, provider: Option<ProviderAdapter>) -> Self {
        Scorer {
            config,
            reputation: ReputationProbe::new(),
            provider,
        }
    }

    pub async fn set_reputation(&self, login: &str, score: u8) {
        self.reputation.set_reputation(login, score).await;
    }

    pub async fn score(&self, record: PrRecord) -> ScoredItem {
        let reputation = self.reputation.get(&record.author).await;
        let trusted = self.config.trust_contributors && matches!(
            record.author_association,
            core_types::AuthorAssociation::Collaborator
                | core_types::AuthorAssociation::Member
                | core_types::AuthorAssociation::Owner
        );

        let intent_result = IntentClassifier::classify(
            &record.title,
            &record.body,
            &record.changed_files,
            self.provider.as_ref(),
        )
        .await;

        let weights = self.config.weights.for_intent(Some(intent_result.intent));

        let (spam_signal, spam_reasons) = signals::spam(&record, trusted, weights.weight_for("spam"));
        let mut signal_list: Vec<SignalScore> = vec![
            signals::ci_status(&record, weights.ci_status),
            signals::diff_size(&record, weights.diff_size),
            signals::commit_quality(&record, weights.commit_quality),
            signals::contributor(&record, reputation, weights.contributor),
            signals::issue_ref(&record, weights.issue_ref),
            spam_signal,
            signals::test_coverage(&record, weights.test_coverage),
            signals::staleness(&record, weights.staleness),
            signals::mergeability(&record, weights.mergeability),
            signals::review_status(&record, weights.review_status),
            signals::body_quality(&record, weights.body_quality),
            signals::activity(&record, weights.activity),
            signals::breaking_change(&record, weights.breaking_change),
            signals::draft_status(&record, weights.draft_status),
            signals::milestone(&record, weights.milestone),
            signals::label_priority(&record, weights.label_priority),
            signals::codeowners(&record, weights.codeowners),
            signals::requested_reviewers(&record, weights.requested_reviewers),
            signals::scope_coherence(&record, weights.scope_coherence),
            signals::complexity(&record, weights.complexity),
            signals::intent(Some(intent_result.intent), weights.intent),
        ];

        let heuristic = weighted_mean(&signal_list);
        let is_spam = signal_list
            .iter()
            .find(|s| s.name == "spam")
            .map(|s| s.score < self.config.spam_threshold)
            .unwrap_or(false);

        let mut item = ScoredItem::new(Item::Pr(record));
        item.intent = Some(intent_result.intent);
        item.is_spam = is_spam;
        item.spam_reasons = spam_reasons;

        if let Some(provider) = &self.provider {
            match self.llm_blend(&item, provider).await {
                Some((llm_score, risk, reason)) => {
                    item.llm_score = Some(llm_score);
                    item.llm_risk = Some(risk);
                    item.llm_reason = Some(reason);
                    item.total_score = (0.4 * heuristic + 0.6 * llm_score).round();
                }
                None => {
                    item.total_score = heuristic.round();
                }
            }
        } else {
            item.total_score = heuristic.round();
        }

        signal_list.sort_by(|a, b| a.name.cmp(&b.name));
        item.signals = signal_list;
        item
    }

    /// Bounded by the caller's `ConcurrencyGate`; a per-record failure is
    /// logged and the record is excluded from the result. Per-record
    /// ordering is not preserved — callers must key results by `number`.
    pub async fn score_many(&self, records: Vec<PrRecord>, gate: &concurrency::ConcurrencyGate) -> Vec<ScoredItem> {
        use futures::stream::{self, StreamExt};

        stream::iter(records.into_iter())
            .map(|record| {
                let number = record.number;
                async move {
                    let result = gate
                        .execute(|| {
                            let record = record.clone();
                            async move { Ok::<_, ()>(self.score(record).await) }
                        })
                        .await;
                    match result {
                        Ok(item) => Some(item),
                        Err(()) => {
                            warn!(number, "scoring failed for PR, excluding from result");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(gate.current_max().max(1))
            .filter_map(|x| async move { x })
            .collect()
            .await
    }

    async fn llm_blend(&self, item: &ScoredItem, provider: &ProviderAdapter) -> Option<(f64, RiskLevel, String)> {
        let prompt = format!(
            "Rate the risk and quality of this pull request on a 0-100 scale. \
             Respond with strict JSON: {{\"score\": 0..100, \"risk\": \"low\"|\"medium\"|\"high\", \"reason\": \"...\"}}.\n\
             Title: {}\nBody: {}",
            item.item.title(),
            item.item.body().chars().take(1500).collect::<String>()
        );
        let raw = provider.generate_text(&prompt, GenerateOpts::default()).await.ok()?;
        let parsed: LlmScoreResponse = match serde_json::from_str(raw.trim()) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "LLM score response failed schema validation, retaining heuristic only");
                return None;
            }
        };
        let risk = match parsed.risk.as_str() {
            "low" => RiskLevel::Low,
            "high" => RiskLevel::High,
            _ => RiskLevel::Medium,
        };
        Some((parsed.score.clamp(0.0, 100.0), risk, parsed.reason))
    }
}

/// `Σ(score·weight) / Σweight` — never raw sum.
fn weighted_mean(signals: &[SignalScore]) -> f64 {
    let weight_sum: f64 = signals.iter().map(|s| s.weight).sum();
    if weight_sum <= 0.0 {
        return 0.0;
    }
    let score_sum: f64 = signals.iter().map(|s| s.score * s.weight).sum();
    (score_sum / weight_sum).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{AuthorAssociation, CiStatus, Mergeable, ReviewState};
    use std::collections::BTreeSet;

    fn base_pr(number: i64) -> PrRecord {
        let now = Utc::now();
        PrRecord {
            number,
            title: "feat: add X".into(),
            body: "A".repeat(600),
            author: "alice".into(),
            author_association: AuthorAssociation::Owner,
            created_at: now,
            updated_at: now,
            head_ref: "feature".into(),
            base_ref: "main".into(),
            head_sha: "sha1".into(),
            files_changed: 3,
            additions: 200,
            deletions: 50,
            commits: 3,
            labels: BTreeSet::new(),
            ci_status: CiStatus::Success,
            issue_numbers: vec![42],
            changed_files: vec!["src/lib.rs".into()],
            has_tests: true,
            test_files_changed: vec!["src/lib_test.rs".into()],
            age_in_days: 2,
            mergeable: Mergeable::Mergeable,
            review_state: ReviewState::Approved,
            review_count: 2,
            comment_count: 1,
            is_draft: false,
            milestone: None,
            requested_reviewers: vec![],
            codeowners: vec!["alice".into()],
        }
    }

    fn spam_pr(number: i64) -> PrRecord {
        let now = Utc::now();
        PrRecord {
            number,
            title: "fix typo".into(),
            body: String::new(),
            author: "mallory".into(),
            author_association: AuthorAssociation::None,
            created_at: now,
            updated_at: now,
            head_ref: "patch-1".into(),
            base_ref: "main".into(),
            head_sha: "sha2".into(),
            files_changed: 1,
            additions: 1,
            deletions: 0,
            commits: 1,
            labels: BTreeSet::new(),
            ci_status: CiStatus::Unknown,
            issue_numbers: vec![],
            changed_files: vec!["README.md".into()],
            has_tests: false,
            test_files_changed: vec![],
            age_in_days: 1,
            mergeable: Mergeable::Unknown,
            review_state: ReviewState::NoneState,
            review_count: 0,
            comment_count: 0,
            is_draft: false,
            milestone: None,
            requested_reviewers: vec![],
            codeowners: vec![],
        }
    }

    #[tokio::test]
    async fn heuristic_only_scan_matches_end_to_end_scenario_one() {
        let scorer = Scorer::new(ScorerConfig::default(), None);
        let good = scorer.score(base_pr(1)).await;
        let spammy = scorer.score(spam_pr(2)).await;

        assert!(good.total_score >= 85.0, "got {}", good.total_score);
        assert!(!good.is_spam);
        assert!(spammy.is_spam);
        assert!(spammy.total_score < 50.0, "got {}", spammy.total_score);
    }

    #[tokio::test]
    async fn llm_blend_matches_end_to_end_scenario_two() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response": "{\"score\": 80, \"risk\": \"low\", \"reason\": \"ok\"}"}"#)
            .create_async()
            .await;

        let provider = ProviderAdapter::new(
            llm_service::HttpProvider {
                kind: llm_service::ProviderKind::Ollama,
                http: reqwest::Client::new(),
                base_url: server.url(),
                api_key: None,
                model: "test-model".into(),
                embedding_model: "test-embed".into(),
            },
            None,
        )
        .expect("ollama is a native-embedding provider");

        let scorer = Scorer::new(ScorerConfig::default(), Some(provider));
        let item = scorer.score(base_pr(1)).await;

        mock.assert_async().await;
        assert_eq!(item.llm_score, Some(80.0));
        assert!(
            item.total_score >= 80.0 && item.total_score <= 100.0,
            "got {}",
            item.total_score
        );
    }

    #[test]
    fn weighted_mean_ignores_raw_sum() {
        let signals = vec![
            SignalScore { name: "a".into(), score: 100.0, weight: 0.5, reason: String::new() },
            SignalScore { name: "b".into(), score: 0.0, weight: 0.5, reason: String::new() },
        ];
        assert_eq!(weighted_mean(&signals), 50.0);
    }
}
