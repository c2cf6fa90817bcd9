//! Derives close/merge/label plans from scored items and dedup clusters,
//! then dispatches them sequentially against a `HostClient` with a
//! pre-execution staleness guard.

use std::collections::HashSet;

use core_types::{ActionItem, ActionKind, ActionOutcome, ActionResult, DedupCluster, Item, ItemType, RiskLevel, ScoredItem};
use host_client::HostClient;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub merge_threshold: f64,
    pub merge_method: String,
    pub exclude: HashSet<i64>,
    pub batch_limit: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            merge_threshold: 85.0,
            merge_method: "squash".to_string(),
            exclude: HashSet::new(),
            batch_limit: usize::MAX,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ActionPlan {
    pub close_duplicates: Vec<ActionItem>,
    pub close_spam: Vec<ActionItem>,
    pub auto_merge: Vec<ActionItem>,
    pub label_intent: Vec<ActionItem>,
}

pub struct ActionPlanner;

impl ActionPlanner {
    pub fn plan(items: &[ScoredItem], clusters: &[DedupCluster], config: &PlannerConfig) -> ActionPlan {
        ActionPlan {
            close_duplicates: plan_close_duplicates(clusters, config),
            close_spam: plan_close_spam(items, config),
            auto_merge: plan_auto_merge(items, config),
            label_intent: plan_label_intent(items, config),
        }
    }
}

fn item_type_of(item: &Item) -> ItemType {
    item.item_type()
}

fn plan_close_duplicates(clusters: &[DedupCluster], config: &PlannerConfig) -> Vec<ActionItem> {
    let mut out = Vec::new();
    for cluster in clusters {
        for member in &cluster.members {
            let number = member.number();
            if number == cluster.best_member_number || config.exclude.contains(&number) {
                continue;
            }
            out.push(ActionItem {
                kind: ActionKind::Close,
                target: number,
                item_type: item_type_of(&member.item),
                reason: format!(
                    "duplicate of #{} ({:.0}% similar)",
                    cluster.best_member_number,
                    cluster.avg_similarity * 100.0
                ),
                label: None,
                merge_method: None,
                comment: Some(format!(
                    "Closing as a duplicate of #{}  (similarity {:.0}%).",
                    cluster.best_member_number,
                    cluster.avg_similarity * 100.0
                )),
            });
            if out.len() >= config.batch_limit {
                return out;
            }
        }
    }
    out
}

fn plan_close_spam(items: &[ScoredItem], config: &PlannerConfig) -> Vec<ActionItem> {
    items
        .iter()
        .filter(|item| item.is_spam && !config.exclude.contains(&item.number()))
        .take(config.batch_limit)
        .map(|item| ActionItem {
            kind: ActionKind::Close,
            target: item.number(),
            item_type: item_type_of(&item.item),
            reason: if item.spam_reasons.is_empty() {
                "flagged as spam".to_string()
            } else {
                item.spam_reasons.join("; ")
            },
            label: None,
            merge_method: None,
            comment: Some("Closing: this item was flagged as low-signal/spam.".to_string()),
        })
        .collect()
}

fn plan_auto_merge(items: &[ScoredItem], config: &PlannerConfig) -> Vec<ActionItem> {
    items
        .iter()
        .filter(|item| !config.exclude.contains(&item.number()))
        .filter_map(|item| {
            let Item::Pr(pr) = &item.item else { return None };
            let gate = item.total_score >= config.merge_threshold
                && pr.mergeable == core_types::Mergeable::Mergeable
                && pr.review_state == core_types::ReviewState::Approved
                && pr.ci_status == core_types::CiStatus::Success
                && item.llm_risk != Some(RiskLevel::High)
                && !pr.is_draft;
            if !gate {
                return None;
            }
            Some(ActionItem {
                kind: ActionKind::Merge,
                target: item.number(),
                item_type: ItemType::Pr,
                reason: format!("score {:.0} >= threshold, approved, CI green, mergeable, not draft", item.total_score),
                label: None,
                merge_method: Some(config.merge_method.clone()),
                comment: None,
            })
        })
        .take(config.batch_limit)
        .collect()
}

fn plan_label_intent(items: &[ScoredItem], config: &PlannerConfig) -> Vec<ActionItem> {
    items
        .iter()
        .filter(|item| !config.exclude.contains(&item.number()))
        .filter_map(|item| {
            let intent = item.intent?;
            Some(ActionItem {
                kind: ActionKind::Label,
                target: item.number(),
                item_type: item_type_of(&item.item),
                reason: format!("classified intent: {}", intent.as_str()),
                label: Some(intent.label()),
                merge_method: None,
                comment: None,
            })
        })
        .take(config.batch_limit)
        .collect()
}

/// Dispatches a plan's actions one at a time. Before each action, re-fetches
/// the target's live state; an already-closed/merged target is skipped
/// without touching the host API again. A failed live-state fetch does not
/// block the action — the action itself will surface any real failure.
pub struct Executor<'a> {
    host: &'a HostClient,
    repo: &'a str,
}

impl<'a> Executor<'a> {
    pub fn new(host: &'a HostClient, repo: &'a str) -> Self {
        Executor { host, repo }
    }

    pub async fn execute_all(&self, actions: Vec<ActionItem>) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(actions.len());
        for action in actions {
            let result = self.execute_one(action).await;
            results.push(result);
        }
        results
    }

    async fn execute_one(&self, action: ActionItem) -> ActionResult {
        let is_pr = action.item_type == ItemType::Pr;
        match self.host.fetch_live_state(self.repo, action.target, is_pr).await {
            Ok(state) if state.closed || state.merged => {
                debug!(target = action.target, "skipping stale action, target already closed/merged");
                return ActionResult {
                    action,
                    outcome: ActionOutcome::Skipped,
                    reason: "target already closed or merged".to_string(),
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!(target = action.target, error = %e, "live-state check failed, proceeding with action anyway");
            }
        }

        let dispatch = match action.kind {
            ActionKind::Close if is_pr => self.host.close_pr(self.repo, action.target).await,
            ActionKind::Close => self.host.close_issue(self.repo, action.target).await,
            ActionKind::Merge => {
                let method = action.merge_method.as_deref().unwrap_or("squash");
                self.host.merge_pr(self.repo, action.target, method).await
            }
            ActionKind::Label => {
                let label = action.label.clone().unwrap_or_default();
                self.host.add_label(self.repo, action.target, &label).await
            }
        };

        if let (Ok(()), Some(comment)) = (&dispatch, action.comment.as_deref()) {
            let _ = self.host.add_comment(self.repo, action.target, comment).await;
        }

        match dispatch {
            Ok(()) => ActionResult {
                action: action.clone(),
                outcome: ActionOutcome::Executed,
                reason: action.reason.clone(),
            },
            Err(e) => {
                warn!(target = action.target, error = %e, "action dispatch failed");
                ActionResult {
                    reason: e.to_string(),
                    action,
                    outcome: ActionOutcome::Failed,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{AuthorAssociation, CiStatus, Mergeable, PrRecord, ReviewState};
    use std::collections::BTreeSet;

    fn pr(number: i64, score: f64, mergeable: Mergeable, review: ReviewState, ci: CiStatus, is_draft: bool, risk: Option<RiskLevel>) -> ScoredItem {
        let now = Utc::now();
        let record = PrRecord {
            number,
            title: "t".into(),
            body: "b".into(),
            author: "a".into(),
            author_association: AuthorAssociation::Owner,
            created_at: now,
            updated_at: now,
            head_ref: "h".into(),
            base_ref: "main".into(),
            head_sha: "sha".into(),
            files_changed: 1,
            additions: 1,
            deletions: 0,
            commits: 1,
            labels: BTreeSet::new(),
            ci_status: ci,
            issue_numbers: vec![],
            changed_files: vec![],
            has_tests: true,
            test_files_changed: vec![],
            age_in_days: 0,
            mergeable,
            review_state: review,
            review_count: 1,
            comment_count: 0,
            is_draft,
            milestone: None,
            requested_reviewers: vec![],
            codeowners: vec![],
        };
        let mut item = ScoredItem::new(Item::Pr(record));
        item.total_score = score;
        item.llm_risk = risk;
        item
    }

    #[test]
    fn auto_merge_gate_admits_only_fully_qualifying_pr() {
        let a = pr(1, 95.0, Mergeable::Mergeable, ReviewState::Approved, CiStatus::Success, false, Some(RiskLevel::Low));
        let b = pr(2, 95.0, Mergeable::Mergeable, ReviewState::Approved, CiStatus::Success, false, Some(RiskLevel::High));
        let c = pr(3, 95.0, Mergeable::Mergeable, ReviewState::Approved, CiStatus::Failure, false, Some(RiskLevel::Low));
        let items = vec![a, b, c];

        let config = PlannerConfig { merge_threshold: 85.0, ..PlannerConfig::default() };
        let plan = plan_auto_merge(&items, &config);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].target, 1);
    }

    #[test]
    fn close_spam_respects_exclude_and_batch_limit() {
        let mut a = pr(1, 10.0, Mergeable::Unknown, ReviewState::NoneState, CiStatus::Unknown, false, None);
        a.is_spam = true;
        let mut b = pr(2, 10.0, Mergeable::Unknown, ReviewState::NoneState, CiStatus::Unknown, false, None);
        b.is_spam = true;
        let items = vec![a, b];

        let mut exclude = HashSet::new();
        exclude.insert(2);
        let config = PlannerConfig { exclude, batch_limit: 5, ..PlannerConfig::default() };
        let plan = plan_close_spam(&items, &config);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].target, 1);
    }
}
