//! Provider-agnostic domain model for the triage pipeline.
//!
//! Plain data, no behavior — mirrors the shape of a host's REST/GraphQL
//! response rather than any one provider's wire format.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorAssociation {
    Owner,
    Member,
    Collaborator,
    Contributor,
    FirstTimer,
    None,
}

impl AuthorAssociation {
    /// Baseline `contributor` signal score before any reputation blend.
    pub fn baseline_score(self) -> f64 {
        match self {
            AuthorAssociation::Owner => 100.0,
            AuthorAssociation::Member => 90.0,
            AuthorAssociation::Collaborator => 85.0,
            AuthorAssociation::Contributor => 70.0,
            AuthorAssociation::FirstTimer => 40.0,
            AuthorAssociation::None => 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiStatus {
    Success,
    Failure,
    Pending,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mergeable {
    Mergeable,
    Conflicting,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    NoneState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Bugfix,
    Feature,
    Refactor,
    Dependency,
    Docs,
    Chore,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Intent::Bugfix,
        Intent::Feature,
        Intent::Refactor,
        Intent::Dependency,
        Intent::Docs,
        Intent::Chore,
    ];

    /// Baseline `intent` signal score.
    pub fn signal_score(self) -> f64 {
        match self {
            Intent::Bugfix => 90.0,
            Intent::Feature => 85.0,
            Intent::Refactor => 60.0,
            Intent::Dependency => 35.0,
            Intent::Docs => 30.0,
            Intent::Chore => 25.0,
        }
    }

    pub fn label(self) -> String {
        format!("intent:{}", self.as_str())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Bugfix => "bugfix",
            Intent::Feature => "feature",
            Intent::Refactor => "refactor",
            Intent::Dependency => "dependency",
            Intent::Docs => "docs",
            Intent::Chore => "chore",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Intent> {
        Self::ALL.into_iter().find(|i| i.as_str() == s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisionAlignment {
    Aligned,
    Tangential,
    OffRoadmap,
    Unchecked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Pr,
    Issue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterType {
    Pr,
    Issue,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Close,
    Merge,
    Label,
}

/// Immutable input to scoring. Never mutated after construction — all
/// enrichment happens on the `ScoredItem` that wraps it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrRecord {
    pub number: i64,
    pub title: String,
    pub body: String,
    pub author: String,
    pub author_association: AuthorAssociation,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub head_ref: String,
    pub base_ref: String,
    pub head_sha: String,
    pub files_changed: u32,
    pub additions: u32,
    pub deletions: u32,
    pub commits: u32,
    pub labels: BTreeSet<String>,
    pub ci_status: CiStatus,
    pub issue_numbers: Vec<i64>,
    pub changed_files: Vec<String>,
    pub has_tests: bool,
    pub test_files_changed: Vec<String>,
    pub age_in_days: i64,
    pub mergeable: Mergeable,
    pub review_state: ReviewState,
    pub review_count: u32,
    pub comment_count: u32,
    pub is_draft: bool,
    pub milestone: Option<String>,
    pub requested_reviewers: Vec<String>,
    pub codeowners: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: i64,
    pub title: String,
    pub body: String,
    pub author: String,
    pub author_association: AuthorAssociation,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub labels: BTreeSet<String>,
    pub comment_count: u32,
    pub age_in_days: i64,
    pub milestone: Option<String>,
    pub reaction_count: u32,
    pub assignees: Vec<String>,
    pub linked_prs: Vec<i64>,
    pub state: IssueState,
    pub state_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalScore {
    pub name: String,
    pub score: f64,
    pub weight: f64,
    pub reason: String,
}

/// Either kind of triageable item. `ScoredItem` wraps one of these plus the
/// fields every enrichment stage attaches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "itemType", rename_all = "lowercase")]
pub enum Item {
    Pr(PrRecord),
    Issue(IssueRecord),
}

impl Item {
    pub fn number(&self) -> i64 {
        match self {
            Item::Pr(p) => p.number,
            Item::Issue(i) => i.number,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            Item::Pr(_) => ItemType::Pr,
            Item::Issue(_) => ItemType::Issue,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Item::Pr(p) => &p.title,
            Item::Issue(i) => &i.title,
        }
    }

    pub fn body(&self) -> &str {
        match self {
            Item::Pr(p) => &p.body,
            Item::Issue(i) => &i.body,
        }
    }

    pub fn labels(&self) -> &BTreeSet<String> {
        match self {
            Item::Pr(p) => &p.labels,
            Item::Issue(i) => &i.labels,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Item::Pr(p) => p.updated_at,
            Item::Issue(i) => i.updated_at,
        }
    }
}

/// A PR or issue enriched with scoring, dedup and vision signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredItem {
    #[serde(flatten)]
    pub item: Item,
    pub total_score: f64,
    pub signals: Vec<SignalScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub vision_alignment: VisionAlignment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_risk: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_group: Option<u64>,
    pub is_spam: bool,
    pub spam_reasons: Vec<String>,
}

impl ScoredItem {
    pub fn new(item: Item) -> Self {
        ScoredItem {
            item,
            total_score: 0.0,
            signals: Vec::new(),
            embedding: None,
            vision_alignment: VisionAlignment::Unchecked,
            vision_score: None,
            llm_score: None,
            llm_risk: None,
            llm_reason: None,
            intent: None,
            duplicate_group: None,
            is_spam: false,
            spam_reasons: Vec::new(),
        }
    }

    pub fn number(&self) -> i64 {
        self.item.number()
    }

    pub fn signal(&self, name: &str) -> Option<&SignalScore> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// `(totalScore desc, number asc)` — the comparator ranking must use.
    pub fn ranking_key(&self) -> (i64, i64) {
        // Negated and scaled so the natural `Ord` on the tuple sorts
        // descending by score, ascending by number.
        (-(self.total_score * 1000.0).round() as i64, self.number())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupCluster {
    pub id: u64,
    pub members: Vec<ScoredItem>,
    pub best_member_number: i64,
    pub avg_similarity: f64,
    pub reason: String,
    pub cluster_type: ClusterType,
    /// Set when LLM verification picked a member other than the
    /// highest-`totalScore` one.
    pub best_overridden: bool,
}

impl DedupCluster {
    pub fn numbers(&self) -> HashSet<i64> {
        self.members.iter().map(|m| m.number()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub number: i64,
    pub updated_at: DateTime<Utc>,
    pub head_sha: String,
    pub scored_item_without_embedding: ScoredItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub kind: ActionKind,
    pub target: i64,
    pub item_type: ItemType,
    pub reason: String,
    pub label: Option<String>,
    pub merge_method: Option<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Executed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: ActionItem,
    pub outcome: ActionOutcome,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_key_orders_by_score_desc_number_asc() {
        let mut a = ScoredItem::new(Item::Pr(sample_pr(1)));
        a.total_score = 80.0;
        let mut b = ScoredItem::new(Item::Pr(sample_pr(2)));
        b.total_score = 80.0;
        let mut c = ScoredItem::new(Item::Pr(sample_pr(3)));
        c.total_score = 95.0;

        let mut items = vec![a.clone(), b.clone(), c.clone()];
        items.sort_by_key(|i| i.ranking_key());

        assert_eq!(items[0].number(), 3);
        assert_eq!(items[1].number(), 1);
        assert_eq!(items[2].number(), 2);
    }

    fn sample_pr(number: i64) -> PrRecord {
        let now = Utc::now();
        PrRecord {
            number,
            title: "t".into(),
            body: "b".into(),
            author: "a".into(),
            author_association: AuthorAssociation::None,
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
            ci_status: CiStatus::Unknown,
            issue_numbers: vec![],
            changed_files: vec![],
            has_tests: false,
            test_files_changed: vec![],
            age_in_days: 0,
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
}
