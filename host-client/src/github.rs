//! GitHub provider (REST v3 + GraphQL v4). `fetch_details` tries a single
//! batched GraphQL query first (one round-trip for the whole PR batch via
//! aliased `pullRequest` selections) and falls back to the REST path,
//! fetching each PR with its own handful of calls, on any GraphQL error.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use core_types::{
    AuthorAssociation, CiStatus, IssueRecord, IssueState, Mergeable, PrRecord, ReviewState,
};

use crate::codeowners::{self, CodeownersMap, CODEOWNERS_PATHS};
use crate::errors::{Error, HostResult, ProviderError};
use crate::issue_refs::extract_issue_numbers;
use crate::rate_limit::RateLimitGovernor;

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_api: String,
    token: String,
    pub governor: std::sync::Arc<RateLimitGovernor>,
}

impl GitHubClient {
    pub fn new(http: Client, base_api: String, token: String) -> Self {
        GitHubClient {
            http,
            base_api,
            token,
            governor: std::sync::Arc::new(RateLimitGovernor::new()),
        }
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> HostResult<(T, reqwest::header::HeaderMap)> {
        self.governor.wait_if_needed().await;
        let resp = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "treliq/0.1")
            .send()
            .await?;
        self.governor.update_from_headers(resp.headers());
        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(Error::Provider(match status.as_u16() {
                401 => ProviderError::Unauthorized,
                403 => ProviderError::Forbidden,
                404 => ProviderError::NotFound,
                429 => ProviderError::RateLimited {
                    retry_after_secs: retry_after,
                },
                code @ 500..=599 => ProviderError::Server(code),
                code => ProviderError::HttpStatus(code),
            }));
        }
        let headers = resp.headers().clone();
        let body = resp.json::<T>().await.map_err(|e| {
            Error::Provider(ProviderError::InvalidResponse(e.to_string()))
        })?;
        Ok((body, headers))
    }

    pub async fn list_open(&self, owner: &str, repo: &str, max: usize) -> HostResult<Vec<PrSummary>> {
        let per_page = max.min(100).max(1);
        let url = format!(
            "{}/repos/{owner}/{repo}/pulls?state=open&per_page={per_page}&sort=updated&direction=desc",
            self.base_api
        );
        let (prs, _): (Vec<GhPr>, _) = self.get_json(&url).await?;
        Ok(prs
            .into_iter()
            .take(max)
            .map(|p| PrSummary {
                number: p.number,
                updated_at: p.updated_at,
                head_sha: p.head.sha,
            })
            .collect())
    }

    /// GraphQL-first with a full fallback to REST on any primary error —
    /// a single malformed PR in the batch (GraphQL error, not a missing
    /// node) is enough to drop the whole batch back to REST rather than
    /// returning a partially-populated result.
    pub async fn fetch_details(&self, owner: &str, repo: &str, numbers: &[i64]) -> Vec<PrRecord> {
        if numbers.is_empty() {
            return Vec::new();
        }
        match self.fetch_details_graphql(owner, repo, numbers).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "graphql batch PR fetch failed, falling back to REST");
                self.fetch_details_rest(owner, repo, numbers).await
            }
        }
    }

    async fn fetch_details_rest(&self, owner: &str, repo: &str, numbers: &[i64]) -> Vec<PrRecord> {
        let mut out = Vec::with_capacity(numbers.len());
        for &number in numbers {
            match self.fetch_one_pr(owner, repo, number).await {
                Ok(record) => out.push(record),
                Err(e) => {
                    warn!(number, error = %e, "skipping PR after fetch failure");
                }
            }
        }
        out
    }

    /// One query, aliased per PR number, so a batch costs one round-trip
    /// instead of four REST calls per PR.
    async fn fetch_details_graphql(&self, owner: &str, repo: &str, numbers: &[i64]) -> HostResult<Vec<PrRecord>> {
        self.governor.wait_if_needed().await;

        const PR_FIELDS: &str = r#"
            number
            title
            body
            author { login }
            authorAssociation
            createdAt
            updatedAt
            headRefName
            headRefOid
            baseRefName
            additions
            deletions
            changedFiles
            isDraft
            mergeable
            milestone { title }
            comments(first: 0) { totalCount }
            labels(first: 100) { nodes { name } }
            reviews(first: 100) { nodes { state } }
            files(first: 100) { nodes { path } }
            reviewRequests(first: 50) { nodes { requestedReviewer { ... on User { login } } } }
            commits(last: 1) { totalCount nodes { commit { statusCheckRollup { state } } } }
        "#;
        let aliases: String = numbers
            .iter()
            .enumerate()
            .map(|(i, number)| format!("pr{i}: pullRequest(number: {number}) {{ {PR_FIELDS} }}"))
            .collect::<Vec<_>>()
            .join("\n");
        let query = format!(
            r#"query {{ repository(owner: "{}", name: "{}") {{ {} }} }}"#,
            escape_graphql_string(owner),
            escape_graphql_string(repo),
            aliases
        );

        let url = format!("{}/graphql", self.base_api);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "treliq/0.1")
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?;
        self.governor.update_from_headers(resp.headers());
        if !resp.status().is_success() {
            return Err(Error::Provider(ProviderError::HttpStatus(resp.status().as_u16())));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Provider(ProviderError::InvalidResponse(e.to_string())))?;

        if let Some(errors) = body.get("errors") {
            return Err(Error::Provider(ProviderError::InvalidResponse(format!(
                "graphql errors: {errors}"
            ))));
        }
        let repository = body
            .get("data")
            .and_then(|d| d.get("repository"))
            .ok_or_else(|| Error::Provider(ProviderError::InvalidResponse("missing repository in graphql response".into())))?;

        let mut out = Vec::with_capacity(numbers.len());
        for (i, &number) in numbers.iter().enumerate() {
            let alias = format!("pr{i}");
            let node = match repository.get(&alias) {
                Some(n) if !n.is_null() => n,
                _ => {
                    debug!(number, "graphql returned no node for PR, treating as not found");
                    continue;
                }
            };
            let gql: GqlPullRequest = serde_json::from_value(node.clone())
                .map_err(|e| Error::Provider(ProviderError::InvalidResponse(e.to_string())))?;
            out.push(gql.into_pr_record());
        }
        Ok(out)
    }

    async fn fetch_one_pr(&self, owner: &str, repo: &str, number: i64) -> HostResult<PrRecord> {
        let pr_url = format!("{}/repos/{owner}/{repo}/pulls/{number}", self.base_api);
        let (pr, _): (GhPr, _) = self.get_json(&pr_url).await?;

        let files_url = format!(
            "{}/repos/{owner}/{repo}/pulls/{number}/files?per_page=100",
            self.base_api
        );
        let reviews_url = format!("{}/repos/{owner}/{repo}/pulls/{number}/reviews?per_page=100", self.base_api);

        let (files_res, reviews_res, ci_status) = tokio::join!(
            self.get_json::<Vec<GhFile>>(&files_url),
            self.get_json::<Vec<GhReview>>(&reviews_url),
            self.resolve_ci_status(owner, repo, &pr.head.sha),
        );
        let (files, _) = files_res.unwrap_or_default_pair();
        let (reviews, _) = reviews_res.unwrap_or_default_pair();

        let changed_files: Vec<String> = files.iter().map(|f| f.filename.clone()).collect();
        let test_files_changed: Vec<String> = changed_files
            .iter()
            .filter(|f| f.contains("test") || f.contains("spec"))
            .cloned()
            .collect();

        let issue_numbers = extract_issue_numbers(&pr.title, pr.body.as_deref().unwrap_or(""));
        let age_in_days = (Utc::now() - pr.created_at).num_days().max(0);

        let mergeable = map_mergeable(pr.mergeable_state.as_deref());
        let review_state = map_review_state(&reviews);

        Ok(PrRecord {
            number: pr.number,
            title: pr.title,
            body: pr.body.unwrap_or_default(),
            author: pr.user.login,
            author_association: map_association(&pr.author_association),
            created_at: pr.created_at,
            updated_at: pr.updated_at,
            head_ref: pr.head.r#ref,
            base_ref: pr.base.r#ref,
            head_sha: pr.head.sha,
            files_changed: files.len() as u32,
            additions: pr.additions.unwrap_or(0),
            deletions: pr.deletions.unwrap_or(0),
            commits: pr.commits.unwrap_or(0),
            labels: pr.labels.into_iter().map(|l| l.name).collect(),
            ci_status,
            issue_numbers,
            changed_files,
            has_tests: !test_files_changed.is_empty(),
            test_files_changed,
            age_in_days,
            mergeable,
            review_state,
            review_count: reviews.len() as u32,
            comment_count: pr.comments.unwrap_or(0),
            is_draft: pr.draft.unwrap_or(false),
            milestone: pr.milestone.map(|m| m.title),
            requested_reviewers: pr
                .requested_reviewers
                .into_iter()
                .map(|u| u.login)
                .collect(),
            codeowners: Vec::new(),
        })
    }

    /// If no check runs exist, falls back to the combined commit status.
    async fn resolve_ci_status(&self, owner: &str, repo: &str, sha: &str) -> CiStatus {
        let runs_url = format!(
            "{}/repos/{owner}/{repo}/commits/{sha}/check-runs?per_page=100",
            self.base_api
        );
        if let Ok((runs, _)) = self.get_json::<GhCheckRuns>(&runs_url).await {
            if !runs.check_runs.is_empty() {
                if runs.check_runs.iter().any(|r| r.conclusion.as_deref() == Some("failure")) {
                    return CiStatus::Failure;
                }
                if runs
                    .check_runs
                    .iter()
                    .all(|r| r.conclusion.as_deref() == Some("success"))
                {
                    return CiStatus::Success;
                }
                return CiStatus::Pending;
            }
        }

        let status_url = format!("{}/repos/{owner}/{repo}/commits/{sha}/status", self.base_api);
        match self.get_json::<GhCombinedStatus>(&status_url).await {
            Ok((s, _)) => match s.state.as_str() {
                "success" => CiStatus::Success,
                "failure" | "error" => CiStatus::Failure,
                "pending" => CiStatus::Pending,
                _ => CiStatus::Unknown,
            },
            Err(_) => CiStatus::Unknown,
        }
    }

    pub async fn fetch_codeowners(&self, owner: &str, repo: &str) -> CodeownersMap {
        for path in CODEOWNERS_PATHS {
            let url = format!("{}/repos/{owner}/{repo}/contents/{path}", self.base_api);
            if let Ok((content, _)) = self.get_json::<GhContent>(&url).await {
                if let Some(decoded) = content.decode() {
                    return codeowners::parse(&decoded);
                }
            }
        }
        CodeownersMap::new()
    }

    pub async fn fetch_vision_doc(&self, owner: &str, repo: &str, path: &str) -> Option<String> {
        let url = format!("{}/repos/{owner}/{repo}/contents/{path}", self.base_api);
        let (content, _) = self.get_json::<GhContent>(&url).await.ok()?;
        content.decode()
    }

    /// Account age in days from the user's public profile. `None` on a 404
    /// or any transport failure — the reputation probe treats that as "no
    /// signal", never an error.
    pub async fn fetch_account_age_days(&self, login: &str) -> Option<i64> {
        let url = format!("{}/users/{login}", self.base_api);
        let (profile, _): (GhUserProfile, _) = self.get_json(&url).await.ok()?;
        Some((Utc::now() - profile.created_at).num_days().max(0))
    }

    pub async fn fetch_diff(&self, owner: &str, repo: &str, number: i64) -> Option<String> {
        self.governor.wait_if_needed().await;
        let url = format!("{}/repos/{owner}/{repo}/pulls/{number}", self.base_api);
        let resp = self
            .http
            .get(url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github.v3.diff")
            .header("User-Agent", "treliq/0.1")
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.text().await.ok()
    }

    pub async fn list_issues(&self, owner: &str, repo: &str, max: usize) -> HostResult<Vec<IssueRecord>> {
        let per_page = max.min(100).max(1);
        let url = format!(
            "{}/repos/{owner}/{repo}/issues?state=open&per_page={per_page}&sort=updated&direction=desc",
            self.base_api
        );
        let (issues, _): (Vec<GhIssue>, _) = self.get_json(&url).await?;
        Ok(issues
            .into_iter()
            .filter(|i| i.pull_request.is_none())
            .take(max)
            .map(|i| {
                let age_in_days = (Utc::now() - i.created_at).num_days().max(0);
                IssueRecord {
                    number: i.number,
                    title: i.title,
                    body: i.body.unwrap_or_default(),
                    author: i.user.login,
                    author_association: map_association(&i.author_association),
                    created_at: i.created_at,
                    updated_at: i.updated_at,
                    labels: i.labels.into_iter().map(|l| l.name).collect(),
                    comment_count: i.comments,
                    age_in_days,
                    milestone: i.milestone.map(|m| m.title),
                    reaction_count: i.reactions.map(|r| r.total_count).unwrap_or(0),
                    assignees: i.assignees.into_iter().map(|u| u.login).collect(),
                    linked_prs: Vec::new(),
                    state: if i.state == "closed" {
                        IssueState::Closed
                    } else {
                        IssueState::Open
                    },
                    state_reason: i.state_reason,
                }
            })
            .collect())
    }
}

pub struct PrSummary {
    pub number: i64,
    pub updated_at: DateTime<Utc>,
    pub head_sha: String,
}

#[derive(Debug, Clone, Copy)]
pub struct LiveState {
    pub closed: bool,
    pub merged: bool,
}

impl GitHubClient {
    async fn patch_json(&self, url: &str, body: &serde_json::Value) -> HostResult<()> {
        self.governor.wait_if_needed().await;
        let resp = self
            .http
            .patch(url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "treliq/0.1")
            .json(body)
            .send()
            .await?;
        self.governor.update_from_headers(resp.headers());
        self.status_to_result(resp).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> HostResult<()> {
        self.governor.wait_if_needed().await;
        let resp = self
            .http
            .post(url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "treliq/0.1")
            .json(body)
            .send()
            .await?;
        self.governor.update_from_headers(resp.headers());
        self.status_to_result(resp).await
    }

    async fn status_to_result(&self, resp: reqwest::Response) -> HostResult<()> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        Err(Error::Provider(match status.as_u16() {
            401 => ProviderError::Unauthorized,
            403 => ProviderError::Forbidden,
            404 => ProviderError::NotFound,
            429 => ProviderError::RateLimited {
                retry_after_secs: retry_after,
            },
            code @ 500..=599 => ProviderError::Server(code),
            code => ProviderError::HttpStatus(code),
        }))
    }

    /// Live open/closed/merged snapshot, used by the executor's
    /// pre-execution staleness guard. PR and issue share the same endpoint
    /// shape; issues never report `merged`.
    pub async fn fetch_live_state(&self, owner: &str, repo: &str, number: i64, is_pr: bool) -> HostResult<LiveState> {
        #[derive(Deserialize)]
        struct GhLiveState {
            state: String,
            #[serde(default)]
            merged: bool,
        }
        let url = if is_pr {
            format!("{}/repos/{owner}/{repo}/pulls/{number}", self.base_api)
        } else {
            format!("{}/repos/{owner}/{repo}/issues/{number}", self.base_api)
        };
        let (live, _): (GhLiveState, _) = self.get_json(&url).await?;
        Ok(LiveState {
            closed: live.state == "closed",
            merged: live.merged,
        })
    }

    pub async fn close_pr(&self, owner: &str, repo: &str, number: i64) -> HostResult<()> {
        let url = format!("{}/repos/{owner}/{repo}/pulls/{number}", self.base_api);
        self.patch_json(&url, &serde_json::json!({ "state": "closed" })).await
    }

    pub async fn close_issue(&self, owner: &str, repo: &str, number: i64) -> HostResult<()> {
        let url = format!("{}/repos/{owner}/{repo}/issues/{number}", self.base_api);
        self.patch_json(&url, &serde_json::json!({ "state": "closed" })).await
    }

    pub async fn merge_pr(&self, owner: &str, repo: &str, number: i64, merge_method: &str) -> HostResult<()> {
        let url = format!("{}/repos/{owner}/{repo}/pulls/{number}/merge", self.base_api);
        self.post_json(&url, &serde_json::json!({ "merge_method": merge_method })).await
    }

    pub async fn add_label(&self, owner: &str, repo: &str, number: i64, label: &str) -> HostResult<()> {
        let url = format!("{}/repos/{owner}/{repo}/issues/{number}/labels", self.base_api);
        self.post_json(&url, &serde_json::json!({ "labels": [label] })).await
    }

    pub async fn add_comment(&self, owner: &str, repo: &str, number: i64, body: &str) -> HostResult<()> {
        let url = format!("{}/repos/{owner}/{repo}/issues/{number}/comments", self.base_api);
        self.post_json(&url, &serde_json::json!({ "body": body })).await
    }
}

/// Splits `"owner/repo"` and validates both halves are non-empty.
pub fn split_owner_repo(repo: &str) -> HostResult<(String, String)> {
    let mut parts = repo.splitn(2, '/');
    let owner = parts.next().unwrap_or_default();
    let name = parts.next().unwrap_or_default();
    if owner.is_empty() || name.is_empty() {
        return Err(Error::Validation(format!("invalid repo spec: {repo}")));
    }
    Ok((owner.to_string(), name.to_string()))
}

/// `clean|unstable|blocked → mergeable`; `dirty → conflicting`; else `unknown`.
fn map_mergeable(mergeable_state: Option<&str>) -> Mergeable {
    match mergeable_state {
        Some("clean") | Some("unstable") | Some("blocked") => Mergeable::Mergeable,
        Some("dirty") => Mergeable::Conflicting,
        _ => Mergeable::Unknown,
    }
}

fn map_review_state(reviews: &[GhReview]) -> ReviewState {
    review_state_from_states(reviews.iter().map(|r| r.state.as_str()))
}

/// Shared between the REST (`GhReview`) and GraphQL (`GqlReviewNode`) review
/// lists — both vendors use the same state strings.
fn review_state_from_states<'a>(states: impl Iterator<Item = &'a str>) -> ReviewState {
    let states: Vec<&str> = states.collect();
    if states.iter().any(|s| *s == "APPROVED") {
        ReviewState::Approved
    } else if states.iter().any(|s| *s == "CHANGES_REQUESTED") {
        ReviewState::ChangesRequested
    } else if states.iter().any(|s| *s == "COMMENTED") {
        ReviewState::Commented
    } else {
        ReviewState::NoneState
    }
}

/// GraphQL's `MergeableState` enum: `MERGEABLE`/`CONFLICTING`/`UNKNOWN`.
fn map_mergeable_gql(mergeable: &str) -> Mergeable {
    match mergeable {
        "MERGEABLE" => Mergeable::Mergeable,
        "CONFLICTING" => Mergeable::Conflicting,
        _ => Mergeable::Unknown,
    }
}

/// GraphQL's `StatusCheckRollupState` enum.
fn map_ci_rollup_state(state: &str) -> CiStatus {
    match state {
        "SUCCESS" => CiStatus::Success,
        "FAILURE" | "ERROR" => CiStatus::Failure,
        "PENDING" | "EXPECTED" => CiStatus::Pending,
        _ => CiStatus::Unknown,
    }
}

fn escape_graphql_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn map_association(assoc: &str) -> AuthorAssociation {
    match assoc {
        "OWNER" => AuthorAssociation::Owner,
        "MEMBER" => AuthorAssociation::Member,
        "COLLABORATOR" => AuthorAssociation::Collaborator,
        "CONTRIBUTOR" => AuthorAssociation::Contributor,
        "FIRST_TIME_CONTRIBUTOR" | "FIRST_TIMER" => AuthorAssociation::FirstTimer,
        _ => AuthorAssociation::None,
    }
}

/// Small helper so a failed secondary fetch (files/reviews) degrades to an
/// empty list rather than failing the whole PR — per spec.md §4.1's
/// "per-PR fetch errors ... logged and that PR is omitted" only applies to
/// the *primary* metadata call; secondary detail calls degrade gracefully.
trait OrDefaultPair<T> {
    fn unwrap_or_default_pair(self) -> (T, reqwest::header::HeaderMap);
}

impl<T: Default> OrDefaultPair<T> for HostResult<(T, reqwest::header::HeaderMap)> {
    fn unwrap_or_default_pair(self) -> (T, reqwest::header::HeaderMap) {
        match self {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, "secondary detail fetch failed, using empty default");
                (T::default(), reqwest::header::HeaderMap::new())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhUserProfile {
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GhRef {
    #[serde(rename = "ref")]
    r#ref: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhMilestone {
    title: String,
}

#[derive(Debug, Deserialize)]
struct GhPr {
    number: i64,
    title: String,
    body: Option<String>,
    user: GhUser,
    author_association: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    head: GhRef,
    base: GhRef,
    additions: Option<u32>,
    deletions: Option<u32>,
    commits: Option<u32>,
    comments: Option<u32>,
    draft: Option<bool>,
    mergeable_state: Option<String>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    milestone: Option<GhMilestone>,
    #[serde(default)]
    requested_reviewers: Vec<GhUser>,
}

#[derive(Debug, Deserialize, Default)]
struct GhFile {
    filename: String,
}

#[derive(Debug, Deserialize, Default)]
struct GhReview {
    state: String,
}

#[derive(Debug, Deserialize)]
struct GqlAuthor {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GqlLabelNode {
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct GqlLabels {
    nodes: Vec<GqlLabelNode>,
}

#[derive(Debug, Deserialize)]
struct GqlMilestone {
    title: String,
}

#[derive(Debug, Deserialize)]
struct GqlReviewNode {
    state: String,
}

#[derive(Debug, Deserialize, Default)]
struct GqlReviews {
    nodes: Vec<GqlReviewNode>,
}

#[derive(Debug, Deserialize)]
struct GqlFileNode {
    path: String,
}

#[derive(Debug, Deserialize, Default)]
struct GqlFiles {
    nodes: Vec<GqlFileNode>,
}

#[derive(Debug, Deserialize)]
struct GqlReviewer {
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GqlReviewRequestNode {
    #[serde(rename = "requestedReviewer")]
    requested_reviewer: Option<GqlReviewer>,
}

#[derive(Debug, Deserialize, Default)]
struct GqlReviewRequests {
    nodes: Vec<GqlReviewRequestNode>,
}

#[derive(Debug, Deserialize)]
struct GqlStatusCheckRollup {
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GqlCommitInner {
    #[serde(rename = "statusCheckRollup")]
    status_check_rollup: Option<GqlStatusCheckRollup>,
}

#[derive(Debug, Deserialize)]
struct GqlCommitNode {
    commit: GqlCommitInner,
}

#[derive(Debug, Deserialize)]
struct GqlCommitsConnection {
    #[serde(rename = "totalCount")]
    total_count: u32,
    #[serde(default)]
    nodes: Vec<GqlCommitNode>,
}

#[derive(Debug, Deserialize)]
struct GqlCommentsConnection {
    #[serde(rename = "totalCount")]
    total_count: u32,
}

#[derive(Debug, Deserialize)]
struct GqlPullRequest {
    number: i64,
    title: String,
    body: Option<String>,
    author: Option<GqlAuthor>,
    #[serde(rename = "authorAssociation")]
    author_association: String,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    updated_at: DateTime<Utc>,
    #[serde(rename = "headRefName")]
    head_ref_name: String,
    #[serde(rename = "headRefOid")]
    head_ref_oid: String,
    #[serde(rename = "baseRefName")]
    base_ref_name: String,
    additions: u32,
    deletions: u32,
    #[serde(rename = "changedFiles")]
    changed_files: u32,
    #[serde(rename = "isDraft")]
    is_draft: bool,
    mergeable: String,
    milestone: Option<GqlMilestone>,
    comments: GqlCommentsConnection,
    #[serde(default)]
    labels: GqlLabels,
    #[serde(default)]
    reviews: GqlReviews,
    #[serde(default)]
    files: GqlFiles,
    #[serde(rename = "reviewRequests", default)]
    review_requests: GqlReviewRequests,
    commits: GqlCommitsConnection,
}

impl GqlPullRequest {
    fn into_pr_record(self) -> PrRecord {
        let changed_files: Vec<String> = self.files.nodes.into_iter().map(|f| f.path).collect();
        let test_files_changed: Vec<String> = changed_files
            .iter()
            .filter(|f| f.contains("test") || f.contains("spec"))
            .cloned()
            .collect();
        let issue_numbers = extract_issue_numbers(&self.title, self.body.as_deref().unwrap_or(""));
        let age_in_days = (Utc::now() - self.created_at).num_days().max(0);
        let ci_status = self
            .commits
            .nodes
            .first()
            .and_then(|n| n.commit.status_check_rollup.as_ref())
            .and_then(|r| r.state.as_deref())
            .map(map_ci_rollup_state)
            .unwrap_or(CiStatus::Unknown);
        let review_state = review_state_from_states(self.reviews.nodes.iter().map(|r| r.state.as_str()));

        PrRecord {
            number: self.number,
            title: self.title,
            body: self.body.unwrap_or_default(),
            author: self.author.map(|a| a.login).unwrap_or_default(),
            author_association: map_association(&self.author_association),
            created_at: self.created_at,
            updated_at: self.updated_at,
            head_ref: self.head_ref_name,
            base_ref: self.base_ref_name,
            head_sha: self.head_ref_oid,
            files_changed: self.changed_files,
            additions: self.additions,
            deletions: self.deletions,
            commits: self.commits.total_count,
            labels: self.labels.nodes.into_iter().map(|l| l.name).collect(),
            ci_status,
            issue_numbers,
            changed_files,
            has_tests: !test_files_changed.is_empty(),
            test_files_changed,
            age_in_days,
            mergeable: map_mergeable_gql(&self.mergeable),
            review_state,
            review_count: self.reviews.nodes.len() as u32,
            comment_count: self.comments.total_count,
            is_draft: self.is_draft,
            milestone: self.milestone.map(|m| m.title),
            requested_reviewers: self
                .review_requests
                .nodes
                .into_iter()
                .filter_map(|n| n.requested_reviewer.and_then(|r| r.login))
                .collect(),
            codeowners: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhCheckRun {
    conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhCheckRuns {
    check_runs: Vec<GhCheckRun>,
}

#[derive(Debug, Deserialize)]
struct GhCombinedStatus {
    state: String,
}

#[derive(Debug, Deserialize)]
struct GhContent {
    content: Option<String>,
    encoding: Option<String>,
}

impl GhContent {
    fn decode(&self) -> Option<String> {
        let content = self.content.as_ref()?;
        if self.encoding.as_deref() != Some("base64") {
            return Some(content.clone());
        }
        use base64::Engine;
        let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD.decode(cleaned).ok()?;
        String::from_utf8(bytes).ok()
    }
}

#[derive(Debug, Deserialize)]
struct GhReactions {
    total_count: u32,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: i64,
    title: String,
    body: Option<String>,
    user: GhUser,
    author_association: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    comments: u32,
    milestone: Option<GhMilestone>,
    reactions: Option<GhReactions>,
    #[serde(default)]
    assignees: Vec<GhUser>,
    state: String,
    state_reason: Option<String>,
    pull_request: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_valid_repo_spec() {
        assert_eq!(
            split_owner_repo("octocat/hello-world").unwrap(),
            ("octocat".to_string(), "hello-world".to_string())
        );
    }

    #[test]
    fn rejects_malformed_repo_spec() {
        assert!(split_owner_repo("octocat").is_err());
    }

    #[test]
    fn maps_mergeable_states() {
        assert_eq!(map_mergeable(Some("clean")), Mergeable::Mergeable);
        assert_eq!(map_mergeable(Some("dirty")), Mergeable::Conflicting);
        assert_eq!(map_mergeable(Some("unknown_state")), Mergeable::Unknown);
        assert_eq!(map_mergeable(None), Mergeable::Unknown);
    }

    #[test]
    fn maps_review_state_priority() {
        let reviews = vec![
            GhReview { state: "COMMENTED".into() },
            GhReview { state: "CHANGES_REQUESTED".into() },
        ];
        assert_eq!(map_review_state(&reviews), ReviewState::ChangesRequested);
    }
}
