//! Host facade without async-trait or dynamic trait objects.
//!
//! `HostClient` is an enum that wraps one concrete provider client per
//! variant. GitHub is the fully implemented provider (the only one the
//! triage pipeline's env-var contract names); GitLab/Bitbucket variants are
//! kept thin so the dispatch shape stays provider-agnostic without
//! pretending those hosts are load-bearing here.

pub mod codeowners;
pub mod errors;
pub mod github;
pub mod issue_refs;
pub mod rate_limit;

use core_types::{IssueRecord, PrRecord};
use tracing::{debug, warn};

pub use errors::{Error, HostResult, ProviderError};
pub use github::{GitHubClient, LiveState, PrSummary};
pub use rate_limit::RateLimitGovernor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Bitbucket,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub base_api: String,
    pub token: String,
}

impl ProviderConfig {
    pub fn github(token: String) -> Self {
        ProviderConfig {
            kind: ProviderKind::GitHub,
            base_api: "https://api.github.com".to_string(),
            token,
        }
    }
}

#[derive(Debug, Clone)]
pub enum HostClient {
    GitHub(GitHubClient),
    Unsupported(ProviderKind),
}

impl HostClient {
    pub fn from_config(cfg: ProviderConfig) -> HostResult<Self> {
        debug!(kind = ?cfg.kind, "constructing host client");
        let http = reqwest::Client::builder()
            .user_agent("treliq/0.1")
            .build()
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(match cfg.kind {
            ProviderKind::GitHub => {
                HostClient::GitHub(GitHubClient::new(http, cfg.base_api, cfg.token))
            }
            other => {
                warn!(kind = ?other, "provider kept thin, no implementation wired up");
                HostClient::Unsupported(other)
            }
        })
    }

    pub async fn list_open(&self, repo: &str, max: usize) -> HostResult<Vec<PrSummary>> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => c.list_open(&owner, &name, max).await,
            HostClient::Unsupported(_) => Err(Error::Provider(ProviderError::InvalidResponse(
                "provider not implemented".into(),
            ))),
        }
    }

    pub async fn fetch_details(&self, repo: &str, numbers: &[i64]) -> HostResult<Vec<PrRecord>> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => Ok(c.fetch_details(&owner, &name, numbers).await),
            HostClient::Unsupported(_) => Err(Error::Provider(ProviderError::InvalidResponse(
                "provider not implemented".into(),
            ))),
        }
    }

    pub async fn fetch_codeowners(&self, repo: &str) -> HostResult<codeowners::CodeownersMap> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => Ok(c.fetch_codeowners(&owner, &name).await),
            HostClient::Unsupported(_) => Ok(Default::default()),
        }
    }

    pub async fn fetch_vision_doc(&self, repo: &str, path: &str) -> HostResult<Option<String>> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => Ok(c.fetch_vision_doc(&owner, &name, path).await),
            HostClient::Unsupported(_) => Ok(None),
        }
    }

    pub async fn list_issues(&self, repo: &str, max: usize) -> HostResult<Vec<IssueRecord>> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => c.list_issues(&owner, &name, max).await,
            HostClient::Unsupported(_) => Ok(Vec::new()),
        }
    }

    pub async fn fetch_diff(&self, repo: &str, number: i64) -> HostResult<Option<String>> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => Ok(c.fetch_diff(&owner, &name, number).await),
            HostClient::Unsupported(_) => Ok(None),
        }
    }

    pub async fn fetch_account_age_days(&self, login: &str) -> Option<i64> {
        match self {
            HostClient::GitHub(c) => c.fetch_account_age_days(login).await,
            HostClient::Unsupported(_) => None,
        }
    }

    pub fn governor(&self) -> Option<std::sync::Arc<RateLimitGovernor>> {
        match self {
            HostClient::GitHub(c) => Some(c.governor.clone()),
            HostClient::Unsupported(_) => None,
        }
    }

    pub async fn fetch_live_state(&self, repo: &str, number: i64, is_pr: bool) -> HostResult<LiveState> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => c.fetch_live_state(&owner, &name, number, is_pr).await,
            HostClient::Unsupported(_) => Err(Error::Provider(ProviderError::InvalidResponse(
                "provider not implemented".into(),
            ))),
        }
    }

    pub async fn close_pr(&self, repo: &str, number: i64) -> HostResult<()> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => c.close_pr(&owner, &name, number).await,
            HostClient::Unsupported(_) => Err(Error::Provider(ProviderError::InvalidResponse(
                "provider not implemented".into(),
            ))),
        }
    }

    pub async fn close_issue(&self, repo: &str, number: i64) -> HostResult<()> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => c.close_issue(&owner, &name, number).await,
            HostClient::Unsupported(_) => Err(Error::Provider(ProviderError::InvalidResponse(
                "provider not implemented".into(),
            ))),
        }
    }

    pub async fn merge_pr(&self, repo: &str, number: i64, merge_method: &str) -> HostResult<()> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => c.merge_pr(&owner, &name, number, merge_method).await,
            HostClient::Unsupported(_) => Err(Error::Provider(ProviderError::InvalidResponse(
                "provider not implemented".into(),
            ))),
        }
    }

    pub async fn add_label(&self, repo: &str, number: i64, label: &str) -> HostResult<()> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => c.add_label(&owner, &name, number, label).await,
            HostClient::Unsupported(_) => Err(Error::Provider(ProviderError::InvalidResponse(
                "provider not implemented".into(),
            ))),
        }
    }

    pub async fn add_comment(&self, repo: &str, number: i64, body: &str) -> HostResult<()> {
        let (owner, name) = github::split_owner_repo(repo)?;
        match self {
            HostClient::GitHub(c) => c.add_comment(&owner, &name, number, body).await,
            HostClient::Unsupported(_) => Err(Error::Provider(ProviderError::InvalidResponse(
                "provider not implemented".into(),
            ))),
        }
    }
}
