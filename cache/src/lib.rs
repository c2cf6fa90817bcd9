//! Per-repository incremental cache: one JSON file holding the last scan's
//! `CacheEntry` per PR/issue number, keyed by `(updatedAt, headSha)` so an
//! unchanged PR is never re-scored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use core_types::CacheEntry;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

fn cache_root() -> PathBuf {
    std::env::var("TRELIQ_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("cache_data"))
}

fn sanitize(repo: &str) -> String {
    repo.replace('/', "_")
}

pub fn cache_path(repo: &str) -> PathBuf {
    cache_root().join(format!("{}.json", sanitize(repo)))
}

/// First 8 hex chars of MD5 over a canonical `{trustContributors, providerName}` serialization.
pub fn config_fingerprint(trust_contributors: bool, provider_name: &str) -> String {
    let canonical = serde_json::json!({
        "trustContributors": trust_contributors,
        "providerName": provider_name,
    });
    let mut hasher = Md5::new();
    hasher.update(canonical.to_string().as_bytes());
    let digest = hasher.finalize();
    format!("{:x}", digest)[..8].to_string()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RepoCache {
    pub repo: String,
    pub last_scan: DateTime<Utc>,
    pub config_fingerprint: String,
    pub items: HashMap<i64, CacheEntry>,
}

impl RepoCache {
    pub fn new(repo: String, config_fingerprint: String) -> Self {
        RepoCache {
            repo,
            last_scan: Utc::now(),
            config_fingerprint,
            items: HashMap::new(),
        }
    }

    /// `None` unless the cached entry's `(updatedAt, headSha)` matches exactly.
    pub fn hit(&self, number: i64, updated_at: DateTime<Utc>, head_sha: &str) -> Option<&CacheEntry> {
        self.items
            .get(&number)
            .filter(|entry| entry.updated_at == updated_at && entry.head_sha == head_sha)
    }

    pub fn put(&mut self, entry: CacheEntry) {
        self.items.insert(entry.number, entry);
    }
}

/// Returns `None` if the file is missing, invalid JSON, names a different
/// repo, or (when both sides supply one) the fingerprint mismatches.
pub async fn load(repo: &str, expected_fingerprint: &str) -> Option<RepoCache> {
    let path = cache_path(repo);
    if !Path::new(&path).exists() {
        return None;
    }
    let bytes = fs::read(&path).await.ok()?;
    let parsed: RepoCache = match serde_json::from_slice(&bytes) {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, "cache file invalid JSON, treating as miss");
            return None;
        }
    };
    if parsed.repo != repo {
        debug!("cache repo mismatch, treating as miss");
        return None;
    }
    if !parsed.config_fingerprint.is_empty()
        && !expected_fingerprint.is_empty()
        && parsed.config_fingerprint != expected_fingerprint
    {
        debug!("cache fingerprint mismatch, treating as miss");
        return None;
    }
    Some(parsed)
}

/// Atomic write via a sibling temp file + rename, so a crash mid-write never
/// leaves a half-written cache file to be parsed on the next run.
pub async fn save(cache: &RepoCache) -> Result<(), String> {
    let path = cache_path(&cache.repo);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await.map_err(|e| e.to_string())?;
    }
    let json = serde_json::to_vec(cache).map_err(|e| e.to_string())?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json).await.map_err(|e| e.to_string())?;
    fs::rename(&tmp_path, &path).await.map_err(|e| e.to_string())?;
    Ok(())
}

/// Best-effort save; failures are logged and never fatal to a scan.
pub async fn save_or_log(cache: &RepoCache) {
    if let Err(e) = save(cache).await {
        warn!(error = %e, repo = %cache.repo, "failed to persist incremental cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{AuthorAssociation, CiStatus, Item, Mergeable, PrRecord, ReviewState, ScoredItem};
    use std::collections::BTreeSet;

    fn entry(number: i64, updated_at: DateTime<Utc>, head_sha: &str) -> CacheEntry {
        let record = PrRecord {
            number,
            title: "t".into(),
            body: "b".into(),
            author: "a".into(),
            author_association: AuthorAssociation::Owner,
            created_at: updated_at,
            updated_at,
            head_ref: "h".into(),
            base_ref: "main".into(),
            head_sha: head_sha.into(),
            files_changed: 1,
            additions: 1,
            deletions: 0,
            commits: 1,
            labels: BTreeSet::new(),
            ci_status: CiStatus::Success,
            issue_numbers: vec![],
            changed_files: vec![],
            has_tests: true,
            test_files_changed: vec![],
            age_in_days: 0,
            mergeable: Mergeable::Mergeable,
            review_state: ReviewState::Approved,
            review_count: 1,
            comment_count: 0,
            is_draft: false,
            milestone: None,
            requested_reviewers: vec![],
            codeowners: vec![],
        };
        CacheEntry {
            number,
            updated_at,
            head_sha: head_sha.into(),
            scored_item_without_embedding: ScoredItem::new(Item::Pr(record)),
        }
    }

    #[test]
    fn fingerprint_is_eight_hex_chars_and_deterministic() {
        let a = config_fingerprint(true, "github");
        let b = config_fingerprint(true, "github");
        let c = config_fingerprint(false, "github");
        assert_eq!(a.len(), 8);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn round_trips_through_disk_and_detects_hit_and_miss() {
        let dir = tempfile::tempdir().unwrap();
        unsafe {
            std::env::set_var("TRELIQ_CACHE_DIR", dir.path());
        }

        let fp = config_fingerprint(false, "github");
        let mut cache = RepoCache::new("octocat/hello-world".into(), fp.clone());
        let now = Utc::now();
        cache.put(entry(1, now, "sha-a"));
        save(&cache).await.unwrap();

        let loaded = load("octocat/hello-world", &fp).await.unwrap();
        assert!(loaded.hit(1, now, "sha-a").is_some());
        assert!(loaded.hit(1, now, "sha-b").is_none());

        let mismatched_fp = config_fingerprint(true, "github");
        assert!(load("octocat/hello-world", &mismatched_fp).await.is_none());
    }
}
