//! Drives one end-to-end repository scan: fetch, score, dedup, vision-check,
//! rank, then persist. Mirrors the nine-step pipeline every CLI/webhook path
//! funnels through.

use std::collections::HashMap;
use std::time::Duration;

use cache::RepoCache;
use chrono::Utc;
use concurrency::ConcurrencyGate;
use core_types::{DedupCluster, Item, ScoredItem};
use dedup_engine::{AnnStore, DedupEngine};
use host_client::HostClient;
use llm_service::ProviderAdapter;
use scorer::{blend_reputation, AccountProfile, Scorer, ScorerConfig, VisionChecker};
use serde::Serialize;
use storage::{Db, ScanSummary};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub repo: String,
    pub max: usize,
    pub trust_contributors: bool,
    pub vision_doc_path: Option<String>,
    pub use_cache: bool,
    pub related_threshold: f64,
    pub verify_duplicates_with_llm: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            repo: String::new(),
            max: 100,
            trust_contributors: false,
            vision_doc_path: Some(".github/VISION.md".to_string()),
            use_cache: true,
            related_threshold: 0.87,
            verify_duplicates_with_llm: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub repo: String,
    pub scanned_at: chrono::DateTime<Utc>,
    pub total_prs: usize,
    pub spam_count: usize,
    pub duplicate_clusters: Vec<DedupCluster>,
    pub ranked_items: Vec<ScoredItem>,
    pub summary: String,
}

pub struct ScanOrchestrator<'a> {
    pub host: &'a HostClient,
    pub db: Option<&'a Db>,
    pub provider: Option<&'a ProviderAdapter>,
    pub vector_store: Option<&'a AnnStore>,
}

impl<'a> ScanOrchestrator<'a> {
    pub fn new(host: &'a HostClient) -> Self {
        ScanOrchestrator {
            host,
            db: None,
            provider: None,
            vector_store: None,
        }
    }

    pub fn with_db(mut self, db: &'a Db) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_provider(mut self, provider: &'a ProviderAdapter) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_vector_store(mut self, store: &'a AnnStore) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Step-numbered per the pipeline contract; a failure at any optional
    /// stage (dedup, vision, cache/db write) is contained and logged rather
    /// than aborting the scan. Only a complete listing failure propagates.
    pub async fn scan(&self, opts: &ScanOptions) -> host_client::HostResult<ScanResult> {
        let provider_name = self.provider.map(|p| format!("{:?}", p.kind())).unwrap_or_default();
        let fingerprint = cache::config_fingerprint(opts.trust_contributors, &provider_name);

        // 1. incremental cache
        let mut repo_cache = if opts.use_cache {
            cache::load(&opts.repo, &fingerprint)
                .await
                .unwrap_or_else(|| RepoCache::new(opts.repo.clone(), fingerprint.clone()))
        } else {
            RepoCache::new(opts.repo.clone(), fingerprint.clone())
        };

        // 2. CODEOWNERS, fetched once and reused for every PR
        let codeowners = self.host.fetch_codeowners(&opts.repo).await.unwrap_or_default();

        // 3. list open PRs (the only call whose failure is fatal)
        let summaries = self.host.list_open(&opts.repo, opts.max).await?;

        let mut cached_items: Vec<ScoredItem> = Vec::new();
        let mut to_fetch: Vec<i64> = Vec::new();
        for summary in &summaries {
            match repo_cache.hit(summary.number, summary.updated_at, &summary.head_sha) {
                Some(entry) => cached_items.push(entry.scored_item_without_embedding.clone()),
                None => to_fetch.push(summary.number),
            }
        }
        info!(repo = %opts.repo, cached = cached_items.len(), to_fetch = to_fetch.len(), "scan plan computed");

        let mut records = self.host.fetch_details(&opts.repo, &to_fetch).await.unwrap_or_default();
        for record in &mut records {
            record.codeowners = host_client::codeowners::owners_for_files(&codeowners, &record.changed_files);
        }

        // 4. reputations, fetched in parallel for authors needing re-scoring
        let scorer = Scorer::new(
            ScorerConfig {
                trust_contributors: opts.trust_contributors,
                ..ScorerConfig::default()
            },
            self.provider.cloned(),
        );
        let mut association_by_author: HashMap<String, f64> = HashMap::new();
        for record in &records {
            association_by_author
                .entry(record.author.clone())
                .or_insert_with(|| record.author_association.baseline_score());
        }
        let host = self.host;
        let profiles = futures::future::join_all(association_by_author.into_iter().map(|(author, association_score)| {
            async move {
                let age = host.fetch_account_age_days(&author).await;
                (author, association_score, age)
            }
        }))
        .await;
        for (author, association_score, age) in profiles {
            if let Some(account_age_days) = age {
                let score = blend_reputation(AccountProfile { account_age_days, association_score });
                scorer.set_reputation(&author, score).await;
            }
        }

        let gate = ConcurrencyGate::new(8, 2, Duration::from_millis(200));

        // 5. score the fetched batch
        let freshly_scored = scorer.score_many(records, &gate).await;

        let mut items: Vec<ScoredItem> = cached_items;
        items.extend(freshly_scored);

        // 6. dedup + vision run concurrently
        let vision_doc = match &opts.vision_doc_path {
            Some(path) => self.host.fetch_vision_doc(&opts.repo, path).await.unwrap_or(None),
            None => None,
        };

        let clusters = DedupEngine::find_duplicates(
            &mut items,
            self.provider,
            self.vector_store,
            opts.related_threshold,
            opts.verify_duplicates_with_llm,
            &gate,
        )
        .await;
        VisionChecker::check_many(&mut items, vision_doc.as_deref(), self.provider).await;

        // 7. rank
        items.sort_by_key(|i| i.ranking_key());
        let spam_count = items.iter().filter(|i| i.is_spam).count();

        // 8. persist incremental cache (best-effort)
        if opts.use_cache {
            repo_cache.config_fingerprint = fingerprint.clone();
            repo_cache.last_scan = Utc::now();
            for item in &items {
                if let Item::Pr(p) = &item.item {
                    let mut without_embedding = item.clone();
                    without_embedding.embedding = None;
                    repo_cache.put(core_types::CacheEntry {
                        number: p.number,
                        updated_at: p.updated_at,
                        head_sha: p.head_sha.clone(),
                        scored_item_without_embedding: without_embedding,
                    });
                }
            }
            cache::save_or_log(&repo_cache).await;
        }

        // 9. persist to the database (best-effort, never fatal to the scan)
        if let Some(db) = self.db {
            if let Err(e) = self.persist(db, &opts.repo, &items, &clusters, &fingerprint).await {
                warn!(error = %e, "failed to persist scan to database");
            }
        }

        let scanned_at = Utc::now();
        let summary = format!(
            "{} open PRs scanned, {} flagged as spam, {} duplicate cluster(s)",
            items.len(),
            spam_count,
            clusters.len()
        );

        Ok(ScanResult {
            repo: opts.repo.clone(),
            scanned_at,
            total_prs: items.len(),
            spam_count,
            duplicate_clusters: clusters,
            ranked_items: items,
            summary,
        })
    }

    async fn persist(
        &self,
        db: &Db,
        repo: &str,
        items: &[ScoredItem],
        clusters: &[DedupCluster],
        fingerprint: &str,
    ) -> storage::DbResult<()> {
        let (owner, name) = host_client::github::split_owner_repo(repo)
            .map_err(|e| storage::Error::Connect(e.to_string()))?;
        let repo_id = db.upsert_repository(&owner, &name).await?;
        for item in items {
            db.upsert_scored_item(repo_id, item, fingerprint).await?;
        }
        let scanned_at = Utc::now();
        db.record_scan(
            repo_id,
            scanned_at,
            &ScanSummary {
                total_prs: items.len() as i64,
                spam_count: items.iter().filter(|i| i.is_spam).count() as i64,
                dup_clusters: clusters.len() as i64,
                config_hash: fingerprint.to_string(),
            },
        )
        .await
    }
}

