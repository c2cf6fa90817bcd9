//! Embedding-based near-duplicate clustering: embed → pairwise similarity →
//! union-find → optional LLM verification.

mod ann;
mod unionfind;

pub use ann::AnnStore;

use std::collections::HashMap;

use futures::stream::{self, StreamExt};

use core_types::{ClusterType, DedupCluster, ScoredItem};
use llm_service::{GenerateOpts, ProviderAdapter};
use serde::Deserialize;
use tracing::{debug, warn};
use unionfind::UnionFind;

const BRUTE_FORCE_CUTOFF: usize = 50;
const MAX_SINGLE_EMBED_FAILURES: usize = 5;
const EMBED_BATCH_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(rename = "isDuplicate")]
    is_duplicate: bool,
    #[allow(dead_code)]
    reason: Option<String>,
    subgroups: Option<Vec<Vec<i64>>>,
}

#[derive(Debug, Deserialize)]
struct BestPrResponse {
    #[serde(rename = "bestPR")]
    best_pr: i64,
}

pub struct DedupEngine;

impl DedupEngine {
    /// `items` must already be scored; embeddings that are missing are
    /// computed in place. `vector_store` is consulted only when the
    /// embedded set exceeds the brute-force cutoff.
    pub async fn find_duplicates(
        items: &mut [ScoredItem],
        provider: Option<&ProviderAdapter>,
        vector_store: Option<&AnnStore>,
        related_threshold: f64,
        verify_with_llm: bool,
        gate: &concurrency::ConcurrencyGate,
    ) -> Vec<DedupCluster> {
        let Some(provider) = provider else {
            debug!("no LLM provider configured, skipping dedup entirely");
            return Vec::new();
        };

        if !embed_stage(items, provider, gate).await {
            warn!("dedup aborted: too many consecutive embedding failures");
            return Vec::new();
        }

        let embedded: Vec<(usize, i64, Vec<f32>)> = items
            .iter()
            .enumerate()
            .filter_map(|(idx, item)| item.embedding.clone().map(|e| (idx, item.number(), e)))
            .collect();

        if embedded.len() < 2 {
            return Vec::new();
        }

        let pairs = pairwise_similarity(&embedded, vector_store, related_threshold).await;
        let clusters = cluster_pairs(items, &embedded, &pairs);

        let clusters = if verify_with_llm {
            verify_clusters(clusters, provider).await
        } else {
            clusters
        };

        let mut by_number: HashMap<i64, usize> = HashMap::new();
        for (idx, item) in items.iter().enumerate() {
            by_number.insert(item.number(), idx);
        }
        for cluster in &clusters {
            for number in cluster.numbers() {
                if let Some(&idx) = by_number.get(&number) {
                    items[idx].duplicate_group = Some(cluster.id);
                }
            }
        }

        clusters
    }
}

/// Returns `false` if the whole operation should abort (5 single-embedding
/// failures within a chunk after a failed or unsupported batch path).
async fn embed_stage(items: &mut [ScoredItem], provider: &ProviderAdapter, gate: &concurrency::ConcurrencyGate) -> bool {
    let missing: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.embedding.is_none())
        .map(|(idx, _)| idx)
        .collect();
    if missing.is_empty() {
        return true;
    }

    for chunk_indices in missing.chunks(EMBED_BATCH_SIZE) {
        let chunk_texts: Vec<String> = chunk_indices
            .iter()
            .map(|&idx| format!("{}\n{}", items[idx].item.title(), items[idx].item.body()))
            .collect();

        match provider.generate_embedding_batch(&chunk_texts).await {
            Ok(Some(vectors)) if vectors.len() == chunk_indices.len() => {
                for (idx, vector) in chunk_indices.iter().zip(vectors.into_iter()) {
                    items[*idx].embedding = Some(vector);
                }
                continue;
            }
            Ok(_) => debug!("batch embedding unsupported or size mismatch, falling back to single calls"),
            Err(e) => debug!(error = %e, "batch embedding failed, falling back to single calls"),
        }

        let tasks: Vec<(usize, i64, String)> = chunk_indices
            .iter()
            .map(|&idx| {
                let text = items[idx].item.title().to_string() + "\n" + items[idx].item.body();
                (idx, items[idx].number(), text)
            })
            .collect();

        let results: Vec<(usize, i64, Result<Vec<f32>, _>)> = stream::iter(tasks)
            .map(|(idx, number, text)| async move {
                let result = gate
                    .execute(|| {
                        let text = text.clone();
                        async move { provider.generate_embedding(&text).await }
                    })
                    .await;
                (idx, number, result)
            })
            .buffer_unordered(gate.current_max().max(1))
            .collect()
            .await;

        let mut failures = 0usize;
        for (idx, number, result) in results {
            match result {
                Ok(vector) => items[idx].embedding = Some(vector),
                Err(e) => {
                    failures += 1;
                    warn!(error = %e, number, "single embedding failed");
                }
            }
        }
        if failures >= MAX_SINGLE_EMBED_FAILURES {
            return false;
        }
    }
    true
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Returns `(i, j, similarity)` with `i < j` indices into `embedded`.
async fn pairwise_similarity(
    embedded: &[(usize, i64, Vec<f32>)],
    vector_store: Option<&AnnStore>,
    related_threshold: f64,
) -> Vec<(usize, usize, f64)> {
    if embedded.len() <= BRUTE_FORCE_CUTOFF || vector_store.is_none() {
        let mut pairs = Vec::new();
        for i in 0..embedded.len() {
            for j in (i + 1)..embedded.len() {
                let sim = cosine(&embedded[i].2, &embedded[j].2);
                if sim >= related_threshold {
                    pairs.push((i, j, sim));
                }
            }
        }
        return pairs;
    }

    let store = vector_store.unwrap();
    let to_upsert: Vec<(i64, Vec<f32>)> = embedded.iter().map(|(_, n, v)| (*n, v.clone())).collect();
    if let Err(e) = store.upsert_all(&to_upsert).await {
        warn!(error = %e, "ann upsert failed, falling back to brute force");
        let mut pairs = Vec::new();
        for i in 0..embedded.len() {
            for j in (i + 1)..embedded.len() {
                let sim = cosine(&embedded[i].2, &embedded[j].2);
                if sim >= related_threshold {
                    pairs.push((i, j, sim));
                }
            }
        }
        return pairs;
    }

    let number_to_idx: HashMap<i64, usize> = embedded.iter().enumerate().map(|(idx, (_, n, _))| (*n, idx)).collect();
    let mut seen = std::collections::HashSet::new();
    let mut pairs = Vec::new();
    for (idx, (_, number, vector)) in embedded.iter().enumerate() {
        let neighbours = match store.search_top20(*number, vector).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, number, "ann search failed for item");
                continue;
            }
        };
        for (other_number, sim) in neighbours {
            if sim < related_threshold {
                continue;
            }
            let Some(&other_idx) = number_to_idx.get(&other_number) else { continue };
            let key = (idx.min(other_idx), idx.max(other_idx));
            if seen.insert(key) {
                pairs.push((key.0, key.1, sim));
            }
        }
    }
    pairs
}

fn cluster_pairs(
    items: &[ScoredItem],
    embedded: &[(usize, i64, Vec<f32>)],
    pairs: &[(usize, usize, f64)],
) -> Vec<DedupCluster> {
    let mut uf = UnionFind::new(embedded.len());
    for (i, j, _) in pairs {
        uf.union(*i, *j);
    }

    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for embedded_idx in 0..embedded.len() {
        groups.entry(uf.find(embedded_idx)).or_default().push(embedded_idx);
    }

    let mut clusters = Vec::new();
    let mut next_id = 1u64;
    for (_, member_embedded_indices) in groups {
        if member_embedded_indices.len() < 2 {
            continue;
        }
        let member_item_indices: Vec<usize> = member_embedded_indices.iter().map(|&ei| embedded[ei].0).collect();
        let members: Vec<ScoredItem> = member_item_indices.iter().map(|&idx| items[idx].clone()).collect();

        let internal_sims: Vec<f64> = pairs
            .iter()
            .filter(|(i, j, _)| member_embedded_indices.contains(i) && member_embedded_indices.contains(j))
            .map(|(_, _, sim)| *sim)
            .collect();
        let avg_similarity = if internal_sims.is_empty() {
            0.0
        } else {
            internal_sims.iter().sum::<f64>() / internal_sims.len() as f64
        };

        let best = members
            .iter()
            .max_by(|a, b| a.total_score.partial_cmp(&b.total_score).unwrap_or(std::cmp::Ordering::Equal))
            .map(|m| m.number())
            .unwrap_or(members[0].number());

        let cluster_type = if members.iter().all(|m| matches!(m.item, core_types::Item::Pr(_))) {
            ClusterType::Pr
        } else if members.iter().all(|m| matches!(m.item, core_types::Item::Issue(_))) {
            ClusterType::Issue
        } else {
            ClusterType::Mixed
        };

        clusters.push(DedupCluster {
            id: next_id,
            members,
            best_member_number: best,
            avg_similarity,
            reason: format!("cosine similarity >= threshold across {} pair(s)", internal_sims.len()),
            cluster_type,
            best_overridden: false,
        });
        next_id += 1;
    }
    clusters
}

async fn verify_clusters(clusters: Vec<DedupCluster>, provider: &ProviderAdapter) -> Vec<DedupCluster> {
    let mut out = Vec::new();
    for cluster in clusters {
        let titles: Vec<String> = cluster
            .members
            .iter()
            .map(|m| format!("#{}: {}", m.number(), m.item.title()))
            .collect();
        let prompt = format!(
            "These items were flagged as potential duplicates by embedding similarity. \
             Respond with strict JSON: {{\"isDuplicate\": bool, \"reason\": \"...\", \
             \"subgroups\": [[number, ...], ...] | null}}.\n\n{}",
            titles.join("\n")
        );

        let verify: Option<VerifyResponse> = match provider.generate_text(&prompt, GenerateOpts::default()).await {
            Ok(raw) => serde_json::from_str(raw.trim()).ok(),
            Err(e) => {
                debug!(error = %e, "dedup verification call failed, keeping cluster as-is");
                None
            }
        };

        let Some(verify) = verify else {
            out.push(cluster);
            continue;
        };
        if !verify.is_duplicate {
            continue;
        }

        let subclusters = match verify.subgroups {
            Some(groups) if !groups.is_empty() => split_cluster(&cluster, &groups),
            _ => vec![cluster],
        };

        for mut sub in subclusters {
            if sub.members.len() < 2 {
                continue;
            }
            pick_best_with_llm(&mut sub, provider).await;
            out.push(sub);
        }
    }
    out
}

fn split_cluster(cluster: &DedupCluster, subgroups: &[Vec<i64>]) -> Vec<DedupCluster> {
    subgroups
        .iter()
        .enumerate()
        .map(|(i, numbers)| {
            let members: Vec<ScoredItem> = cluster
                .members
                .iter()
                .filter(|m| numbers.contains(&m.number()))
                .cloned()
                .collect();
            let best = members
                .iter()
                .max_by(|a, b| a.total_score.partial_cmp(&b.total_score).unwrap_or(std::cmp::Ordering::Equal))
                .map(|m| m.number())
                .unwrap_or_default();
            DedupCluster {
                id: cluster.id * 100 + i as u64,
                members,
                best_member_number: best,
                avg_similarity: cluster.avg_similarity,
                reason: cluster.reason.clone(),
                cluster_type: cluster.cluster_type,
                best_overridden: false,
            }
        })
        .collect()
}

async fn pick_best_with_llm(cluster: &mut DedupCluster, provider: &ProviderAdapter) {
    let titles: Vec<String> = cluster
        .members
        .iter()
        .map(|m| format!("#{}: {} (score {})", m.number(), m.item.title(), m.total_score))
        .collect();
    let prompt = format!(
        "Pick the single best item to keep from this duplicate cluster. \
         Respond with strict JSON: {{\"bestPR\": number}}.\n\n{}",
        titles.join("\n")
    );
    let raw = match provider.generate_text(&prompt, GenerateOpts::default()).await {
        Ok(raw) => raw,
        Err(e) => {
            debug!(error = %e, "best-pick call failed, retaining score-based best");
            return;
        }
    };
    match serde_json::from_str::<BestPrResponse>(raw.trim()) {
        Ok(parsed) if cluster.members.iter().any(|m| m.number() == parsed.best_pr) => {
            if parsed.best_pr != cluster.best_member_number {
                cluster.best_member_number = parsed.best_pr;
                cluster.best_overridden = true;
            }
        }
        Ok(_) => debug!("best-pick response named a number outside the cluster, retaining score-based best"),
        Err(e) => debug!(error = %e, "best-pick response failed schema validation, retaining score-based best"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::{AuthorAssociation, CiStatus, Item, Mergeable, PrRecord, ReviewState};
    use std::collections::BTreeSet;

    fn pr_with_embedding(number: i64, score: f64, embedding: Vec<f32>) -> ScoredItem {
        let now = Utc::now();
        let record = PrRecord {
            number,
            title: format!("pr {number}"),
            body: String::new(),
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
            ci_status: CiStatus::Success,
            issue_numbers: vec![],
            changed_files: vec![],
            has_tests: false,
            test_files_changed: vec![],
            age_in_days: 0,
            mergeable: Mergeable::Mergeable,
            review_state: ReviewState::NoneState,
            review_count: 0,
            comment_count: 0,
            is_draft: false,
            milestone: None,
            requested_reviewers: vec![],
            codeowners: vec![],
        };
        let mut item = ScoredItem::new(Item::Pr(record));
        item.total_score = score;
        item.embedding = Some(embedding);
        item
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        assert!((cosine(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]).abs() < 1e-9);
    }

    #[tokio::test]
    async fn three_prs_cluster_two_of_three_above_threshold() {
        let items = vec![
            pr_with_embedding(1, 70.0, vec![1.0, 0.0, 0.0]),
            pr_with_embedding(2, 90.0, vec![0.99, 0.01, 0.0]),
            pr_with_embedding(3, 80.0, vec![0.0, 1.0, 0.0]),
        ];
        let embedded: Vec<(usize, i64, Vec<f32>)> = items
            .iter()
            .enumerate()
            .map(|(idx, item)| (idx, item.number(), item.embedding.clone().unwrap()))
            .collect();
        let pairs = pairwise_similarity(&embedded, None, 0.8).await;
        let clusters = cluster_pairs(&items, &embedded, &pairs);

        assert_eq!(clusters.len(), 1);
        let cluster = &clusters[0];
        assert_eq!(cluster.numbers(), [1, 2].into_iter().collect());
        assert_eq!(cluster.best_member_number, 2);
        assert!(items[2].duplicate_group.is_none());
    }
}
