//! Per-author trust score, cached for the scorer's lifetime.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::RwLock;

/// Minimal profile needed to blend a reputation score when one hasn't been
/// pre-seeded via `set_reputation`.
#[derive(Debug, Clone, Copy)]
pub struct AccountProfile {
    pub account_age_days: i64,
    pub association_score: f64,
}

fn account_age_score(days: i64) -> f64 {
    match days {
        d if d < 30 => 20.0,
        d if d < 180 => 50.0,
        d if d < 730 => 75.0,
        _ => 95.0,
    }
}

pub fn blend(profile: AccountProfile) -> u8 {
    let score = 0.6 * profile.association_score + 0.4 * account_age_score(profile.account_age_days);
    score.clamp(0.0, 100.0).round() as u8
}

#[derive(Default)]
pub struct ReputationProbe {
    cache: RwLock<HashMap<String, u8>>,
}

impl ReputationProbe {
    pub fn new() -> Self {
        ReputationProbe::default()
    }

    /// Pre-populates the map; consulted only by the `contributor` signal.
    pub async fn set_reputation(&self, login: &str, score: u8) {
        self.cache.write().await.insert(login.to_string(), score.min(100));
    }

    pub async fn get(&self, login: &str) -> Option<u8> {
        self.cache.read().await.get(login).copied()
    }

    /// Returns the cached score, or runs `compute` (a best-effort host
    /// profile probe) once and caches the blended result. A probe failure
    /// (returns `None`) leaves the login unscored — the `contributor`
    /// signal then falls back to the bare association baseline.
    pub async fn get_or_compute<F, Fut>(&self, login: &str, compute: F) -> Option<u8>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<AccountProfile>>,
    {
        if let Some(v) = self.get(login).await {
            return Some(v);
        }
        let profile = compute().await?;
        let score = blend(profile);
        self.set_reputation(login, score).await;
        Some(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preseeded_reputation_is_consulted_directly() {
        let probe = ReputationProbe::new();
        probe.set_reputation("alice", 77).await;
        assert_eq!(probe.get("alice").await, Some(77));
    }

    #[tokio::test]
    async fn computes_and_caches_on_miss() {
        let probe = ReputationProbe::new();
        let score = probe
            .get_or_compute("bob", || async {
                Some(AccountProfile {
                    account_age_days: 800,
                    association_score: 70.0,
                })
            })
            .await;
        assert_eq!(score, Some((0.6_f64 * 70.0 + 0.4 * 95.0).round() as u8));
        assert_eq!(probe.get("bob").await, score);
    }
}
