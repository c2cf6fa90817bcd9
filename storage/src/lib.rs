//! Embedded SQLite persistence for scan history, independent of the
//! per-repo incremental cache file — this is the durable record queried by
//! the `history`/`compare` surfaces, not the hot path that decides whether
//! to re-score a PR.

mod errors;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use core_types::{ItemType, RiskLevel, ScoredItem};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::info;

pub use errors::{DbResult, Error};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    owner       TEXT NOT NULL,
    repo        TEXT NOT NULL,
    created_at  TEXT NOT NULL DEFAULT (datetime('now')),
    last_scan   TEXT,
    UNIQUE(owner, repo)
);

CREATE TABLE IF NOT EXISTS pull_requests (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id         INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    pr_number       INTEGER NOT NULL,
    title           TEXT NOT NULL,
    author          TEXT NOT NULL,
    total_score     REAL NOT NULL,
    is_spam         INTEGER NOT NULL,
    duplicate_group INTEGER,
    intent          TEXT,
    llm_risk        TEXT,
    state           TEXT NOT NULL,
    config_hash     TEXT NOT NULL,
    stored_at       TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(repo_id, pr_number)
);

CREATE TABLE IF NOT EXISTS scoring_signals (
    pr_id  INTEGER NOT NULL REFERENCES pull_requests(id) ON DELETE CASCADE,
    name   TEXT NOT NULL,
    score  REAL NOT NULL,
    weight REAL NOT NULL,
    reason TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS scan_history (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id      INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    scanned_at   TEXT NOT NULL,
    total_prs    INTEGER NOT NULL,
    spam_count   INTEGER NOT NULL,
    dup_clusters INTEGER NOT NULL,
    config_hash  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS issues (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id    INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    number     INTEGER NOT NULL,
    title      TEXT NOT NULL,
    state      TEXT NOT NULL,
    stored_at  TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(repo_id, number)
);

CREATE TABLE IF NOT EXISTS installations (
    id            INTEGER PRIMARY KEY,
    account_type  TEXT NOT NULL,
    account_login TEXT NOT NULL,
    suspended_at  TEXT
);

CREATE TABLE IF NOT EXISTS installation_repos (
    installation_id INTEGER NOT NULL REFERENCES installations(id) ON DELETE CASCADE,
    repo_id         INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    PRIMARY KEY (installation_id, repo_id)
);

CREATE INDEX IF NOT EXISTS idx_pr_repo_number ON pull_requests(repo_id, pr_number);
CREATE INDEX IF NOT EXISTS idx_pr_state ON pull_requests(state);
CREATE INDEX IF NOT EXISTS idx_pr_total_score ON pull_requests(total_score DESC);
CREATE INDEX IF NOT EXISTS idx_pr_is_spam ON pull_requests(is_spam);
CREATE INDEX IF NOT EXISTS idx_pr_duplicate_group ON pull_requests(duplicate_group);
CREATE INDEX IF NOT EXISTS idx_scan_history_repo_time ON scan_history(repo_id, scanned_at DESC);
"#;

pub struct ScanSummary {
    pub total_prs: i64,
    pub spam_count: i64,
    pub dup_clusters: i64,
    pub config_hash: String,
}

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub async fn open(path: &str) -> DbResult<Self> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| Error::Connect(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .map_err(|e| Error::Migration(e.to_string()))?;

        info!(path, "storage database opened");
        Ok(Db { pool })
    }

    pub async fn upsert_repository(&self, owner: &str, repo: &str) -> DbResult<i64> {
        sqlx::query("INSERT INTO repositories (owner, repo) VALUES (?1, ?2) ON CONFLICT(owner, repo) DO NOTHING")
            .bind(owner)
            .bind(repo)
            .execute(&self.pool)
            .await?;
        let row = sqlx::query("SELECT id FROM repositories WHERE owner = ?1 AND repo = ?2")
            .bind(owner)
            .bind(repo)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("id"))
    }

    pub async fn touch_last_scan(&self, repo_id: i64, scanned_at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE repositories SET last_scan = ?2 WHERE id = ?1")
            .bind(repo_id)
            .bind(scanned_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upserts one scored item and its signals within a single transaction.
    pub async fn upsert_scored_item(&self, repo_id: i64, item: &ScoredItem, config_hash: &str) -> DbResult<()> {
        if item.item.item_type() != ItemType::Pr {
            return self.upsert_issue(repo_id, item).await;
        }

        let mut tx = self.pool.begin().await?;
        let risk = item.llm_risk.map(risk_str);
        let state = "open";

        sqlx::query(
            "INSERT INTO pull_requests
                (repo_id, pr_number, title, author, total_score, is_spam, duplicate_group, intent, llm_risk, state, config_hash)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)
             ON CONFLICT(repo_id, pr_number) DO UPDATE SET
                title = excluded.title,
                author = excluded.author,
                total_score = excluded.total_score,
                is_spam = excluded.is_spam,
                duplicate_group = COALESCE(excluded.duplicate_group, pull_requests.duplicate_group),
                intent = COALESCE(excluded.intent, pull_requests.intent),
                llm_risk = COALESCE(excluded.llm_risk, pull_requests.llm_risk),
                state = excluded.state,
                config_hash = excluded.config_hash,
                stored_at = datetime('now')",
        )
        .bind(repo_id)
        .bind(item.number())
        .bind(item.item.title())
        .bind(author_of(item))
        .bind(item.total_score)
        .bind(item.is_spam as i64)
        .bind(item.duplicate_group.map(|g| g as i64))
        .bind(item.intent.map(|i| i.as_str()))
        .bind(risk)
        .bind(state)
        .bind(config_hash)
        .execute(&mut *tx)
        .await?;

        let pr_id: i64 = sqlx::query("SELECT id FROM pull_requests WHERE repo_id = ?1 AND pr_number = ?2")
            .bind(repo_id)
            .bind(item.number())
            .fetch_one(&mut *tx)
            .await?
            .get("id");

        sqlx::query("DELETE FROM scoring_signals WHERE pr_id = ?1").bind(pr_id).execute(&mut *tx).await?;
        for signal in &item.signals {
            sqlx::query("INSERT INTO scoring_signals (pr_id, name, score, weight, reason) VALUES (?1,?2,?3,?4,?5)")
                .bind(pr_id)
                .bind(&signal.name)
                .bind(signal.score)
                .bind(signal.weight)
                .bind(&signal.reason)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_issue(&self, repo_id: i64, item: &ScoredItem) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO issues (repo_id, number, title, state) VALUES (?1,?2,?3,'open')
             ON CONFLICT(repo_id, number) DO UPDATE SET title = excluded.title, stored_at = datetime('now')",
        )
        .bind(repo_id)
        .bind(item.number())
        .bind(item.item.title())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_scan(&self, repo_id: i64, scanned_at: DateTime<Utc>, summary: &ScanSummary) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO scan_history (repo_id, scanned_at, total_prs, spam_count, dup_clusters, config_hash)
             VALUES (?1,?2,?3,?4,?5,?6)",
        )
        .bind(repo_id)
        .bind(scanned_at.to_rfc3339())
        .bind(summary.total_prs)
        .bind(summary.spam_count)
        .bind(summary.dup_clusters)
        .bind(&summary.config_hash)
        .execute(&self.pool)
        .await?;
        self.touch_last_scan(repo_id, scanned_at).await
    }

    pub async fn upsert_installation(&self, id: i64, account_type: &str, account_login: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO installations (id, account_type, account_login) VALUES (?1,?2,?3)
             ON CONFLICT(id) DO UPDATE SET account_type = excluded.account_type, account_login = excluded.account_login",
        )
        .bind(id)
        .bind(account_type)
        .bind(account_login)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_installation_suspended(&self, id: i64, suspended_at: Option<DateTime<Utc>>) -> DbResult<()> {
        sqlx::query("UPDATE installations SET suspended_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(suspended_at.map(|t| t.to_rfc3339()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn link_installation_repo(&self, installation_id: i64, repo_id: i64) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO installation_repos (installation_id, repo_id) VALUES (?1,?2)
             ON CONFLICT(installation_id, repo_id) DO NOTHING",
        )
        .bind(installation_id)
        .bind(repo_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn recent_scans(&self, repo_id: i64, limit: i64) -> DbResult<Vec<(DateTime<Utc>, i64, i64, i64)>> {
        let rows = sqlx::query(
            "SELECT scanned_at, total_prs, spam_count, dup_clusters FROM scan_history
             WHERE repo_id = ?1 ORDER BY scanned_at DESC LIMIT ?2",
        )
        .bind(repo_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let ts: String = r.get("scanned_at");
                let scanned_at = DateTime::parse_from_rfc3339(&ts).ok()?.with_timezone(&Utc);
                Some((
                    scanned_at,
                    r.get::<i64, _>("total_prs"),
                    r.get::<i64, _>("spam_count"),
                    r.get::<i64, _>("dup_clusters"),
                ))
            })
            .collect())
    }
}

fn author_of(item: &ScoredItem) -> &str {
    match &item.item {
        core_types::Item::Pr(p) => &p.author,
        core_types::Item::Issue(i) => &i.author,
    }
}

fn risk_str(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::Low => "low",
        RiskLevel::Medium => "medium",
        RiskLevel::High => "high",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{AuthorAssociation, CiStatus, Item, Mergeable, PrRecord, ReviewState, SignalScore};
    use std::collections::BTreeSet;

    fn sample_item(number: i64) -> ScoredItem {
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
        let mut item = ScoredItem::new(Item::Pr(record));
        item.total_score = 77.0;
        item.signals.push(SignalScore { name: "ci_status".into(), score: 100.0, weight: 0.15, reason: "ok".into() });
        item
    }

    #[tokio::test]
    async fn upserts_repository_and_scored_item_then_records_scan() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("treliq.sqlite3");
        let db = Db::open(db_path.to_str().unwrap()).await.unwrap();

        let repo_id = db.upsert_repository("octocat", "hello-world").await.unwrap();
        let item = sample_item(42);
        db.upsert_scored_item(repo_id, &item, "abcd1234").await.unwrap();

        db.record_scan(
            repo_id,
            Utc::now(),
            &ScanSummary { total_prs: 1, spam_count: 0, dup_clusters: 0, config_hash: "abcd1234".into() },
        )
        .await
        .unwrap();

        let scans = db.recent_scans(repo_id, 10).await.unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].1, 1);
    }
}
