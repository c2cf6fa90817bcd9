//! Thin `clap` shell: parses the argument surface from the collaborator
//! contract and dispatches into `Settings`/`ScanOrchestrator`. No business
//! logic lives here beyond formatting.

use clap::{Parser, Subcommand};
use core_types::ScoredItem;
use tracing::error;

use crate::errors::{TreliqError, TreliqResult};
use crate::orchestrator::{ScanOptions, ScanOrchestrator};
use crate::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "treliq", about = "PR/issue triage pipeline", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full scan pipeline against a repository.
    Scan {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        token: Option<String>,
        #[arg(long, default_value = "ollama")]
        provider: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        vision: Option<String>,
        #[arg(long, default_value = "table")]
        format: OutputFormat,
        #[arg(long, default_value_t = 100)]
        max: usize,
        #[arg(long, default_value_t = false)]
        comment: bool,
        #[arg(long, default_value_t = false)]
        trust_contributors: bool,
        #[arg(long)]
        cache: Option<String>,
        #[arg(long, default_value_t = false)]
        no_cache: bool,
        #[arg(long)]
        db: Option<String>,
    },
    /// Score a single PR.
    Score {
        #[arg(long)]
        repo: String,
        #[arg(long)]
        pr: i64,
        #[arg(long, default_value = "ollama")]
        provider: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Pairwise-cluster a given set of PRs.
    Compare {
        #[arg(long)]
        repo: String,
        #[arg(long, num_args = 1..)]
        pr: Vec<i64>,
        #[arg(long, default_value = "ollama")]
        provider: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Dedup-only output for the repository's open PRs.
    Dedup {
        #[arg(long)]
        repo: String,
        #[arg(long, default_value = "ollama")]
        provider: String,
        #[arg(long)]
        model: Option<String>,
    },
    /// Close everything the spam heuristic flags.
    CloseSpam {
        #[arg(long)]
        repo: String,
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// Apply intent labels derived from scoring.
    LabelByScore {
        #[arg(long)]
        repo: String,
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
    /// Run the webhook + health server.
    Server {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[arg(long)]
        webhook_secret: Option<String>,
        #[arg(long)]
        schedule: Option<String>,
        #[arg(long, value_delimiter = ',')]
        repos: Vec<String>,
        #[arg(long, default_value = "ollama")]
        provider: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        db: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Markdown,
}

pub async fn run(cli: Cli) -> TreliqResult<()> {
    let settings = Settings::from_env()?;

    match cli.command {
        Command::Scan {
            repo,
            token,
            provider,
            model,
            vision,
            format,
            max,
            comment,
            trust_contributors,
            cache,
            no_cache,
            db,
        } => {
            if let Some(dir) = cache.as_deref() {
                unsafe { std::env::set_var("TRELIQ_CACHE_DIR", dir) };
            }
            let host = match token {
                Some(t) => host_client::HostClient::from_config(host_client::ProviderConfig::github(t))
                    .map_err(TreliqError::from)?,
                None => settings.host_client(&repo).await?,
            };
            let adapter = settings.provider_adapter(&provider, model.as_deref())?;
            let db_handle = match db.as_deref() {
                Some(path) => Some(storage::Db::open(path).await.map_err(TreliqError::from)?),
                None => None,
            };

            let mut orchestrator = ScanOrchestrator::new(&host).with_provider(&adapter);
            if let Some(db) = &db_handle {
                orchestrator = orchestrator.with_db(db);
            }

            let opts = ScanOptions {
                repo: repo.clone(),
                max,
                trust_contributors,
                vision_doc_path: vision,
                use_cache: !no_cache,
                ..ScanOptions::default()
            };
            let result = orchestrator.scan(&opts).await.map_err(TreliqError::from)?;

            render(&result.ranked_items, format);
            println!("{}", result.summary);

            if comment {
                for item in &result.ranked_items {
                    if item.is_spam {
                        let _ = host
                            .add_comment(&repo, item.number(), "Flagged as likely spam by automated triage.")
                            .await;
                    }
                }
            }
            Ok(())
        }
        Command::Score { repo, pr, provider, model } => {
            let host = settings.host_client(&repo).await?;
            let adapter = settings.provider_adapter(&provider, model.as_deref())?;
            let records = host.fetch_details(&repo, &[pr]).await.map_err(TreliqError::from)?;
            let record = records
                .into_iter()
                .next()
                .ok_or_else(|| TreliqError::Internal(format!("PR #{pr} not found")))?;
            let scorer = scorer::Scorer::new(scorer::ScorerConfig::default(), Some(adapter));
            let scored = scorer.score(record).await;
            render(std::slice::from_ref(&scored), OutputFormat::Table);
            Ok(())
        }
        Command::Compare { repo, pr, provider, model } => {
            let host = settings.host_client(&repo).await?;
            let adapter = settings.provider_adapter(&provider, model.as_deref())?;
            let records = host.fetch_details(&repo, &pr).await.map_err(TreliqError::from)?;
            let scorer = scorer::Scorer::new(scorer::ScorerConfig::default(), Some(adapter.clone()));
            let gate = concurrency::ConcurrencyGate::new(4, 1, std::time::Duration::from_millis(200));
            let mut items = scorer.score_many(records, &gate).await;
            let clusters = dedup_engine::DedupEngine::find_duplicates(&mut items, Some(&adapter), None, 0.85, true, &gate).await;
            for cluster in &clusters {
                println!(
                    "cluster #{}: members={:?} best={} avg_similarity={:.2}",
                    cluster.id,
                    cluster.numbers(),
                    cluster.best_member_number,
                    cluster.avg_similarity
                );
            }
            if clusters.is_empty() {
                println!("no duplicate relationship found among {:?}", pr);
            }
            Ok(())
        }
        Command::Dedup { repo, provider, model } => {
            let host = settings.host_client(&repo).await?;
            let adapter = settings.provider_adapter(&provider, model.as_deref())?;
            let summaries = host.list_open(&repo, 100).await.map_err(TreliqError::from)?;
            let numbers: Vec<i64> = summaries.iter().map(|s| s.number).collect();
            let records = host.fetch_details(&repo, &numbers).await.map_err(TreliqError::from)?;
            let scorer = scorer::Scorer::new(scorer::ScorerConfig::default(), Some(adapter.clone()));
            let gate = concurrency::ConcurrencyGate::new(8, 2, std::time::Duration::from_millis(200));
            let mut items = scorer.score_many(records, &gate).await;
            let clusters = dedup_engine::DedupEngine::find_duplicates(&mut items, Some(&adapter), None, 0.85, true, &gate).await;
            for cluster in &clusters {
                println!("cluster #{}: {:?} (best #{})", cluster.id, cluster.numbers(), cluster.best_member_number);
            }
            Ok(())
        }
        Command::CloseSpam { repo, confirm } => {
            let host = settings.host_client(&repo).await?;
            let summaries = host.list_open(&repo, 100).await.map_err(TreliqError::from)?;
            let numbers: Vec<i64> = summaries.iter().map(|s| s.number).collect();
            let records = host.fetch_details(&repo, &numbers).await.map_err(TreliqError::from)?;
            let scorer = scorer::Scorer::new(scorer::ScorerConfig::default(), None);
            let gate = concurrency::ConcurrencyGate::new(8, 2, std::time::Duration::from_millis(200));
            let items = scorer.score_many(records, &gate).await;
            let plan = action_planner::ActionPlanner::plan(&items, &[], &action_planner::PlannerConfig::default());
            if !confirm {
                println!("{} PR(s) would be closed as spam (pass --confirm to execute):", plan.close_spam.len());
                for action in &plan.close_spam {
                    println!("  #{} — {}", action.target, action.reason);
                }
                return Ok(());
            }
            let executor = action_planner::Executor::new(&host, &repo);
            let results = executor.execute_all(plan.close_spam).await;
            for r in results {
                println!("#{}: {:?} — {}", r.action.target, r.outcome, r.reason);
            }
            Ok(())
        }
        Command::LabelByScore { repo, confirm } => {
            let host = settings.host_client(&repo).await?;
            let summaries = host.list_open(&repo, 100).await.map_err(TreliqError::from)?;
            let numbers: Vec<i64> = summaries.iter().map(|s| s.number).collect();
            let records = host.fetch_details(&repo, &numbers).await.map_err(TreliqError::from)?;
            let scorer = scorer::Scorer::new(scorer::ScorerConfig::default(), None);
            let gate = concurrency::ConcurrencyGate::new(8, 2, std::time::Duration::from_millis(200));
            let items = scorer.score_many(records, &gate).await;
            let plan = action_planner::ActionPlanner::plan(&items, &[], &action_planner::PlannerConfig::default());
            if !confirm {
                println!("{} label action(s) pending (pass --confirm to execute):", plan.label_intent.len());
                for action in &plan.label_intent {
                    println!("  #{} -> {}", action.target, action.label.clone().unwrap_or_default());
                }
                return Ok(());
            }
            let executor = action_planner::Executor::new(&host, &repo);
            let results = executor.execute_all(plan.label_intent).await;
            for r in results {
                println!("#{}: {:?} — {}", r.action.target, r.outcome, r.reason);
            }
            Ok(())
        }
        Command::Server { port, webhook_secret, schedule, repos, provider, model, db } => {
            let secret = webhook_secret
                .or_else(|| settings.github_webhook_secret.clone())
                .ok_or_else(|| TreliqError::Config("webhook secret required to start the server".into()))?;
            if let Some(cron) = &schedule {
                tracing::info!(cron, repos = ?repos, "periodic scan schedule configured (dispatch is external to this process)");
            }
            let adapter = settings.provider_adapter(&provider, model.as_deref())?;
            let db_handle = match db.as_deref() {
                Some(path) => Some(storage::Db::open(path).await.map_err(TreliqError::from)?),
                None => None,
            };
            crate::server::serve(port, secret, repos, settings, adapter, db_handle).await
        }
    }
}

fn render(items: &[ScoredItem], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(items).unwrap_or_else(|e| {
                error!(error = %e, "failed to serialize scan output");
                "[]".to_string()
            }));
        }
        OutputFormat::Markdown => {
            println!("| # | Score | Spam | Intent |");
            println!("|---|---|---|---|");
            for item in items {
                println!(
                    "| {} | {:.0} | {} | {} |",
                    item.number(),
                    item.total_score,
                    item.is_spam,
                    item.intent.map(|i| i.as_str().to_string()).unwrap_or_default()
                );
            }
        }
        OutputFormat::Table => {
            for item in items {
                println!(
                    "#{:<6} score={:<5.0} spam={:<5} intent={}",
                    item.number(),
                    item.total_score,
                    item.is_spam,
                    item.intent.map(|i| i.as_str().to_string()).unwrap_or_else(|| "-".to_string())
                );
            }
        }
    }
}
