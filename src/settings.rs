//! Environment-driven configuration. Fatal (`ConfigInvalid`) on missing
//! required variables — the CLI surfaces the failing variable name and
//! exits 1 before any network I/O happens.

use std::path::PathBuf;

use host_client::{HostClient, ProviderConfig};
use llm_service::{HttpProvider, ProviderAdapter, ProviderKind};
use reqwest::Client;

use crate::errors::{TreliqError, TreliqResult};
use crate::github_app::GitHubAppAuth;

#[derive(Debug, Clone)]
pub enum GitHubAuth {
    Pat(String),
    App(GitHubAppAuth),
}

pub struct Settings {
    pub github_auth: GitHubAuth,
    pub github_webhook_secret: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub log_level: String,
    pub is_production: bool,
}

impl Settings {
    /// Presence of `GITHUB_APP_ID` selects app mode over PAT mode.
    pub fn from_env() -> TreliqResult<Self> {
        let github_auth = if let Ok(app_id) = std::env::var("GITHUB_APP_ID") {
            let private_key = resolve_private_key()?;
            let app_id: u64 = app_id
                .parse()
                .map_err(|_| TreliqError::Config("GITHUB_APP_ID must be a positive integer".into()))?;
            GitHubAuth::App(GitHubAppAuth::new(app_id, private_key))
        } else {
            let token = std::env::var("GITHUB_TOKEN")
                .map_err(|_| TreliqError::Config("GITHUB_TOKEN is required in PAT mode".into()))?;
            GitHubAuth::Pat(token)
        };

        if matches!(github_auth, GitHubAuth::App(_)) && std::env::var("GITHUB_WEBHOOK_SECRET").is_err() {
            return Err(TreliqError::Config(
                "GITHUB_WEBHOOK_SECRET is required alongside GITHUB_APP_ID".into(),
            ));
        }

        Ok(Settings {
            github_auth,
            github_webhook_secret: std::env::var("GITHUB_WEBHOOK_SECRET").ok(),
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            openrouter_api_key: std::env::var("OPENROUTER_API_KEY").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            is_production: std::env::var("NODE_ENV").map(|v| v == "production").unwrap_or(false),
        })
    }

    /// Builds a `HostClient` for PAT mode directly, or for app mode via the
    /// JWT → installation-token exchange scoped to `repo`.
    pub async fn host_client(&self, repo: &str) -> TreliqResult<HostClient> {
        let token = match &self.github_auth {
            GitHubAuth::Pat(t) => t.clone(),
            GitHubAuth::App(app) => app.installation_token_for_repo(repo).await?,
        };
        HostClient::from_config(ProviderConfig::github(token)).map_err(TreliqError::from)
    }

    /// Resolves `--provider`/`--model` to a concrete adapter. `ollama`
    /// needs no key (local daemon); every other vendor requires its key to
    /// be present in the environment.
    pub fn provider_adapter(&self, provider: &str, model: Option<&str>) -> TreliqResult<ProviderAdapter> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| TreliqError::Internal(e.to_string()))?;

        let (kind, base_url, api_key, default_model, embedding_model) = match provider {
            "ollama" => (ProviderKind::Ollama, "http://localhost:11434".to_string(), None, "llama3.1", "nomic-embed-text"),
            "openai" => (
                ProviderKind::OpenAi,
                "https://api.openai.com/v1".to_string(),
                Some(require_key("OPENAI_API_KEY", &self.openai_api_key)?),
                "gpt-4o-mini",
                "text-embedding-3-small",
            ),
            "anthropic" => (
                ProviderKind::Anthropic,
                "https://api.anthropic.com".to_string(),
                Some(require_key("ANTHROPIC_API_KEY", &self.anthropic_api_key)?),
                "claude-3-5-sonnet-latest",
                "",
            ),
            "openrouter" => (
                ProviderKind::OpenRouter,
                "https://openrouter.ai/api/v1".to_string(),
                Some(require_key("OPENROUTER_API_KEY", &self.openrouter_api_key)?),
                "openrouter/auto",
                "",
            ),
            "gemini" => (
                ProviderKind::Gemini,
                "https://generativelanguage.googleapis.com".to_string(),
                Some(require_key("GEMINI_API_KEY", &self.gemini_api_key)?),
                "gemini-1.5-flash",
                "text-embedding-004",
            ),
            other => return Err(TreliqError::Config(format!("unknown provider '{other}'"))),
        };

        let primary = HttpProvider {
            kind,
            http: http.clone(),
            base_url,
            api_key,
            model: model.unwrap_or(default_model).to_string(),
            embedding_model: embedding_model.to_string(),
        };

        let fallback = if kind.has_native_embedding() {
            None
        } else {
            Some(HttpProvider {
                kind: ProviderKind::Ollama,
                http,
                base_url: "http://localhost:11434".to_string(),
                api_key: None,
                model: "llama3.1".to_string(),
                embedding_model: "nomic-embed-text".to_string(),
            })
        };

        ProviderAdapter::new(primary, fallback).map_err(TreliqError::from)
    }
}

fn require_key(name: &'static str, value: &Option<String>) -> TreliqResult<String> {
    value.clone().ok_or_else(|| TreliqError::Config(format!("{name} is required for this provider")))
}

fn resolve_private_key() -> TreliqResult<String> {
    if let Ok(key) = std::env::var("GITHUB_PRIVATE_KEY") {
        return Ok(key);
    }
    let path = std::env::var("GITHUB_PRIVATE_KEY_PATH")
        .map_err(|_| TreliqError::Config("GITHUB_PRIVATE_KEY or GITHUB_PRIVATE_KEY_PATH is required in app mode".into()))?;
    std::fs::read_to_string(PathBuf::from(&path))
        .map_err(|e| TreliqError::Config(format!("cannot read GITHUB_PRIVATE_KEY_PATH '{path}': {e}")))
}
