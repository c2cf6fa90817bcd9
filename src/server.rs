//! Webhook + health router. A minimal `axum` surface dispatching
//! `POST /webhooks` into the scan pipeline and exposing `GET /health`,
//! shaped after the teacher's `AppError`/JSON-envelope pattern without
//! reproducing its full route tree.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use llm_service::ProviderAdapter;
use scorer::{Scorer, ScorerConfig};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use storage::Db;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::errors::TreliqError;
use crate::settings::Settings;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
struct ServerState {
    webhook_secret: Arc<String>,
    repos: Arc<Vec<String>>,
    settings: Arc<Settings>,
    provider: ProviderAdapter,
    db: Option<Db>,
}

impl ServerState {
    /// Fetches, scores, and (if a database is configured) persists a single
    /// PR. Mirrors the `score`/`Scan` CLI paths but scoped to one PR instead
    /// of a whole repo listing.
    async fn score_and_store(&self, repo: &str, number: i64) -> crate::errors::TreliqResult<()> {
        let host = self.settings.host_client(repo).await?;
        let records = host.fetch_details(repo, &[number]).await?;
        let record = records
            .into_iter()
            .next()
            .ok_or_else(|| TreliqError::Internal(format!("PR #{number} not found in {repo}")))?;

        let scorer = Scorer::new(ScorerConfig::default(), Some(self.provider.clone()));
        let item = scorer.score(record).await;

        if let Some(db) = &self.db {
            let (owner, name) = host_client::github::split_owner_repo(repo)?;
            let repo_id = db.upsert_repository(&owner, &name).await?;
            db.upsert_scored_item(repo_id, &item, "webhook").await?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

struct ServerError(StatusCode, &'static str, String);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1, message: self.2 })).into_response()
    }
}

impl From<TreliqError> for ServerError {
    fn from(e: TreliqError) -> Self {
        let status = match e.exit_code() {
            1 => StatusCode::BAD_REQUEST,
            2 => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ServerError(status, "TRELIQ_ERROR", e.to_string())
    }
}

pub async fn serve(
    port: u16,
    webhook_secret: String,
    repos: Vec<String>,
    settings: Settings,
    provider: ProviderAdapter,
    db: Option<Db>,
) -> crate::errors::TreliqResult<()> {
    let state = ServerState {
        webhook_secret: Arc::new(webhook_secret),
        repos: Arc::new(repos),
        settings: Arc::new(settings),
        provider,
        db,
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/webhooks", post(webhooks))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| TreliqError::Internal(format!("failed to bind :{port}: {e}")))?;
    info!(port, "treliq webhook server listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| TreliqError::Internal(format!("server error: {e}")))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    action: String,
    repository: RepoRef,
    number: i64,
}

#[derive(Debug, Deserialize)]
struct InstallationPayload {
    action: String,
}

#[derive(Debug, Deserialize)]
struct RepoRef {
    full_name: String,
}

async fn webhooks(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, ServerError> {
    verify_signature(&headers, &body, &state.webhook_secret)?;

    let event = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    match event.as_str() {
        "ping" => Ok(Json(serde_json::json!({ "message": "pong" })).into_response()),
        "pull_request" => {
            let payload: PullRequestPayload = serde_json::from_slice(&body)
                .map_err(|e| ServerError(StatusCode::BAD_REQUEST, "BAD_PAYLOAD", e.to_string()))?;
            if !matches!(payload.action.as_str(), "opened" | "synchronize" | "reopened" | "closed") {
                return Ok(StatusCode::OK.into_response());
            }
            if !state.repos.is_empty() && !state.repos.contains(&payload.repository.full_name) {
                return Ok(StatusCode::OK.into_response());
            }
            info!(repo = %payload.repository.full_name, number = payload.number, action = %payload.action, "pull_request webhook accepted");
            if let Err(e) = state.score_and_store(&payload.repository.full_name, payload.number).await {
                warn!(
                    error = %e,
                    repo = %payload.repository.full_name,
                    number = payload.number,
                    "failed to score pull_request webhook"
                );
            }
            Ok(Json(serde_json::json!({ "accepted": true })).into_response())
        }
        "installation" => {
            let payload: InstallationPayload = serde_json::from_slice(&body)
                .map_err(|e| ServerError(StatusCode::BAD_REQUEST, "BAD_PAYLOAD", e.to_string()))?;
            if !matches!(payload.action.as_str(), "created" | "deleted" | "suspend" | "unsuspend") {
                return Ok(StatusCode::OK.into_response());
            }
            info!(action = %payload.action, "installation webhook accepted");
            Ok(Json(serde_json::json!({ "accepted": true })).into_response())
        }
        other => {
            warn!(event = other, "unrecognized webhook event, ignoring");
            Ok((StatusCode::OK, Json(serde_json::json!({ "ignored": true }))).into_response())
        }
    }
}

/// HMAC-SHA256 over the raw body against `x-hub-signature-256`, constant-time.
/// Never leaks *why* verification failed beyond a generic 401.
fn verify_signature(headers: &HeaderMap, body: &[u8], secret: &str) -> Result<(), ServerError> {
    let unauthorized = || ServerError(StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE", "Invalid signature".to_string());

    let header = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(unauthorized)?;
    let hex_sig = header.strip_prefix("sha256=").ok_or_else(unauthorized)?;
    let expected = decode_hex(hex_sig).ok_or_else(unauthorized)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| unauthorized())?;
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    if computed.as_slice().ct_eq(&expected).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn signed_headers(secret: &str, body: &[u8]) -> HeaderMap {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = mac.finalize().into_bytes();
        let hex_sig: String = sig.iter().map(|b| format!("{b:02x}")).collect();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-hub-signature-256",
            HeaderValue::from_str(&format!("sha256={hex_sig}")).unwrap(),
        );
        headers
    }

    #[test]
    fn verify_signature_accepts_matching_hmac() {
        let body = br#"{"action":"opened"}"#;
        let headers = signed_headers("s3cr3t", body);
        assert!(verify_signature(&headers, body, "s3cr3t").is_ok());
    }

    #[test]
    fn verify_signature_rejects_wrong_secret() {
        let body = br#"{"action":"opened"}"#;
        let headers = signed_headers("s3cr3t", body);
        assert!(verify_signature(&headers, body, "different").is_err());
    }

    #[test]
    fn verify_signature_rejects_tampered_body() {
        let body = br#"{"action":"opened"}"#;
        let headers = signed_headers("s3cr3t", body);
        assert!(verify_signature(&headers, b"{\"action\":\"closed\"}", "s3cr3t").is_err());
    }

    #[test]
    fn verify_signature_rejects_missing_header() {
        let headers = HeaderMap::new();
        assert!(verify_signature(&headers, b"{}", "s3cr3t").is_err());
    }

    #[test]
    fn decode_hex_rejects_odd_length() {
        assert_eq!(decode_hex("abc"), None);
    }

    #[test]
    fn decode_hex_round_trips() {
        assert_eq!(decode_hex("deadbeef"), Some(vec![0xde, 0xad, 0xbe, 0xef]));
    }
}
