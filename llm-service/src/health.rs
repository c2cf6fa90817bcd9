//! Resilient health probing: `check()` never errors, converting every
//! failure into a `HealthStatus { ok: false, .. }`.

use serde::Serialize;

use crate::provider::{GenerateOpts, ProviderAdapter};

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub provider: String,
    pub ok: bool,
    pub detail: Option<String>,
}

pub async fn check(adapter: &ProviderAdapter) -> HealthStatus {
    let provider = format!("{:?}", adapter.kind());
    match adapter
        .generate_text("ping", GenerateOpts { temperature: 0.0, max_tokens: 4 })
        .await
    {
        Ok(_) => HealthStatus {
            provider,
            ok: true,
            detail: None,
        },
        Err(e) => HealthStatus {
            provider,
            ok: false,
            detail: Some(e.to_string()),
        },
    }
}

pub async fn check_many(adapters: &[&ProviderAdapter]) -> Vec<HealthStatus> {
    let mut out = Vec::with_capacity(adapters.len());
    for adapter in adapters {
        out.push(check(adapter).await);
    }
    out
}
