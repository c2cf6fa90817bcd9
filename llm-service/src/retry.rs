//! Exponential backoff around a `ProviderAdapter`, differentiating
//! retryable statuses from fatal ones.

use std::time::Duration;

use tracing::warn;

use crate::errors::{Error, LlmResult, ProviderError};
use crate::provider::{GenerateOpts, ProviderAdapter};

pub struct RetryWrapper<'a> {
    adapter: &'a ProviderAdapter,
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    on_throttle: Option<Box<dyn Fn() + Send + Sync + 'a>>,
}

impl<'a> RetryWrapper<'a> {
    pub fn new(adapter: &'a ProviderAdapter, base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        RetryWrapper {
            adapter,
            base_delay,
            max_delay,
            max_attempts,
            on_throttle: None,
        }
    }

    /// Invoked once per observed 429, used by the orchestrator to call
    /// `ConcurrencyGate::throttle`.
    pub fn on_throttle<F: Fn() + Send + Sync + 'a>(mut self, f: F) -> Self {
        self.on_throttle = Some(Box::new(f));
        self
    }

    pub async fn generate_text(&self, prompt: &str, opts: GenerateOpts) -> LlmResult<String> {
        self.run(|| self.adapter.generate_text(prompt, opts)).await
    }

    pub async fn generate_embedding(&self, text: &str) -> LlmResult<Vec<f32>> {
        self.run(|| self.adapter.generate_embedding(text)).await
    }

    async fn run<F, Fut, T>(&self, mut f: F) -> LlmResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = LlmResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let provider_err = match &e {
                        Error::Provider(pe) => Some(pe),
                        _ => None,
                    };
                    let retryable = provider_err.map(ProviderError::is_retryable).unwrap_or(false);
                    if !retryable || attempt >= self.max_attempts {
                        return Err(e);
                    }
                    if let Some(ProviderError::RateLimited { .. }) = provider_err {
                        if let Some(cb) = &self.on_throttle {
                            cb();
                        }
                    }
                    let retry_after = provider_err.and_then(ProviderError::retry_after_secs);
                    let delay = match retry_after {
                        Some(secs) => Duration::from_secs(secs),
                        None => {
                            let backoff = self.base_delay.saturating_mul(1 << attempt.min(16));
                            backoff.min(self.max_delay)
                        }
                    };
                    warn!(attempt, ?delay, error = %e, "retrying after transient provider failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Never-retried statuses per the error taxonomy.
pub fn is_fatal_status(status: u16) -> bool {
    matches!(status, 400 | 401 | 403 | 404 | 422)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_statuses_are_exact() {
        for s in [400, 401, 403, 404, 422] {
            assert!(is_fatal_status(s));
        }
        for s in [200, 429, 500, 503] {
            assert!(!is_fatal_status(s));
        }
    }
}
