//! Error hierarchy for `llm-service`, following the config-validation style
//! of an env-driven service: every message is specific enough to name the
//! offending variable or field.

use thiserror::Error;

pub type LlmResult<T> = Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("[LLM Service] missing required environment variable: {0}")]
    MissingVar(String),

    #[error("[LLM Service] unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("[LLM Service] provider '{0}' has no native embedding support and no embeddingFallback was configured")]
    MissingEmbeddingFallback(String),

    #[error("[LLM Service] embedding fallback provider '{0}' does not support embeddings either")]
    FallbackLacksEmbedding(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("server error: status {0}")]
    Server(u16),

    #[error("http status error: {0}")]
    HttpStatus(u16),

    #[error("timeout")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Server(_)
                | ProviderError::Timeout
                | ProviderError::Network(_)
        )
    }

    /// `Retry-After` seconds, if the provider supplied one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ProviderError::Timeout;
        }
        if let Some(status) = e.status() {
            let code = status.as_u16();
            return match code {
                401 => ProviderError::Unauthorized,
                403 => ProviderError::Forbidden,
                404 => ProviderError::NotFound,
                429 => ProviderError::RateLimited {
                    retry_after_secs: None,
                },
                500..=599 => ProviderError::Server(code),
                _ => ProviderError::HttpStatus(code),
            };
        }
        ProviderError::Network(e.to_string())
    }
}
