use thiserror::Error;

pub type TreliqResult<T> = Result<T, TreliqError>;

/// Top-level error. Variants line up with the error-kind table: `ConfigInvalid`
/// maps to `Config`, `UpstreamTransient`/`UpstreamFatal` surface through
/// `Host`/`Llm` (the child crates already collapse the HTTP-status triage),
/// everything else is contained at the stage boundary and never reaches here.
#[derive(Debug, Error)]
pub enum TreliqError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Host(#[from] host_client::Error),

    #[error(transparent)]
    Llm(#[from] llm_service::Error),

    #[error("storage error: {0}")]
    Storage(#[from] storage::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TreliqError {
    /// CLI exit code: 1 config, 2 upstream, 3 internal.
    pub fn exit_code(&self) -> i32 {
        match self {
            TreliqError::Config(_) => 1,
            TreliqError::Host(_) | TreliqError::Llm(_) => 2,
            TreliqError::Storage(_) | TreliqError::Internal(_) => 3,
        }
    }
}
