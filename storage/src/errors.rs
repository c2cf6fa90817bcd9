use thiserror::Error;

pub type DbResult<T> = Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database connection failed: {0}")]
    Connect(String),
    #[error("schema migration failed: {0}")]
    Migration(String),
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
}
