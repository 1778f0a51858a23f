//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Master returned {status} for {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },
}
