use thiserror::Error;

/// Error taxonomy for the retrieval core.
///
/// Library code returns `Result<_, RagError>`; the CLI and HTTP layers map
/// these onto exit codes and response status codes. Oversized single texts
/// are deliberately absent from most signatures — the embedding client
/// swallows them into placeholder vectors and only logs the condition.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("input exceeds the upstream token budget: {0}")]
    OversizedInput(String),

    #[error("embedding dimension mismatch: got {got}, expected {expected}")]
    DimensionMismatch { got: usize, expected: usize },

    #[error("storage failure: {0}")]
    StorageFault(String),
}

impl From<tokio_rusqlite::Error> for RagError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        RagError::StorageFault(err.to_string())
    }
}

impl From<rusqlite::Error> for RagError {
    fn from(err: rusqlite::Error) -> Self {
        RagError::StorageFault(err.to_string())
    }
}

impl From<reqwest::Error> for RagError {
    fn from(err: reqwest::Error) -> Self {
        RagError::UpstreamUnavailable(err.to_string())
    }
}
