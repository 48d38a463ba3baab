/// Failures from the remote catalog. These travel through the query cache
/// as the `error` field of a [`crate::cache::QueryState`], never as a panic.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("http status {status}")]
    Http { status: u16 },
    #[error("event not found")]
    NotFound,
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Network and HTTP failures are worth re-issuing the same query for;
    /// a missing entity is terminal for that interaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Surfaced synchronously to the caller of [`crate::auth::authenticate`],
/// never stored as async query state.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid email or password")]
    InvalidCredentials,
}
