/// Failures reading or writing the durable selection snapshot.
///
/// These never escape the selection store: reads degrade to an empty set and
/// failed writes are logged while the in-memory state stays authoritative.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage read failed: {0}")]
    Read(String),
    #[error("storage write failed: {0}")]
    Write(String),
}

/// Failures loading the product catalog. Always surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog transport error: {0}")]
    Transport(String),
    #[error("catalog parse error: {0}")]
    Parse(String),
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CatalogError::Parse(err.to_string())
        } else {
            CatalogError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Parse(err.to_string())
    }
}

/// Outcome of a failed completion exchange with the relay.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompletionError {
    #[error("unable to reach the chat service: {0}")]
    Transport(String),
    #[error("chat service returned {0}: {1}")]
    Remote(u16, String),
    #[error("chat service returned no message")]
    MalformedResponse,
}
