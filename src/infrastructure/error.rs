use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Remote HTTP error: {0}")]
    RemoteHttp(String),
    #[error("Remote backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Local store corrupt: {0}")]
    LocalStoreCorrupt(String),
    #[error("Local store write failed: {0}")]
    LocalStoreWrite(String),
    #[error("Remote operation failed: {0}")]
    RemoteOperationFailed(String),
}
