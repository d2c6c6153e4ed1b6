use thiserror::Error;

/// Failures of the durable storage medium.
///
/// These never escape the state store: callers log them and keep the
/// in-memory value for the current cycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The medium is disabled or was never available
    #[error("storage medium unavailable")]
    Unavailable,

    #[error("storage quota exceeded writing {key} ({needed} bytes, limit {limit})")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    #[error("storage I/O error: {0}")]
    Io(String),

    #[error("failed to serialize state: {0}")]
    Serialize(String),
}

/// Wire payloads that could not be decoded into a command.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config must list at least one display")]
    NoDisplays,

    #[error("display {0} is listed more than once")]
    DuplicateDisplay(String),

    #[error("default slide duration must be at least one second")]
    InvalidSlideDuration,
}

/// Identity resolution failures, the only errors shown to the operator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BootstrapError {
    #[error("display {0} is not configured")]
    UnknownDisplay(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("display {0} is not configured")]
    UnknownDisplay(String),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
