use std::path::PathBuf;

/// Core error type for the relay.
///
/// Adapter crates map their transport errors into `External` so the engine can
/// decide between degrading (copy fallback) and logging.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corrupt document {path}: {reason}")]
    Document { path: PathBuf, reason: String },

    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
