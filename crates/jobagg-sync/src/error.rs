use jobagg_core::UnknownMatchMode;
use thiserror::Error;

/// Configuration problems that stop a run before any adapter is invoked.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unknown source `{requested}` (configured: {})", .available.join(", "))]
    UnknownSource {
        requested: String,
        available: Vec<String>,
    },
    #[error(transparent)]
    InvalidMode(#[from] UnknownMatchMode),
    #[error("configuration error: {0}")]
    Config(String),
}
