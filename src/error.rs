use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to callers of the harvester, store and read facade.
///
/// Provider failures never show up here: the fetch adapter turns them into
/// `None` (see [`crate::espn::client::FetchError`]).
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("unknown league '{0}' (supported: nba, nhl, nfl, mlb)")]
    UnknownLeague(String),

    #[error("unknown data type '{0}'")]
    UnknownDataType(String),

    #[error("invalid date '{0}', expected YYYYMMDD")]
    InvalidDate(String),

    #[error("storage failure at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("sqlite mirror failure: {0}")]
    Mirror(#[from] rusqlite::Error),

    #[error("store write task failed: {0}")]
    WriteTask(#[from] tokio::task::JoinError),
}

impl HarvestError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
