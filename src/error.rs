use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("Database error")]
    DatabaseError(#[from] sqlx::error::Error),

    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error")]
    Serialization(#[from] serde_json::Error),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Page contract broken: {0}")]
    Malformed(#[from] ExtractError),

    #[error("Page {page} still failing after {attempts} attempts: {last}")]
    PageRetriesExhausted {
        page: String,
        attempts: u32,
        last: FetchError,
    },

    #[error("Unknown topic {topic:?} for {site}")]
    UnknownTopic { site: String, topic: String },
}

impl CrawlerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CrawlerError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Classified outcome of a failed request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("not found")]
    NotFound,

    /// Non-200 status (`Some`) or a network-level failure (`None`).
    #[error("transient failure (status {0:?})")]
    Transient(Option<u16>),

    #[error("fatal: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid JSON payload")]
    Json(#[from] serde_json::Error),

    #[error("unexpected page structure: {0}")]
    Structure(String),
}
