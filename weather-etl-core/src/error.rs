use thiserror::Error;

/// Failures of the blob store seam.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object '{key}' not found")]
    NotFound { key: String },

    #[error("write of '{key}' rejected: {reason}")]
    Rejected { key: String, reason: String },

    #[error("store backend error: {0}")]
    Backend(#[from] object_store::Error),

    #[error("invalid store configuration: {0}")]
    Config(String),
}

/// Failures of a single weather fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("weather endpoint returned status {status} for '{location}'")]
    Status {
        location: String,
        status: reqwest::StatusCode,
    },

    #[error("request for '{location}' failed: {source}")]
    Transport {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("response for '{location}' is not valid JSON: {source}")]
    Decode {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Whether the failure only concerns this one location and the batch
    /// should carry on without it.
    pub fn is_item_local(&self) -> bool {
        matches!(self, FetchError::Status { .. } | FetchError::Transport { .. })
    }
}

/// Failures that abort a whole stage run.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error("no objects found under prefix '{prefix}'")]
    NotFound { prefix: String },

    #[error("malformed raw batch: {0}")]
    MalformedInput(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },
}

pub type Result<T, E = EtlError> = std::result::Result<T, E>;
