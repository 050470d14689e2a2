use std::path::PathBuf;

/// Errors raised by the job store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job file exists but is not a valid job document.
    #[error("Malformed job {id}: {source}")]
    MalformedJob {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The results artifact could not be serialized.
    #[error("Failed to encode results for {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
