use thiserror::Error;

/// Errors returned by voice store operations.
#[derive(Debug, Error)]
pub enum VoiceDbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot format: {0}")]
    SnapshotFormat(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("backend mismatch: requested {requested}, store holds {found}")]
    BackendMismatch { requested: String, found: String },

    #[error("unknown sample type: {0}")]
    UnknownSampleType(String),

    #[error("unknown sample source: {0}")]
    UnknownSampleSource(String),

    #[error("sample not found: {0}")]
    SampleNotFound(i64),

    #[error("operation not supported by this store: {0}")]
    Unsupported(&'static str),
}
