use thiserror::Error;

use earshot_voicedb::VoiceDbError;

/// Errors returned by library operations.
#[derive(Debug, Error)]
pub enum VoiceIdError {
    #[error("store error: {0}")]
    Store(#[from] VoiceDbError),

    #[error("embedding must not be empty")]
    EmptyEmbedding,
}
