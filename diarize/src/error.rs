use thiserror::Error;

use earshot_voiceid::VoiceIdError;

/// Errors returned by the diarization bridge.
#[derive(Debug, Error)]
pub enum DiarizeError {
    /// Required backend or external tool unavailable. Fatal, no retry.
    #[error("configuration: {0}")]
    Configuration(String),

    #[error("audio: {0}")]
    Audio(String),

    #[error("missing audio file: {0}")]
    MissingAudio(String),

    /// The external embedding call failed for one sub-segment.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The external diarization call failed.
    #[error("diarization failed: {0}")]
    Diarization(String),

    #[error(transparent)]
    Identify(#[from] VoiceIdError),
}
