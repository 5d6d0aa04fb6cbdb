use earshot_voicedb::EmbeddingModelSpec;

use crate::diarize::Diarization;
use crate::error::DiarizeError;
use crate::waveform::Waveform;

/// Computes a fixed-dimension voice fingerprint from raw audio.
///
/// Implementations wrap external pretrained models; the pipeline never
/// touches model loading or deserialization. A handle is constructed once
/// and passed by reference, so two backends can run side by side for
/// comparison.
///
/// # Contract
///
/// - Deterministic for identical audio and model identity.
/// - Must error on malformed or too-short audio, never return a zero
///   vector.
/// - Output length equals `model().embedding_dim`.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait EmbeddingExtractor: Send + Sync {
    /// Identity of the wrapped model; scopes every stored sample.
    fn model(&self) -> &EmbeddingModelSpec;

    /// Computes a speaker embedding for the whole waveform.
    fn extract(&self, audio: &Waveform) -> Result<Vec<f32>, DiarizeError>;

    fn dimension(&self) -> usize {
        self.model().embedding_dim
    }
}

/// Segments a recording into speaker turns with anonymous labels.
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait Diarizer: Send + Sync {
    /// Runs diarization, optionally hinted with the expected speaker
    /// count.
    fn diarize(
        &self,
        audio: &Waveform,
        num_speakers: Option<usize>,
    ) -> Result<Diarization, DiarizeError>;
}
