//! Diarization bridge: turns `(raw audio, speaker-labeled time ranges)`
//! into an identity mapping usable for transcript annotation.
//!
//! # Pipeline
//!
//! 1. An external [`Diarizer`] segments the recording into anonymous
//!    labeled turns ([`Diarization`]).
//! 2. [`identify_speakers_in_diarization`] picks each label's longest
//!    turns, extracts an embedding per usable sub-segment via an external
//!    [`EmbeddingExtractor`], averages them, and matches the result
//!    against the voice library.
//! 3. [`align_with_turns`] stamps each transcript segment with the
//!    diarization label covering its temporal midpoint.
//!
//! Embedding extraction and diarization are external capabilities behind
//! traits; this crate contains no model code. The pipeline is synchronous
//! and single-threaded per episode: inference is compute-bound and
//! parallelizing labels would multiply peak memory.

mod align;
mod bridge;
mod diarize;
mod error;
mod extractor;
mod waveform;

pub use align::{TranscriptSegment, align_with_turns};
pub use bridge::{
    CompareReport, LabelComparison, LabelMatch, MAX_TURNS_PER_LABEL, MIN_TURN_SECS,
    compare_backends, identify_speakers_in_diarization,
};
pub use diarize::{Diarization, Turn, UNKNOWN_SPEAKER};
pub use error::DiarizeError;
pub use extractor::{Diarizer, EmbeddingExtractor};
pub use waveform::Waveform;
