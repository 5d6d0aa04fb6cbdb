use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::VoiceDbError;

/// The only vector element type currently stored.
pub const DTYPE_F32: &str = "f32";

/// Per-centroid sample-date history bound: the most recent N dates are
/// kept, the oldest evicted first. Feeds temporal weighting at match time.
pub const MAX_SAMPLE_DATES: usize = 32;

/// Distinguishes ordinary speaker enrollment clips from short sound-bite
/// clips (catchphrases, recurring drops). Both share the same storage
/// machinery but aggregate into separate centroids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    #[default]
    Speaker,
    SoundBite,
}

impl SampleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Speaker => "speaker",
            Self::SoundBite => "sound_bite",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleType {
    type Err = VoiceDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "speaker" => Ok(Self::Speaker),
            "sound_bite" => Ok(Self::SoundBite),
            other => Err(VoiceDbError::UnknownSampleType(other.to_string())),
        }
    }
}

/// How a sample entered the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// Explicit "add speaker" call with a hand-picked clip.
    Manual,
    /// Harvested from a reviewed, diarized episode.
    Harvest,
    /// Captured automatically during segment review.
    Auto,
}

impl SampleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Harvest => "harvest",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for SampleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleSource {
    type Err = VoiceDbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "harvest" => Ok(Self::Harvest),
            "auto" => Ok(Self::Auto),
            other => Err(VoiceDbError::UnknownSampleSource(other.to_string())),
        }
    }
}

/// Identity of one embedding backend version.
///
/// A changed configuration (new model id, new dimension, new version tag)
/// is a *new* model identity; existing rows are never mutated, so samples
/// recorded under an older configuration stay interpretable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbeddingModelSpec {
    /// Embedding-model family, e.g. "pyannote" or "ecapa-tdnn".
    pub backend: String,
    /// Concrete pretrained model identifier, e.g. "pyannote/embedding".
    pub model_id: String,
    /// Fixed output vector dimension.
    pub embedding_dim: usize,
    /// Vector element type (currently always [`DTYPE_F32`]).
    pub dtype: String,
    /// Free-form version marker, e.g. "3.1".
    pub version_tag: String,
}

impl EmbeddingModelSpec {
    pub fn new(backend: &str, model_id: &str, embedding_dim: usize, version_tag: &str) -> Self {
        Self {
            backend: backend.to_string(),
            model_id: model_id.to_string(),
            embedding_dim,
            dtype: DTYPE_F32.to_string(),
            version_tag: version_tag.to_string(),
        }
    }
}

/// A persisted embedding-model row.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingModelRecord {
    pub id: i64,
    pub spec: EmbeddingModelSpec,
    /// Only centroids of active models are returned by `load_centroids`.
    pub active: bool,
}

/// One embedding extracted from one audio clip, ready to be upserted.
#[derive(Debug, Clone)]
pub struct NewSample {
    pub model: EmbeddingModelSpec,
    pub speaker_name: String,
    pub sample_type: SampleType,
    pub episode_id: Option<i64>,
    pub segment_idx: Option<i64>,
    pub file_path: Option<String>,
    pub transcript_text: Option<String>,
    pub sample_date: Option<NaiveDate>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub external_id: Option<String>,
    pub source: SampleSource,
    pub embedding: Vec<f32>,
}

impl NewSample {
    /// Derives the unique sample key from provenance fields.
    ///
    /// The key is deterministic: re-extracting the same logical clip yields
    /// the same key, so a re-submission updates the stored vector in place
    /// instead of creating a duplicate row.
    pub fn sample_key(&self) -> String {
        let episode = self
            .episode_id
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let segment = self
            .segment_idx
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let range = match (self.start_time, self.end_time) {
            (Some(s), Some(e)) => format!("{s:.3}-{e:.3}"),
            _ => "-".to_string(),
        };
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.model.backend,
            self.speaker_name,
            self.sample_type,
            self.file_path.as_deref().unwrap_or("-"),
            episode,
            segment,
            range,
            self.external_id.as_deref().unwrap_or("-"),
        )
    }
}

/// Result of an upsert. `id` is `None` for stores without row ids.
#[derive(Debug, Clone, Serialize)]
pub struct StoredSample {
    pub id: Option<i64>,
    pub sample_key: String,
    /// False when an existing row was updated in place.
    pub created: bool,
}

/// The current best-estimate fingerprint for one speaker under one
/// `(sample_type, embedding model)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidRecord {
    pub speaker_name: String,
    pub sample_type: SampleType,
    pub short_name: String,
    pub representative_sample_file: Option<String>,
    pub sample_count: u32,
    /// Bounded history of sample dates, most recent kept, oldest evicted.
    pub sample_dates: Vec<NaiveDate>,
    pub centroid: Vec<f32>,
    pub model: EmbeddingModelSpec,
}

/// Listing row for the command surface.
#[derive(Debug, Clone, Serialize)]
pub struct SpeakerSummary {
    pub name: String,
    pub short_name: String,
    pub sample_count: u32,
    pub sample_file: Option<String>,
}

/// Sample listing row (vector omitted).
#[derive(Debug, Clone, Serialize)]
pub struct SampleInfo {
    pub id: i64,
    pub sample_key: String,
    pub speaker_name: String,
    pub sample_type: SampleType,
    pub episode_id: Option<i64>,
    pub segment_idx: Option<i64>,
    pub file_path: Option<String>,
    pub transcript_text: Option<String>,
    pub sample_date: Option<NaiveDate>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub source: SampleSource,
    pub rating: i32,
}

/// Default short name: first whitespace-separated token of the full name.
pub fn default_short_name(name: &str) -> String {
    name.split_whitespace()
        .next()
        .unwrap_or(name)
        .to_string()
}

/// L2 norm with f64 intermediate precision.
pub fn l2_norm(v: &[f32]) -> f32 {
    let sum: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum();
    sum.sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(speaker: &str) -> NewSample {
        NewSample {
            model: EmbeddingModelSpec::new("pyannote", "pyannote/embedding", 4, "3.1"),
            speaker_name: speaker.to_string(),
            sample_type: SampleType::Speaker,
            episode_id: Some(12),
            segment_idx: Some(7),
            file_path: Some("samples/matt/ep12_seg7.wav".to_string()),
            transcript_text: None,
            sample_date: None,
            start_time: Some(42.5),
            end_time: Some(49.25),
            external_id: None,
            source: SampleSource::Manual,
            embedding: vec![1.0, 0.0, 0.0, 0.0],
        }
    }

    #[test]
    fn sample_key_is_deterministic() {
        let a = sample("Matt Donnelly");
        let b = sample("Matt Donnelly");
        assert_eq!(a.sample_key(), b.sample_key());
        assert_eq!(
            a.sample_key(),
            "pyannote|Matt Donnelly|speaker|samples/matt/ep12_seg7.wav|12|7|42.500-49.250|-"
        );
    }

    #[test]
    fn sample_key_distinguishes_provenance() {
        let a = sample("Matt Donnelly");
        let mut b = sample("Matt Donnelly");
        b.segment_idx = Some(8);
        assert_ne!(a.sample_key(), b.sample_key());

        let mut c = sample("Matt Donnelly");
        c.sample_type = SampleType::SoundBite;
        assert_ne!(a.sample_key(), c.sample_key());
    }

    #[test]
    fn sample_type_round_trip() {
        for t in [SampleType::Speaker, SampleType::SoundBite] {
            assert_eq!(t.as_str().parse::<SampleType>().unwrap(), t);
        }
        assert!("bogus".parse::<SampleType>().is_err());
    }

    #[test]
    fn sample_source_round_trip() {
        for s in [SampleSource::Manual, SampleSource::Harvest, SampleSource::Auto] {
            assert_eq!(s.as_str().parse::<SampleSource>().unwrap(), s);
        }
        assert!("scraped".parse::<SampleSource>().is_err());
    }

    #[test]
    fn short_name_default() {
        assert_eq!(default_short_name("Matt Donnelly"), "Matt");
        assert_eq!(default_short_name("Cher"), "Cher");
    }

    #[test]
    fn l2_norm_basic() {
        assert!((l2_norm(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(l2_norm(&[]), 0.0);
    }
}
