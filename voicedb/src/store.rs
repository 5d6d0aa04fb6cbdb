use std::collections::BTreeMap;

use serde::Serialize;

use crate::entity::{
    CentroidRecord, NewSample, SampleInfo, SampleSource, SampleType, SpeakerSummary, StoredSample,
};
use crate::error::VoiceDbError;

/// Result of an authoritative centroid recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildReport {
    /// Live sample rows scanned.
    pub sample_rows: usize,
    /// Distinct `(speaker, sample_type, model)` groups found.
    pub group_count: usize,
    /// Centroids written back.
    pub centroids_written: usize,
}

/// One finding from `verify_integrity`. Findings are reported, never
/// auto-repaired; repair is an explicit rebuild.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// A sample row references an embedding-model row that no longer exists.
    OrphanedSample { sample_id: i64, sample_key: String },
    /// A stored vector blob does not match its model's dimension.
    CorruptVector {
        sample_id: i64,
        expected_len: usize,
        got_len: usize,
    },
    /// A centroid vector does not match its model's dimension.
    CorruptCentroid {
        speaker_name: String,
        expected_dim: usize,
        got_dim: usize,
    },
    /// A speaker has samples but no centroid (aggregation drift).
    MissingCentroid {
        speaker_name: String,
        sample_type: SampleType,
        sample_count: u32,
    },
    /// A referenced audio file no longer exists on disk.
    MissingFile { speaker_name: String, path: String },
}

/// Structured pass/fail report from `verify_integrity`.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub samples_checked: usize,
    pub centroids_checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Result of removing a speaker and everything derived from them.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RemovedSpeaker {
    pub samples_deleted: usize,
    pub centroids_deleted: usize,
}

/// Durable storage for voice samples and speaker centroids, scoped by
/// `(backend, sample_type)`.
///
/// Two implementations exist and are selected explicitly by the caller,
/// never auto-detected: [`SqliteStore`](crate::SqliteStore) (relational,
/// authoritative) and [`SnapshotStore`](crate::SnapshotStore) (flat
/// versioned JSON file, portable; retains centroids only, so the
/// sample-level operations degrade as documented per method).
///
/// All implementations must be safe for concurrent readers; writes assume a
/// single writer per store at a time.
pub trait VoiceStore: Send + Sync {
    /// Writes one sample. The row is keyed by [`NewSample::sample_key`]:
    /// re-submitting the same logical sample updates the vector in place.
    /// Resolves or creates the owning embedding-model row in the same
    /// transaction; a failure rolls the whole upsert back.
    fn upsert_sample(&self, sample: &NewSample) -> Result<StoredSample, VoiceDbError>;

    /// Writes or replaces one centroid, keyed by
    /// `(speaker_name, sample_type, model)`.
    fn upsert_centroid(&self, centroid: &CentroidRecord) -> Result<(), VoiceDbError>;

    /// Returns centroids belonging to *active* models of the backend,
    /// keyed by speaker name in sorted order. When more than one active
    /// model holds a centroid for the same speaker, the newest model wins.
    fn load_centroids(
        &self,
        backend: &str,
        sample_type: SampleType,
    ) -> Result<BTreeMap<String, CentroidRecord>, VoiceDbError>;

    /// Atomically replaces every centroid of the backend with the given
    /// set. Readers never observe a partially-replaced table.
    fn replace_centroids(
        &self,
        backend: &str,
        centroids: &[CentroidRecord],
    ) -> Result<(), VoiceDbError>;

    /// Merge-only bulk import: writes centroids whose
    /// `(speaker, sample_type, model)` key is not already present and
    /// returns how many were added. Existing speakers are never overwritten.
    fn import_centroids_missing_only(
        &self,
        centroids: &[CentroidRecord],
    ) -> Result<usize, VoiceDbError>;

    /// Authoritative recomputation: groups all live samples of the backend
    /// by `(speaker, sample_type, model)`, computes the arithmetic mean per
    /// group, and atomically replaces the backend's centroids. Samples are
    /// folded in sample-key order so the result is identical for any
    /// insertion order.
    fn rebuild_centroids_from_samples(&self, backend: &str) -> Result<RebuildReport, VoiceDbError>;

    /// Same as [`rebuild_centroids_from_samples`](Self::rebuild_centroids_from_samples),
    /// restricted to one speaker. Required after deleting any of the
    /// speaker's samples: the incremental running mean cannot subtract a
    /// sample's contribution.
    fn rebuild_speaker(&self, backend: &str, speaker: &str) -> Result<RebuildReport, VoiceDbError>;

    /// Checks for orphaned samples, corrupt vectors, speakers with samples
    /// but no centroid, and referenced audio files missing from disk.
    fn verify_integrity(&self, backend: &str) -> Result<IntegrityReport, VoiceDbError>;

    /// Speakers with a centroid under an active model, sorted by name.
    fn list_speakers(
        &self,
        backend: &str,
        sample_type: SampleType,
    ) -> Result<Vec<SpeakerSummary>, VoiceDbError>;

    /// Deletes the speaker's samples and centroids for the backend.
    fn remove_speaker(&self, backend: &str, speaker: &str) -> Result<RemovedSpeaker, VoiceDbError>;

    /// All sample rows for a speaker under the backend, oldest first.
    fn samples_for_speaker(
        &self,
        backend: &str,
        speaker: &str,
    ) -> Result<Vec<SampleInfo>, VoiceDbError>;

    /// Sets the quality rating of one sample.
    fn set_sample_rating(&self, sample_id: i64, rating: i32) -> Result<(), VoiceDbError>;

    /// Deletes one sample, returning its speaker name (None when the id is
    /// unknown). Callers must rebuild the speaker's centroid afterwards.
    fn delete_sample(&self, sample_id: i64) -> Result<Option<String>, VoiceDbError>;

    /// Deletes every sample of the backend with the given source, returning
    /// the count. Callers must rebuild afterwards.
    fn delete_samples_by_source(
        &self,
        backend: &str,
        source: SampleSource,
    ) -> Result<usize, VoiceDbError>;
}
