use std::collections::BTreeMap;
use std::sync::RwLock;

use chrono::NaiveDate;

use earshot_voicedb::{
    CentroidRecord, EmbeddingModelSpec, IntegrityReport, NewSample, RebuildReport, RemovedSpeaker,
    SampleSource, SampleType, Snapshot, SpeakerSummary, StoredSample, VoiceStore,
    default_short_name, export_snapshot,
};

use crate::aggregate::{fold_sample, push_sample_date};
use crate::engine::{DEFAULT_THRESHOLD, Identification, identify_embedding};
use crate::error::VoiceIdError;

/// An enrollment request: one embedding plus its provenance.
#[derive(Debug, Clone)]
pub struct EnrollRequest {
    pub speaker_name: String,
    pub short_name: Option<String>,
    pub embedding: Vec<f32>,
    pub sample_date: Option<NaiveDate>,
    pub episode_id: Option<i64>,
    pub segment_idx: Option<i64>,
    pub file_path: Option<String>,
    pub transcript_text: Option<String>,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub external_id: Option<String>,
    pub source: SampleSource,
    /// Discard the existing centroid instead of averaging into it.
    pub overwrite: bool,
}

impl EnrollRequest {
    pub fn new(speaker_name: &str, embedding: Vec<f32>) -> Self {
        Self {
            speaker_name: speaker_name.to_string(),
            short_name: None,
            embedding,
            sample_date: None,
            episode_id: None,
            segment_idx: None,
            file_path: None,
            transcript_text: None,
            start_time: None,
            end_time: None,
            external_id: None,
            source: SampleSource::Manual,
            overwrite: false,
        }
    }
}

/// Result of an enrollment.
#[derive(Debug, Clone)]
pub struct EnrollOutcome {
    pub sample: StoredSample,
    /// Samples folded into the speaker's current centroid.
    pub sample_count: u32,
    /// True when the previous centroid was discarded (dimension change or
    /// explicit overwrite).
    pub reset: bool,
}

/// The voice library: a store handle plus the in-memory centroid set for
/// one `(backend, sample_type)`.
///
/// Centroids are loaded once at open and kept in sync write-through, so
/// identification never touches the store. The store stays the source of
/// truth; `rebuild` recomputes from samples and reloads.
pub struct Library {
    store: Box<dyn VoiceStore>,
    model: EmbeddingModelSpec,
    sample_type: SampleType,
    threshold: f32,
    centroids: RwLock<BTreeMap<String, CentroidRecord>>,
}

impl Library {
    /// Opens the library for the model's backend with the default match
    /// threshold.
    pub fn open(
        store: Box<dyn VoiceStore>,
        model: EmbeddingModelSpec,
        sample_type: SampleType,
    ) -> Result<Self, VoiceIdError> {
        Self::with_threshold(store, model, sample_type, DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(
        store: Box<dyn VoiceStore>,
        model: EmbeddingModelSpec,
        sample_type: SampleType,
        threshold: f32,
    ) -> Result<Self, VoiceIdError> {
        let centroids = store.load_centroids(&model.backend, sample_type)?;
        tracing::debug!(
            backend = %model.backend,
            speakers = centroids.len(),
            "voice library opened"
        );
        Ok(Self {
            store,
            model,
            sample_type,
            threshold,
            centroids: RwLock::new(centroids),
        })
    }

    pub fn backend(&self) -> &str {
        &self.model.backend
    }

    pub fn model(&self) -> &EmbeddingModelSpec {
        &self.model
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Adjusts matching strictness at runtime.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Direct access to the underlying store for sample-level maintenance.
    pub fn store(&self) -> &dyn VoiceStore {
        self.store.as_ref()
    }

    pub fn len(&self) -> usize {
        self.centroids.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reload(&self) -> Result<(), VoiceIdError> {
        let fresh = self
            .store
            .load_centroids(&self.model.backend, self.sample_type)?;
        *self.centroids.write().unwrap() = fresh;
        Ok(())
    }

    /// Enrolls one sample: upserts the sample row and folds the vector
    /// into the speaker's running centroid.
    pub fn enroll(&self, request: EnrollRequest) -> Result<EnrollOutcome, VoiceIdError> {
        if request.embedding.is_empty() {
            return Err(VoiceIdError::EmptyEmbedding);
        }

        let new_sample = NewSample {
            model: self.model.clone(),
            speaker_name: request.speaker_name.clone(),
            sample_type: self.sample_type,
            episode_id: request.episode_id,
            segment_idx: request.segment_idx,
            file_path: request.file_path.clone(),
            transcript_text: request.transcript_text.clone(),
            sample_date: request.sample_date,
            start_time: request.start_time,
            end_time: request.end_time,
            external_id: request.external_id.clone(),
            source: request.source,
            embedding: request.embedding,
        };
        let stored = self.store.upsert_sample(&new_sample)?;

        let mut centroids = self.centroids.write().unwrap();
        let current = centroids.get(&request.speaker_name);

        let existing = if request.overwrite {
            None
        } else {
            current.map(|c| (c.centroid.as_slice(), c.sample_count))
        };
        let folded = fold_sample(existing, &new_sample.embedding);
        let reset = folded.reset || (request.overwrite && current.is_some());

        let mut dates = if reset || current.is_none() {
            Vec::new()
        } else {
            current.map(|c| c.sample_dates.clone()).unwrap_or_default()
        };
        if let Some(date) = request.sample_date {
            push_sample_date(&mut dates, date);
        }

        let short_name = request
            .short_name
            .or_else(|| current.map(|c| c.short_name.clone()))
            .unwrap_or_else(|| default_short_name(&request.speaker_name));
        let representative = current
            .and_then(|c| c.representative_sample_file.clone())
            .or_else(|| new_sample.file_path.clone());

        let record = CentroidRecord {
            speaker_name: request.speaker_name.clone(),
            sample_type: self.sample_type,
            short_name,
            representative_sample_file: representative,
            sample_count: folded.sample_count,
            sample_dates: dates,
            centroid: folded.centroid,
            model: self.model.clone(),
        };
        self.store.upsert_centroid(&record)?;
        let sample_count = record.sample_count;
        centroids.insert(request.speaker_name, record);

        Ok(EnrollOutcome {
            sample: stored,
            sample_count,
            reset,
        })
    }

    /// Matches an unknown embedding against all known centroids,
    /// optionally weighting by distance between `target_date` and each
    /// speaker's enrollment era.
    pub fn identify(&self, embedding: &[f32], target_date: Option<NaiveDate>) -> Identification {
        let centroids = self.centroids.read().unwrap();
        identify_embedding(&centroids, embedding, target_date, self.threshold)
    }

    pub fn list_speakers(&self) -> Result<Vec<SpeakerSummary>, VoiceIdError> {
        Ok(self
            .store
            .list_speakers(&self.model.backend, self.sample_type)?)
    }

    pub fn remove_speaker(&self, name: &str) -> Result<RemovedSpeaker, VoiceIdError> {
        let removed = self.store.remove_speaker(&self.model.backend, name)?;
        self.centroids.write().unwrap().remove(name);
        Ok(removed)
    }

    /// Authoritative recomputation of every centroid from stored samples,
    /// then reload.
    pub fn rebuild(&self) -> Result<RebuildReport, VoiceIdError> {
        let report = self
            .store
            .rebuild_centroids_from_samples(&self.model.backend)?;
        self.reload()?;
        Ok(report)
    }

    /// Recomputes one speaker's centroid from stored samples. Required
    /// after deleting any of their samples.
    pub fn rebuild_speaker(&self, name: &str) -> Result<RebuildReport, VoiceIdError> {
        let report = self.store.rebuild_speaker(&self.model.backend, name)?;
        self.reload()?;
        Ok(report)
    }

    pub fn verify(&self) -> Result<IntegrityReport, VoiceIdError> {
        Ok(self.store.verify_integrity(&self.model.backend)?)
    }

    pub fn export_snapshot(&self) -> Result<Snapshot, VoiceIdError> {
        Ok(export_snapshot(self.store.as_ref(), &self.model.backend)?)
    }

    /// Imports snapshot speakers that are not already present. Existing
    /// speakers are never overwritten.
    pub fn import_missing(&self, snapshot: &Snapshot) -> Result<usize, VoiceIdError> {
        let records = snapshot.to_centroids(&self.model)?;
        let added = self.store.import_centroids_missing_only(&records)?;
        if added > 0 {
            self.reload()?;
        }
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use earshot_voicedb::SqliteStore;

    fn library(dim: usize) -> Library {
        let store = SqliteStore::open_in_memory().unwrap();
        Library::open(
            Box::new(store),
            EmbeddingModelSpec::new("pyannote", "pyannote/embedding", dim, "3.1"),
            SampleType::Speaker,
        )
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(name: &str, seg: i64, embedding: Vec<f32>) -> EnrollRequest {
        EnrollRequest {
            episode_id: Some(1),
            segment_idx: Some(seg),
            ..EnrollRequest::new(name, embedding)
        }
    }

    #[test]
    fn enroll_then_identify_round_trip() {
        let lib = library(3);
        lib.enroll(request("Matt Donnelly", 1, vec![1.0, 0.0, 0.0]))
            .unwrap();
        lib.enroll(request("Paul Mattingly", 2, vec![0.0, 1.0, 0.0]))
            .unwrap();
        assert_eq!(lib.len(), 2);

        let result = lib.identify(&[0.95, 0.05, 0.0], None);
        assert_eq!(result.name(), Some("Matt Donnelly"));
        assert!(result.score() > 0.9);
    }

    #[test]
    fn incremental_centroid_matches_rebuild() {
        let lib = library(3);
        let samples = [
            vec![0.9f32, 0.1, 0.3],
            vec![0.2, 0.8, 0.5],
            vec![0.4, 0.4, 0.7],
        ];
        for (i, s) in samples.iter().enumerate() {
            lib.enroll(request("Matt Donnelly", i as i64, s.clone()))
                .unwrap();
        }

        let incremental = {
            let centroids = lib.centroids.read().unwrap();
            centroids["Matt Donnelly"].centroid.clone()
        };

        lib.rebuild().unwrap();
        let rebuilt = {
            let centroids = lib.centroids.read().unwrap();
            centroids["Matt Donnelly"].centroid.clone()
        };

        for (a, b) in incremental.iter().zip(rebuilt.iter()) {
            assert!((a - b).abs() < 1e-4, "incremental {a} vs rebuilt {b}");
        }
    }

    #[test]
    fn dimension_change_resets_the_centroid() {
        let store = SqliteStore::open_in_memory().unwrap();
        let lib = Library::open(
            Box::new(store),
            EmbeddingModelSpec::new("pyannote", "pyannote/embedding", 2, "3.1"),
            SampleType::Speaker,
        )
        .unwrap();
        lib.enroll(request("Matt Donnelly", 1, vec![1.0, 0.0]))
            .unwrap();

        // Same speaker under an upgraded model with a different dimension.
        let store2_outcome = {
            let mut lib2_model = lib.model().clone();
            lib2_model.embedding_dim = 3;
            lib2_model.version_tag = "4.0".to_string();
            let lib2 = Library::open(lib_store_rebox(lib), lib2_model, SampleType::Speaker);
            let lib2 = lib2.unwrap();
            lib2.enroll(request("Matt Donnelly", 2, vec![0.0, 1.0, 0.0]))
                .unwrap()
        };
        assert!(store2_outcome.reset);
        assert_eq!(store2_outcome.sample_count, 1);
    }

    // Moves the boxed store out of a consumed library.
    fn lib_store_rebox(lib: Library) -> Box<dyn VoiceStore> {
        lib.store
    }

    #[test]
    fn overwrite_discards_the_average() {
        let lib = library(2);
        lib.enroll(request("Matt Donnelly", 1, vec![1.0, 0.0]))
            .unwrap();
        let mut second = request("Matt Donnelly", 2, vec![0.0, 1.0]);
        second.overwrite = true;
        let outcome = lib.enroll(second).unwrap();
        assert!(outcome.reset);
        assert_eq!(outcome.sample_count, 1);

        let result = lib.identify(&[0.0, 1.0], None);
        assert!((result.score() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn enrollment_dates_feed_identification() {
        let lib = library(2);
        let mut req = request("Matt Donnelly", 1, vec![1.0, 0.0]);
        req.sample_date = Some(date(2023, 6, 1));
        lib.enroll(req).unwrap();

        let near = lib.identify(&[1.0, 0.0], Some(date(2023, 6, 1)));
        let far = lib.identify(&[1.0, 0.0], Some(date(2030, 6, 1)));
        assert!(near.score() > far.score());
        assert!(far.score() >= 0.5);
    }

    #[test]
    fn remove_speaker_forgets_them() {
        let lib = library(2);
        lib.enroll(request("Matt Donnelly", 1, vec![1.0, 0.0]))
            .unwrap();
        let removed = lib.remove_speaker("Matt Donnelly").unwrap();
        assert_eq!(removed.samples_deleted, 1);
        assert!(lib.is_empty());
        assert!(!lib.identify(&[1.0, 0.0], None).is_match());
    }

    #[test]
    fn snapshot_export_import_between_libraries() {
        let lib = library(2);
        lib.enroll(request("Matt Donnelly", 1, vec![1.0, 0.0]))
            .unwrap();
        lib.enroll(request("Paul Mattingly", 2, vec![0.0, 1.0]))
            .unwrap();
        let snapshot = lib.export_snapshot().unwrap();

        let fresh = library(2);
        let added = fresh.import_missing(&snapshot).unwrap();
        assert_eq!(added, 2);
        assert_eq!(fresh.len(), 2);
        assert_eq!(
            fresh.identify(&[1.0, 0.0], None).name(),
            Some("Matt Donnelly")
        );

        // A second import adds nothing and overwrites nothing.
        assert_eq!(fresh.import_missing(&snapshot).unwrap(), 0);
    }

    #[test]
    fn empty_embedding_is_rejected() {
        let lib = library(2);
        let err = lib.enroll(request("Matt Donnelly", 1, vec![])).unwrap_err();
        assert!(matches!(err, VoiceIdError::EmptyEmbedding));
    }
}
