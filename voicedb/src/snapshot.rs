use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::{
    CentroidRecord, EmbeddingModelSpec, SampleInfo, SampleSource, SampleType, SpeakerSummary,
    StoredSample, NewSample,
};
use crate::error::VoiceDbError;
use crate::store::{
    IntegrityIssue, IntegrityReport, RebuildReport, RemovedSpeaker, VoiceStore,
};

/// Portable snapshot document envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub backend: String,
    pub exported_at: DateTime<Utc>,
}

/// One speaker entry in the portable snapshot document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSpeaker {
    pub embedding: Vec<f32>,
    pub short_name: String,
    pub sample_file: Option<String>,
    pub sample_count: u32,
    #[serde(default)]
    pub sample_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub sample_type: SampleType,
}

/// The portable export format:
/// `{meta: {backend, exported_at}, speakers: {name: {...}}}`.
///
/// Bridges the relational store and the flat-file store losslessly in both
/// directions; `import_centroids_missing_only` guarantees an import never
/// clobbers newer data on the receiving side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub meta: SnapshotMeta,
    pub speakers: BTreeMap<String, SnapshotSpeaker>,
}

impl Snapshot {
    /// Reads and validates a snapshot file. Corrupt or unreadable files
    /// fail loudly; they never degrade into an empty library.
    pub fn load(path: &Path) -> Result<Self, VoiceDbError> {
        let raw = std::fs::read_to_string(path).map_err(|source| VoiceDbError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let snapshot: Snapshot = serde_json::from_str(&raw)
            .map_err(|e| VoiceDbError::SnapshotFormat(format!("{}: {e}", path.display())))?;
        for (name, speaker) in &snapshot.speakers {
            if speaker.embedding.is_empty() {
                return Err(VoiceDbError::SnapshotFormat(format!(
                    "speaker {name} has an empty embedding"
                )));
            }
        }
        Ok(snapshot)
    }

    pub fn save(&self, path: &Path) -> Result<(), VoiceDbError> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| VoiceDbError::SnapshotFormat(e.to_string()))?;
        std::fs::write(path, raw).map_err(|source| VoiceDbError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_centroids<'a>(
        backend: &str,
        centroids: impl IntoIterator<Item = &'a CentroidRecord>,
    ) -> Self {
        let mut speakers = BTreeMap::new();
        for c in centroids {
            speakers.insert(
                c.speaker_name.clone(),
                SnapshotSpeaker {
                    embedding: c.centroid.clone(),
                    short_name: c.short_name.clone(),
                    sample_file: c.representative_sample_file.clone(),
                    sample_count: c.sample_count,
                    sample_dates: c.sample_dates.clone(),
                    sample_type: c.sample_type,
                },
            );
        }
        Self {
            meta: SnapshotMeta {
                backend: backend.to_string(),
                exported_at: Utc::now(),
            },
            speakers,
        }
    }

    /// Converts snapshot entries into centroid records under the given
    /// model identity. Entries whose vector width disagrees with the model
    /// dimension are rejected.
    pub fn to_centroids(
        &self,
        model: &EmbeddingModelSpec,
    ) -> Result<Vec<CentroidRecord>, VoiceDbError> {
        let mut out = Vec::with_capacity(self.speakers.len());
        for (name, speaker) in &self.speakers {
            if speaker.embedding.len() != model.embedding_dim {
                return Err(VoiceDbError::DimensionMismatch {
                    expected: model.embedding_dim,
                    got: speaker.embedding.len(),
                });
            }
            out.push(CentroidRecord {
                speaker_name: name.clone(),
                sample_type: speaker.sample_type,
                short_name: speaker.short_name.clone(),
                representative_sample_file: speaker.sample_file.clone(),
                sample_count: speaker.sample_count,
                sample_dates: speaker.sample_dates.clone(),
                centroid: speaker.embedding.clone(),
                model: model.clone(),
            });
        }
        Ok(out)
    }
}

/// Exports every centroid of the backend (both sample types, active models
/// only) as a portable snapshot.
pub fn export_snapshot(store: &dyn VoiceStore, backend: &str) -> Result<Snapshot, VoiceDbError> {
    let mut all: Vec<CentroidRecord> = Vec::new();
    for sample_type in [SampleType::Speaker, SampleType::SoundBite] {
        all.extend(store.load_centroids(backend, sample_type)?.into_values());
    }
    Ok(Snapshot::from_centroids(backend, all.iter()))
}

/// Flat-file [`VoiceStore`] over a snapshot document. Portable, but
/// centroid-only: sample rows are not retained, so the sample-level
/// operations and the authoritative rebuild report `Unsupported` rather
/// than silently degrading. Entries are keyed by speaker name; the
/// per-`sample_type` split is carried on each entry.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    model: EmbeddingModelSpec,
    speakers: Mutex<BTreeMap<String, CentroidRecord>>,
}

impl SnapshotStore {
    /// Opens the snapshot file, creating an empty library when the file
    /// does not exist yet. An existing file must parse and must belong to
    /// the model's backend.
    pub fn open(path: &Path, model: EmbeddingModelSpec) -> Result<Self, VoiceDbError> {
        let mut speakers = BTreeMap::new();
        if path.exists() {
            let snapshot = Snapshot::load(path)?;
            if snapshot.meta.backend != model.backend {
                return Err(VoiceDbError::BackendMismatch {
                    requested: model.backend.clone(),
                    found: snapshot.meta.backend,
                });
            }
            for (name, entry) in snapshot.speakers {
                speakers.insert(
                    name.clone(),
                    CentroidRecord {
                        speaker_name: name,
                        sample_type: entry.sample_type,
                        short_name: entry.short_name,
                        representative_sample_file: entry.sample_file,
                        sample_count: entry.sample_count,
                        sample_dates: entry.sample_dates,
                        centroid: entry.embedding,
                        model: model.clone(),
                    },
                );
            }
            tracing::debug!(
                path = %path.display(),
                speakers = speakers.len(),
                "loaded voice snapshot"
            );
        }
        Ok(Self {
            path: path.to_path_buf(),
            model,
            speakers: Mutex::new(speakers),
        })
    }

    fn persist(&self, speakers: &BTreeMap<String, CentroidRecord>) -> Result<(), VoiceDbError> {
        Snapshot::from_centroids(&self.model.backend, speakers.values()).save(&self.path)
    }

    fn check_backend(&self, backend: &str) -> Result<(), VoiceDbError> {
        if backend != self.model.backend {
            return Err(VoiceDbError::BackendMismatch {
                requested: backend.to_string(),
                found: self.model.backend.clone(),
            });
        }
        Ok(())
    }
}

impl VoiceStore for SnapshotStore {
    fn upsert_sample(&self, sample: &NewSample) -> Result<StoredSample, VoiceDbError> {
        self.check_backend(&sample.model.backend)?;
        if sample.embedding.len() != sample.model.embedding_dim {
            return Err(VoiceDbError::DimensionMismatch {
                expected: sample.model.embedding_dim,
                got: sample.embedding.len(),
            });
        }
        // No per-sample rows in the flat file: the caller folds the sample
        // into the centroid and writes it back via upsert_centroid.
        let speakers = self.speakers.lock().unwrap();
        Ok(StoredSample {
            id: None,
            sample_key: sample.sample_key(),
            created: !speakers.contains_key(&sample.speaker_name),
        })
    }

    fn upsert_centroid(&self, centroid: &CentroidRecord) -> Result<(), VoiceDbError> {
        self.check_backend(&centroid.model.backend)?;
        let mut speakers = self.speakers.lock().unwrap();
        speakers.insert(centroid.speaker_name.clone(), centroid.clone());
        self.persist(&speakers)
    }

    fn load_centroids(
        &self,
        backend: &str,
        sample_type: SampleType,
    ) -> Result<BTreeMap<String, CentroidRecord>, VoiceDbError> {
        self.check_backend(backend)?;
        let speakers = self.speakers.lock().unwrap();
        Ok(speakers
            .iter()
            .filter(|(_, c)| c.sample_type == sample_type)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn replace_centroids(
        &self,
        backend: &str,
        centroids: &[CentroidRecord],
    ) -> Result<(), VoiceDbError> {
        self.check_backend(backend)?;
        for c in centroids {
            self.check_backend(&c.model.backend)?;
        }
        let mut speakers = self.speakers.lock().unwrap();
        speakers.clear();
        for c in centroids {
            speakers.insert(c.speaker_name.clone(), c.clone());
        }
        self.persist(&speakers)
    }

    fn import_centroids_missing_only(
        &self,
        centroids: &[CentroidRecord],
    ) -> Result<usize, VoiceDbError> {
        let mut speakers = self.speakers.lock().unwrap();
        let mut added = 0usize;
        for c in centroids {
            self.check_backend(&c.model.backend)?;
            if !speakers.contains_key(&c.speaker_name) {
                speakers.insert(c.speaker_name.clone(), c.clone());
                added += 1;
            }
        }
        if added > 0 {
            self.persist(&speakers)?;
        }
        Ok(added)
    }

    fn rebuild_centroids_from_samples(&self, _backend: &str) -> Result<RebuildReport, VoiceDbError> {
        Err(VoiceDbError::Unsupported("rebuild_centroids_from_samples"))
    }

    fn rebuild_speaker(&self, _backend: &str, _speaker: &str) -> Result<RebuildReport, VoiceDbError> {
        Err(VoiceDbError::Unsupported("rebuild_speaker"))
    }

    fn verify_integrity(&self, backend: &str) -> Result<IntegrityReport, VoiceDbError> {
        self.check_backend(backend)?;
        let speakers = self.speakers.lock().unwrap();
        let mut issues = Vec::new();
        for (name, c) in speakers.iter() {
            if c.centroid.len() != c.model.embedding_dim {
                issues.push(IntegrityIssue::CorruptCentroid {
                    speaker_name: name.clone(),
                    expected_dim: c.model.embedding_dim,
                    got_dim: c.centroid.len(),
                });
            }
            if let Some(path) = &c.representative_sample_file {
                if !Path::new(path).exists() {
                    issues.push(IntegrityIssue::MissingFile {
                        speaker_name: name.clone(),
                        path: path.clone(),
                    });
                }
            }
        }
        Ok(IntegrityReport {
            samples_checked: 0,
            centroids_checked: speakers.len(),
            issues,
        })
    }

    fn list_speakers(
        &self,
        backend: &str,
        sample_type: SampleType,
    ) -> Result<Vec<SpeakerSummary>, VoiceDbError> {
        Ok(self
            .load_centroids(backend, sample_type)?
            .into_values()
            .map(|c| SpeakerSummary {
                name: c.speaker_name,
                short_name: c.short_name,
                sample_count: c.sample_count,
                sample_file: c.representative_sample_file,
            })
            .collect())
    }

    fn remove_speaker(&self, backend: &str, speaker: &str) -> Result<RemovedSpeaker, VoiceDbError> {
        self.check_backend(backend)?;
        let mut speakers = self.speakers.lock().unwrap();
        let removed = speakers.remove(speaker).is_some();
        if removed {
            self.persist(&speakers)?;
        }
        Ok(RemovedSpeaker {
            samples_deleted: 0,
            centroids_deleted: removed as usize,
        })
    }

    fn samples_for_speaker(
        &self,
        _backend: &str,
        _speaker: &str,
    ) -> Result<Vec<SampleInfo>, VoiceDbError> {
        // Sample rows are not retained in the flat file.
        Ok(Vec::new())
    }

    fn set_sample_rating(&self, _sample_id: i64, _rating: i32) -> Result<(), VoiceDbError> {
        Err(VoiceDbError::Unsupported("set_sample_rating"))
    }

    fn delete_sample(&self, _sample_id: i64) -> Result<Option<String>, VoiceDbError> {
        Err(VoiceDbError::Unsupported("delete_sample"))
    }

    fn delete_samples_by_source(
        &self,
        _backend: &str,
        _source: SampleSource,
    ) -> Result<usize, VoiceDbError> {
        Err(VoiceDbError::Unsupported("delete_samples_by_source"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;

    fn spec() -> EmbeddingModelSpec {
        EmbeddingModelSpec::new("pyannote", "pyannote/embedding", 3, "3.1")
    }

    fn centroid(name: &str, vector: Vec<f32>) -> CentroidRecord {
        CentroidRecord {
            speaker_name: name.to_string(),
            sample_type: SampleType::Speaker,
            short_name: crate::entity::default_short_name(name),
            representative_sample_file: None,
            sample_count: 1,
            sample_dates: vec![],
            centroid: vector,
            model: spec(),
        }
    }

    #[test]
    fn snapshot_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");

        let records = vec![
            centroid("Matt Donnelly", vec![1.0, 0.0, 0.0]),
            centroid("Paul Mattingly", vec![0.0, 1.0, 0.0]),
        ];
        let snapshot = Snapshot::from_centroids("pyannote", records.iter());
        snapshot.save(&path).unwrap();

        let loaded = Snapshot::load(&path).unwrap();
        assert_eq!(loaded.meta.backend, "pyannote");
        assert_eq!(loaded.speakers.len(), 2);
        assert_eq!(
            loaded.speakers["Matt Donnelly"].embedding,
            vec![1.0, 0.0, 0.0]
        );
        assert_eq!(loaded.speakers["Matt Donnelly"].short_name, "Matt");
    }

    #[test]
    fn corrupt_snapshot_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = Snapshot::load(&path).unwrap_err();
        assert!(matches!(err, VoiceDbError::SnapshotFormat(_)));
    }

    #[test]
    fn missing_snapshot_file_errors() {
        let err = Snapshot::load(Path::new("/nonexistent/embeddings.json")).unwrap_err();
        assert!(matches!(err, VoiceDbError::Io { .. }));
    }

    #[test]
    fn snapshot_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");

        let store = SnapshotStore::open(&path, spec()).unwrap();
        store.upsert_centroid(&centroid("Matt Donnelly", vec![1.0, 0.0, 0.0])).unwrap();

        let reopened = SnapshotStore::open(&path, spec()).unwrap();
        let centroids = reopened.load_centroids("pyannote", SampleType::Speaker).unwrap();
        assert_eq!(centroids.len(), 1);
        assert_eq!(centroids["Matt Donnelly"].centroid, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn snapshot_store_rejects_foreign_backend_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("embeddings.json");
        Snapshot::from_centroids("ecapa-tdnn", std::iter::empty())
            .save(&path)
            .unwrap();

        let err = SnapshotStore::open(&path, spec()).unwrap_err();
        assert!(matches!(err, VoiceDbError::BackendMismatch { .. }));
    }

    #[test]
    fn snapshot_store_refuses_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(&dir.path().join("e.json"), spec()).unwrap();
        assert!(matches!(
            store.rebuild_centroids_from_samples("pyannote"),
            Err(VoiceDbError::Unsupported(_))
        ));
    }

    #[test]
    fn relational_to_flat_file_round_trip_is_lossless() {
        let sqlite = SqliteStore::open_in_memory().unwrap();
        for (i, v) in [vec![1.0f32, 0.0, 0.0], vec![0.0, 1.0, 0.0]].iter().enumerate() {
            sqlite
                .upsert_sample(&NewSample {
                    model: spec(),
                    speaker_name: "Matt Donnelly".to_string(),
                    sample_type: SampleType::Speaker,
                    episode_id: Some(1),
                    segment_idx: Some(i as i64),
                    file_path: None,
                    transcript_text: None,
                    sample_date: None,
                    start_time: None,
                    end_time: None,
                    external_id: None,
                    source: SampleSource::Manual,
                    embedding: v.clone(),
                })
                .unwrap();
        }
        sqlite.rebuild_centroids_from_samples("pyannote").unwrap();

        let exported = export_snapshot(&sqlite, "pyannote").unwrap();
        let records = exported.to_centroids(&spec()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let flat = SnapshotStore::open(&dir.path().join("e.json"), spec()).unwrap();
        let added = flat.import_centroids_missing_only(&records).unwrap();
        assert_eq!(added, 1);

        let a = sqlite.load_centroids("pyannote", SampleType::Speaker).unwrap();
        let b = flat.load_centroids("pyannote", SampleType::Speaker).unwrap();
        assert_eq!(a.len(), b.len());
        assert_eq!(
            a["Matt Donnelly"].centroid,
            b["Matt Donnelly"].centroid
        );
        assert_eq!(a["Matt Donnelly"].sample_count, b["Matt Donnelly"].sample_count);
    }

    #[test]
    fn to_centroids_rejects_dimension_mismatch() {
        let snapshot = Snapshot::from_centroids(
            "pyannote",
            [centroid("Matt Donnelly", vec![1.0, 0.0])].iter(),
        );
        let err = snapshot.to_centroids(&spec()).unwrap_err();
        assert!(matches!(err, VoiceDbError::DimensionMismatch { .. }));
    }
}
