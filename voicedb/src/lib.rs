//! Durable, queryable storage for voice fingerprints.
//!
//! Persists per-sample embeddings and per-speaker centroids scoped by
//! `(backend, sample_type)`, so embedding-model upgrades coexist without
//! corrupting older data.
//!
//! # Architecture
//!
//! - [`VoiceStore`]: the single storage interface. Two implementations,
//!   selected explicitly by the caller:
//!   - [`SqliteStore`]: relational, authoritative. Retains every sample
//!     row; owns rebuild and integrity verification.
//!   - [`SnapshotStore`]: flat versioned JSON file, portable. Centroids
//!     only.
//! - [`Snapshot`]: the portable export document bridging the two, with
//!   [`export_snapshot`] and missing-only import for lossless round trips
//!   that never clobber newer relational data.
//!
//! # Model versioning
//!
//! Every sample and centroid references an [`EmbeddingModelSpec`] row keyed
//! by `(backend, model_id, embedding_dim, dtype, version_tag)`. Rows are
//! immutable; a new configuration inserts a new row, and deactivating a row
//! supersedes it without losing history.

mod entity;
mod error;
mod snapshot;
mod sqlite;
mod store;

pub use entity::{
    CentroidRecord, DTYPE_F32, EmbeddingModelRecord, EmbeddingModelSpec, MAX_SAMPLE_DATES,
    NewSample, SampleInfo, SampleSource, SampleType, SpeakerSummary, StoredSample,
    default_short_name, l2_norm,
};
pub use error::VoiceDbError;
pub use snapshot::{Snapshot, SnapshotMeta, SnapshotSpeaker, SnapshotStore, export_snapshot};
pub use sqlite::SqliteStore;
pub use store::{
    IntegrityIssue, IntegrityReport, RebuildReport, RemovedSpeaker, VoiceStore,
};
