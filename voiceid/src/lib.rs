//! Speaker identification over stored voice fingerprints.
//!
//! # Pipeline
//!
//! 1. [`fold_sample`]: new sample vector -> updated running-mean centroid
//! 2. [`identify_embedding`]: unknown vector -> best-matching speaker via
//!    temporally-weighted cosine similarity
//! 3. [`Library`]: both of the above glued to a
//!    [`VoiceStore`](earshot_voicedb::VoiceStore) handle
//!
//! # Design
//!
//! The incremental running mean is an O(dim) approximation of the true
//! mean. It matches the store's authoritative rebuild exactly for in-order
//! insertion into an empty library, but it cannot *remove* a sample's
//! contribution — after any deletion, callers must rebuild
//! ([`Library::rebuild_speaker`]).
//!
//! Temporal weighting models voice drift: for a query anchored at a target
//! date, a candidate whose enrollment era is years away is discounted by up
//! to half (`0.5 + 0.5 * exp(-|days| / 365)`), never more.

mod aggregate;
mod engine;
mod error;
mod voiceid;

pub use aggregate::{FoldOutcome, fold_sample, mean_vector, push_sample_date};
pub use engine::{
    DEFAULT_THRESHOLD, Identification, cosine_sim, identify_embedding, mean_date, temporal_weight,
};
pub use error::VoiceIdError;
pub use voiceid::{EnrollOutcome, EnrollRequest, Library};
