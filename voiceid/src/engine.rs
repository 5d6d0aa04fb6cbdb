use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};

use earshot_voicedb::CentroidRecord;

/// Minimum weighted similarity for a confident match.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Outcome of matching an unknown embedding against the known centroids.
///
/// `NoMatch { best_score: 0.0 }` with an empty candidate set is
/// distinguishable from "no confident match": the latter carries the best
/// score actually observed.
#[derive(Debug, Clone, PartialEq)]
pub enum Identification {
    Match { name: String, score: f32 },
    NoMatch { best_score: f32 },
}

impl Identification {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Match { name, .. } => Some(name),
            Self::NoMatch { .. } => None,
        }
    }

    pub fn score(&self) -> f32 {
        match self {
            Self::Match { score, .. } => *score,
            Self::NoMatch { best_score } => *best_score,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match { .. })
    }
}

/// Cosine similarity between two vectors.
/// Uses f64 intermediate precision; returns 0 for zero-norm input.
pub fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    let mut dot: f64 = 0.0;
    let mut na: f64 = 0.0;
    let mut nb: f64 = 0.0;
    for i in 0..a.len() {
        let ai = a[i] as f64;
        let bi = b[i] as f64;
        dot += ai * bi;
        na += ai * ai;
        nb += bi * bi;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    (dot / denom) as f32
}

/// Mean of a date history, as a calendar date. `None` when empty.
pub fn mean_date(dates: &[NaiveDate]) -> Option<NaiveDate> {
    if dates.is_empty() {
        return None;
    }
    let sum: i64 = dates.iter().map(|d| d.num_days_from_ce() as i64).sum();
    let mean = (sum as f64 / dates.len() as f64).round() as i32;
    NaiveDate::from_num_days_from_ce_opt(mean)
}

/// Era weight for a candidate whose samples center on `mean`:
/// `0.5 + 0.5 * exp(-|days| / 365)`.
///
/// 1.0 at zero distance, decaying toward (never below) 0.5 as the target
/// date and the enrollment era diverge by years. A voice print drifts over
/// time, so enrollments near the target date are trusted more.
pub fn temporal_weight(target: NaiveDate, mean: NaiveDate) -> f32 {
    let days = (target - mean).num_days().abs() as f64;
    (0.5 + 0.5 * (-days / 365.0).exp()) as f32
}

/// Scores the unknown embedding against every candidate centroid and
/// returns the argmax if it clears the threshold.
///
/// Candidates with a different vector dimension are skipped entirely, so a
/// centroid built under one backend can never be selected by a query from
/// another. Iteration order is the map's sorted order and ties keep the
/// first name, making results reproducible.
pub fn identify_embedding(
    candidates: &BTreeMap<String, CentroidRecord>,
    embedding: &[f32],
    target_date: Option<NaiveDate>,
    threshold: f32,
) -> Identification {
    let mut best_name: Option<&str> = None;
    let mut best_score: f32 = 0.0;

    for (name, candidate) in candidates {
        if candidate.centroid.len() != embedding.len() {
            tracing::debug!(
                speaker = %name,
                candidate_dim = candidate.centroid.len(),
                query_dim = embedding.len(),
                "skipping dimension-mismatched candidate"
            );
            continue;
        }
        let similarity = cosine_sim(embedding, &candidate.centroid);
        let weight = match (target_date, mean_date(&candidate.sample_dates)) {
            (Some(target), Some(mean)) => temporal_weight(target, mean),
            _ => 1.0,
        };
        let score = similarity * weight;
        if score > best_score {
            best_score = score;
            best_name = Some(name);
        }
    }

    match best_name {
        Some(name) if best_score >= threshold => Identification::Match {
            name: name.to_string(),
            score: best_score,
        },
        _ => Identification::NoMatch { best_score },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use earshot_voicedb::{EmbeddingModelSpec, SampleType};

    fn candidate(name: &str, vector: Vec<f32>, dates: Vec<NaiveDate>) -> (String, CentroidRecord) {
        let dim = vector.len();
        (
            name.to_string(),
            CentroidRecord {
                speaker_name: name.to_string(),
                sample_type: SampleType::Speaker,
                short_name: name.split_whitespace().next().unwrap().to_string(),
                representative_sample_file: None,
                sample_count: dates.len().max(1) as u32,
                sample_dates: dates,
                centroid: vector,
                model: EmbeddingModelSpec::new("pyannote", "pyannote/embedding", dim, "3.1"),
            },
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn identical_vector_matches_at_any_threshold() {
        let candidates: BTreeMap<_, _> =
            [candidate("Matt Donnelly", vec![0.6, 0.8, 0.0], vec![])].into();
        let result = identify_embedding(&candidates, &[0.6, 0.8, 0.0], None, 1.0);
        assert_eq!(result.name(), Some("Matt Donnelly"));
        assert!((result.score() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vector_never_matches() {
        let candidates: BTreeMap<_, _> =
            [candidate("Matt Donnelly", vec![1.0, 0.0, 0.0], vec![])].into();
        let result = identify_embedding(&candidates, &[0.0, 1.0, 0.0], None, 0.01);
        assert!(!result.is_match());
        assert_eq!(result.score(), 0.0);
    }

    #[test]
    fn empty_candidates_score_zero() {
        let candidates = BTreeMap::new();
        let result = identify_embedding(&candidates, &[1.0, 0.0], None, 0.5);
        assert_eq!(result, Identification::NoMatch { best_score: 0.0 });
    }

    #[test]
    fn below_threshold_reports_best_score() {
        let candidates: BTreeMap<_, _> =
            [candidate("Matt Donnelly", vec![1.0, 1.0, 0.0], vec![])].into();
        let result = identify_embedding(&candidates, &[1.0, 0.0, 0.0], None, 0.9);
        assert!(!result.is_match());
        // cos(45°) ≈ 0.707.
        assert!((result.score() - 0.7071).abs() < 1e-3);
    }

    #[test]
    fn dimension_mismatched_candidates_are_skipped() {
        let candidates: BTreeMap<_, _> = [
            candidate("Dim192 Speaker", vec![0.1; 192], vec![]),
            candidate("Dim512 Speaker", vec![0.1; 512], vec![]),
        ]
        .into();
        let query = vec![0.1f32; 512];
        let result = identify_embedding(&candidates, &query, None, 0.5);
        assert_eq!(result.name(), Some("Dim512 Speaker"));

        let query = vec![0.1f32; 192];
        let result = identify_embedding(&candidates, &query, None, 0.5);
        assert_eq!(result.name(), Some("Dim192 Speaker"));
    }

    #[test]
    fn tie_breaks_to_first_name_in_sorted_order() {
        let v = vec![1.0f32, 0.0];
        let candidates: BTreeMap<_, _> = [
            candidate("Zeb Wells", v.clone(), vec![]),
            candidate("Adam Carolla", v.clone(), vec![]),
        ]
        .into();
        let result = identify_embedding(&candidates, &v, None, 0.5);
        assert_eq!(result.name(), Some("Adam Carolla"));
    }

    #[test]
    fn temporal_weight_is_one_at_zero_distance() {
        let d = date(2023, 6, 1);
        assert!((temporal_weight(d, d) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn temporal_weight_decays_monotonically_toward_half() {
        let mean = date(2020, 1, 1);
        let mut prev = f32::INFINITY;
        for years in 1..=20u64 {
            let target = mean
                .checked_add_days(chrono::Days::new(years * 365))
                .unwrap();
            let w = temporal_weight(target, mean);
            assert!(w < prev, "weight must strictly decrease");
            assert!(w > 0.5, "weight never reaches 0.5");
            prev = w;
        }
        // After 20 years the weight is within a hair of the 0.5 asymptote.
        assert!(prev < 0.51);
    }

    #[test]
    fn weighting_prefers_contemporary_enrollment() {
        let v = vec![1.0f32, 0.0];
        let candidates: BTreeMap<_, _> = [
            candidate("Old Era", v.clone(), vec![date(2010, 1, 1)]),
            candidate("Same Era", v.clone(), vec![date(2023, 6, 1)]),
        ]
        .into();
        let result = identify_embedding(&candidates, &v, Some(date(2023, 6, 1)), 0.5);
        assert_eq!(result.name(), Some("Same Era"));
    }

    #[test]
    fn no_dates_means_no_adjustment() {
        let v = vec![1.0f32, 0.0];
        let candidates: BTreeMap<_, _> = [candidate("Matt Donnelly", v.clone(), vec![])].into();
        let dated = identify_embedding(&candidates, &v, Some(date(2023, 6, 1)), 0.5);
        let undated = identify_embedding(&candidates, &v, None, 0.5);
        assert_eq!(dated.score(), undated.score());
    }

    #[test]
    fn mean_date_of_span() {
        let dates = vec![date(2023, 1, 1), date(2023, 6, 1), date(2024, 1, 1)];
        let mean = mean_date(&dates).unwrap();
        assert_eq!(mean, date(2023, 6, 22));
        assert_eq!(mean_date(&[]), None);
    }

    #[test]
    fn matt_scenario_same_era_query_matches_near_one() {
        // Three enrollments of the same voice across a year; the query is
        // the enrolled vector at the middle sample's own date.
        let v = vec![0.3f32, 0.5, 0.8];
        let dates = vec![date(2023, 1, 1), date(2023, 6, 1), date(2024, 1, 1)];
        let candidates: BTreeMap<_, _> = [candidate("Matt Donnelly", v.clone(), dates)].into();

        let result = identify_embedding(&candidates, &v, Some(date(2023, 6, 1)), 0.5);
        assert_eq!(result.name(), Some("Matt Donnelly"));
        // Mean sample date is 2023-06-22, 21 days off: weight ≈ 0.97.
        assert!(result.score() > 0.95);
    }
}
