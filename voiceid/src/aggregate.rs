use chrono::NaiveDate;

use earshot_voicedb::MAX_SAMPLE_DATES;

/// Result of folding one sample into a running-mean centroid.
#[derive(Debug, Clone)]
pub struct FoldOutcome {
    pub centroid: Vec<f32>,
    pub sample_count: u32,
    /// True when the previous centroid was discarded because its dimension
    /// disagreed with the incoming vector (backend/model migration path).
    pub reset: bool,
}

/// Folds a new sample vector into a speaker's running centroid:
/// `new = (old * n + sample) / (n + 1)`.
///
/// O(dim) per update; an approximation of the true mean that matches the
/// authoritative rebuild exactly when samples are added in order to an
/// empty store (floating rounding aside). A dimension mismatch discards
/// the old centroid and restarts with the sample as sole member.
///
/// There is no inverse: removing a sample's contribution requires a full
/// rebuild from stored samples.
pub fn fold_sample(existing: Option<(&[f32], u32)>, sample: &[f32]) -> FoldOutcome {
    match existing {
        Some((centroid, n)) if centroid.len() == sample.len() && n > 0 => {
            let nf = n as f64;
            let folded = centroid
                .iter()
                .zip(sample.iter())
                .map(|(&c, &s)| (((c as f64) * nf + s as f64) / (nf + 1.0)) as f32)
                .collect();
            FoldOutcome {
                centroid: folded,
                sample_count: n + 1,
                reset: false,
            }
        }
        Some((centroid, _)) => {
            if centroid.len() != sample.len() {
                tracing::warn!(
                    old_dim = centroid.len(),
                    new_dim = sample.len(),
                    "centroid dimension mismatch, restarting running mean"
                );
            }
            FoldOutcome {
                centroid: sample.to_vec(),
                sample_count: 1,
                reset: true,
            }
        }
        None => FoldOutcome {
            centroid: sample.to_vec(),
            sample_count: 1,
            reset: false,
        },
    }
}

/// Appends a sample date to the bounded history: kept sorted, most recent
/// [`MAX_SAMPLE_DATES`] retained, oldest evicted first.
pub fn push_sample_date(dates: &mut Vec<NaiveDate>, date: NaiveDate) {
    dates.push(date);
    dates.sort_unstable();
    if dates.len() > MAX_SAMPLE_DATES {
        let excess = dates.len() - MAX_SAMPLE_DATES;
        dates.drain(..excess);
    }
}

/// Arithmetic mean of equally-sized vectors with f64 accumulation.
/// Returns `None` for an empty input or inconsistent dimensions.
pub fn mean_vector(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    if vectors.iter().any(|v| v.len() != dim) {
        return None;
    }
    let mut sum = vec![0.0f64; dim];
    for v in vectors {
        for (acc, &x) in sum.iter_mut().zip(v.iter()) {
            *acc += x as f64;
        }
    }
    let n = vectors.len() as f64;
    Some(sum.into_iter().map(|s| (s / n) as f32).collect())
}
