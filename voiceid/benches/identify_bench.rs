use std::collections::BTreeMap;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use earshot_voicedb::{CentroidRecord, EmbeddingModelSpec, SampleType};
use earshot_voiceid::identify_embedding;

fn random_unit_vec(dim: usize, seed: u64) -> Vec<f32> {
    let mut v = Vec::with_capacity(dim);
    let mut state = seed;
    for _ in 0..dim {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        v.push(((state >> 33) as f32) / (u32::MAX as f32) - 0.5);
    }
    let norm: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        let s = (1.0 / norm) as f32;
        for x in &mut v {
            *x *= s;
        }
    }
    v
}

fn make_candidates(dim: usize, n: usize) -> BTreeMap<String, CentroidRecord> {
    let model = EmbeddingModelSpec::new("pyannote", "pyannote/embedding", dim, "3.1");
    (0..n)
        .map(|i| {
            let name = format!("Speaker {i:03}");
            (
                name.clone(),
                CentroidRecord {
                    speaker_name: name,
                    sample_type: SampleType::Speaker,
                    short_name: format!("S{i:03}"),
                    representative_sample_file: None,
                    sample_count: 5,
                    sample_dates: vec![],
                    centroid: random_unit_vec(dim, i as u64 + 1),
                    model: model.clone(),
                },
            )
        })
        .collect()
}

fn bench_identify(c: &mut Criterion) {
    let dim = 512;
    let candidates = make_candidates(dim, 50);
    let query = random_unit_vec(dim, 999);

    c.bench_function("identify_512d_50speakers", |b| {
        b.iter(|| {
            let _ = black_box(identify_embedding(
                black_box(&candidates),
                black_box(&query),
                None,
                0.5,
            ));
        });
    });
}

criterion_group!(benches, bench_identify);
criterion_main!(benches);
