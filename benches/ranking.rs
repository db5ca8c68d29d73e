use alignment_search::corpus::{Corpus, MetadataRecord};
use alignment_search::retrieval::rank;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

const ENTRIES: usize = 10_000;
const DIMENSION: usize = 1536;

/// Deterministic pseudo-random unit vectors so runs are comparable.
fn unit_vectors(count: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut state = seed;
    (0..count)
        .map(|_| {
            let raw: Vec<f32> = (0..DIMENSION)
                .map(|_| {
                    state = state
                        .wrapping_mul(6_364_136_223_846_793_005)
                        .wrapping_add(1_442_695_040_888_963_407);
                    ((state >> 40) as f32 / (1u64 << 24) as f32) - 0.5
                })
                .collect();
            let norm = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
            raw.into_iter().map(|x| x / norm).collect()
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let corpus = Corpus::new(
        unit_vectors(ENTRIES, 7),
        (0..ENTRIES).map(|i| format!("block {i}")).collect(),
        (0..ENTRIES).map(|i| i % 100).collect(),
        (0..100)
            .map(|i| MetadataRecord {
                title: format!("Document {i}"),
                authors: vec!["Author".to_string()],
                date_published: "2023-01-01".to_string(),
                url: format!("https://example.com/{i}"),
                tags: String::new(),
            })
            .collect(),
    )
    .expect("valid corpus");
    let query = unit_vectors(1, 42).remove(0);

    c.bench_function("rank_top4_10k", |b| {
        b.iter(|| rank(black_box(&corpus), black_box(&query), black_box(4)))
    });
    c.bench_function("rank_top50_10k", |b| {
        b.iter(|| rank(black_box(&corpus), black_box(&query), black_box(50)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
