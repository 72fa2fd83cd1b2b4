//! Conditional sampling throughput benchmarks.
//!
//! Benchmarks the two sampling strategies on a synthetic mixed-width layout:
//! - **balanced_sweep**: inverse-CDF draws against the smoothed
//!   distributions — sensitive to the widest column's category count.
//! - **empirical_sweep**: uniform draws from the recorded per-row
//!   assignments — sensitive only to batch size.
//!
//! # Running
//!
//! ```sh
//! cargo bench --bench condvec_throughput
//! ```

use condtab::common::{EncodedMatrix, Segment};
use condtab::sampler::CondSampler;
use criterion::{BenchmarkId, Criterion, Throughput};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

// ============================================================================
// Test data generators
// ============================================================================

/// Build a fitted sampler over a synthetic 10k-row matrix with a mix of
/// narrow and wide categorical columns plus two continuous features (whose
/// mode selectors are excluded from modeling).
fn synthetic_sampler() -> CondSampler {
    let layout = vec![
        Segment::continuous(1),
        Segment::categorical(4), // mode selector, excluded
        Segment::continuous(1),
        Segment::categorical(4), // mode selector, excluded
        Segment::categorical(2),
        Segment::categorical(8),
        Segment::categorical(32),
    ];
    let num_rows = 10_000;
    let num_cols: usize = layout.iter().map(|s| s.width).sum();

    let mut rng = SmallRng::seed_from_u64(0xC0DEC0DE);
    let mut values = vec![0.0f32; num_rows * num_cols];
    for row in 0..num_rows {
        let base = row * num_cols;
        let mut cursor = 0;
        for segment in &layout {
            match segment.kind {
                condtab::common::SegmentKind::Continuous => {
                    values[base + cursor] = rng.random::<f32>() * 2.0 - 1.0;
                }
                condtab::common::SegmentKind::Categorical => {
                    // Skewed picks: squaring the uniform draw biases toward
                    // low category indices, like real categorical data.
                    let u: f64 = rng.random();
                    let cat = ((u * u * segment.width as f64) as usize).min(segment.width - 1);
                    values[base + cursor + cat] = 1.0;
                }
            }
            cursor += segment.width;
        }
    }

    let matrix = EncodedMatrix::new(values, num_rows, num_cols).unwrap();
    CondSampler::fit(&matrix, &layout).unwrap()
}

// ============================================================================
// Sampling benchmarks
// ============================================================================

fn bench_balanced_sweep(c: &mut Criterion) {
    let sampler = synthetic_sampler();
    let mut rng = SmallRng::seed_from_u64(42);

    let mut group = c.benchmark_group("balanced_sweep");
    group.sample_size(100);
    group.noise_threshold(0.05);

    for batch in [64usize, 256, 1024, 4096] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(
            BenchmarkId::new("sample_balanced", batch),
            &batch,
            |b, &batch| {
                b.iter(|| sampler.sample_balanced(&mut rng, batch).unwrap().unwrap());
            },
        );
    }
    group.finish();
}

fn bench_empirical_sweep(c: &mut Criterion) {
    let sampler = synthetic_sampler();
    let mut rng = SmallRng::seed_from_u64(43);

    let mut group = c.benchmark_group("empirical_sweep");
    group.sample_size(100);
    group.noise_threshold(0.05);

    for batch in [64usize, 256, 1024, 4096] {
        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(
            BenchmarkId::new("sample_empirical", batch),
            &batch,
            |b, &batch| {
                b.iter(|| sampler.sample_empirical(&mut rng, batch).unwrap().unwrap());
            },
        );
    }
    group.finish();
}

// ============================================================================
// Criterion main
// ============================================================================

fn main() {
    let mut criterion = Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(2))
        .measurement_time(std::time::Duration::from_secs(5))
        .configure_from_args();

    bench_balanced_sweep(&mut criterion);
    bench_empirical_sweep(&mut criterion);

    criterion.final_summary();
}
