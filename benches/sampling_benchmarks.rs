//! Benchmarks for the sampling decision and, when a fixture is present,
//! full extraction runs.
//!
//! Run with: cargo bench
//! Run with all features: cargo bench --all-features

use std::{hint::black_box, path::Path, time::Duration};

use birdcam::{
    ExtractOptions, FfmpegLogLevel, FramePosition, FrameExtractor, OutputFormat, Sampler,
    SamplingInterval,
};
use criterion::Criterion;

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";

/// One hour of 25 fps positions.
fn positions() -> Vec<FramePosition> {
    (0..90_000_u64)
        .map(|index| FramePosition {
            index,
            timestamp: Duration::from_millis(index * 40),
        })
        .collect()
}

fn benchmark_sampler(criterion: &mut Criterion) {
    let positions = positions();

    criterion.bench_function("sampler: every 2s over one hour", |bencher| {
        bencher.iter(|| {
            let mut sampler =
                Sampler::new(SamplingInterval::Every(Duration::from_secs(2)), Duration::ZERO)
                    .unwrap();
            black_box(
                positions
                    .iter()
                    .filter(|position| sampler.should_emit(position))
                    .count(),
            )
        });
    });

    criterion.bench_function("sampler: every 25th frame over one hour", |bencher| {
        bencher.iter(|| {
            let mut sampler =
                Sampler::new(SamplingInterval::EveryNthFrame(25), Duration::ZERO).unwrap();
            black_box(
                positions
                    .iter()
                    .filter(|position| sampler.should_emit(position))
                    .count(),
            )
        });
    });

    criterion.bench_function("sampler: 10 min start offset", |bencher| {
        bencher.iter(|| {
            let mut sampler = Sampler::new(
                SamplingInterval::Every(Duration::from_secs(5)),
                Duration::from_secs(600),
            )
            .unwrap();
            black_box(
                positions
                    .iter()
                    .filter(|position| sampler.should_emit(position))
                    .count(),
            )
        });
    });
}

fn benchmark_extraction(criterion: &mut Criterion) {
    birdcam::set_ffmpeg_log_level(FfmpegLogLevel::Error);

    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping extraction benchmarks: fixture not found");
        return;
    }

    let mut group = criterion.benchmark_group("extraction");
    group.sample_size(10);

    for (name, format) in [
        ("jpeg", OutputFormat::Jpeg { quality: 90 }),
        ("png", OutputFormat::Png),
    ] {
        group.bench_function(format!("every 1s as {name}"), |bencher| {
            bencher.iter(|| {
                let output = tempfile::tempdir().unwrap();
                let options = ExtractOptions::new()
                    .with_sampling(SamplingInterval::Every(Duration::from_secs(1)))
                    .with_output_format(format);
                FrameExtractor::extract(SAMPLE_VIDEO, output.path(), &options).unwrap()
            });
        });
    }

    group.bench_function("every 10th frame at 320px", |bencher| {
        bencher.iter(|| {
            let output = tempfile::tempdir().unwrap();
            let options = ExtractOptions::new()
                .with_sampling(SamplingInterval::EveryNthFrame(10))
                .with_resolution(Some(320), None);
            FrameExtractor::extract(SAMPLE_VIDEO, output.path(), &options).unwrap()
        });
    });

    group.finish();
}

criterion::criterion_group!(benches, benchmark_sampler, benchmark_extraction);
criterion::criterion_main!(benches);
