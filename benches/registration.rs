//! Benchmarks for joint histogram construction, similarity evaluation and resampling

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use iconic3d::{
    resample_cubic_spline, resample_with_sampler, AffineMatrix, CubicSplineVolume, Interpolation, JointHistogram,
    PaddedVolume, Similarity,
};
use ndarray::Array3;

const BINS: usize = 64;

fn binned_volume(size: usize) -> Array3<i16> {
    Array3::from_shape_fn((size, size, size), |(x, y, z)| ((x * 7 + y * 3 + z) % BINS) as i16)
}

fn small_rotation() -> AffineMatrix {
    let (s, c) = 0.05f64.sin_cos();
    AffineMatrix::new([[c, -s, 0.0, 0.3], [s, c, 0.0, -0.2], [0.0, 0.0, 1.0, 0.4]])
}

fn benchmark_joint_histogram(c: &mut Criterion) {
    let mut group = c.benchmark_group("joint_histogram");

    for size in [32, 64, 128].iter() {
        let source = binned_volume(*size);
        let target = PaddedVolume::from_volume(&source.view());
        let affine = small_rotation();
        let mut hist = JointHistogram::new(BINS, BINS);

        group.throughput(Throughput::Elements((*size as u64).pow(3)));

        for interp in [
            Interpolation::PartialVolume,
            Interpolation::Trilinear,
            Interpolation::Random { seed: 1 },
        ] {
            group.bench_with_input(BenchmarkId::new(interp.to_string(), size), &size, |b, _| {
                b.iter(|| {
                    hist.build(&source.view(), &target, &affine, interp).unwrap();
                    black_box(hist.total_mass())
                })
            });

            #[cfg(feature = "parallel")]
            group.bench_with_input(BenchmarkId::new(format!("{interp}_parallel"), size), &size, |b, _| {
                b.iter(|| {
                    hist.build_parallel(&source.view(), &target, &affine, interp).unwrap();
                    black_box(hist.total_mass())
                })
            });
        }
    }

    group.finish();
}

fn benchmark_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");

    let source = binned_volume(64);
    let target = PaddedVolume::from_volume(&source.view());
    let mut hist = JointHistogram::new(BINS, BINS);
    hist.build(&source.view(), &target, &small_rotation(), Interpolation::PartialVolume)
        .unwrap();
    let reference = hist.view().to_owned();

    for measure in Similarity::ALL {
        group.bench_function(measure.name(), |b| {
            b.iter(|| black_box(hist.evaluate(measure, Some(&reference.view())).unwrap()))
        });
    }

    group.finish();
}

fn benchmark_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample_cubic_spline");

    for size in [32, 64].iter() {
        let input = Array3::from_shape_fn((*size, *size, *size), |(x, y, z)| {
            ((x * 100 + y * 10 + z) % 256) as f32 / 255.0
        });
        let affine = small_rotation();

        group.throughput(Throughput::Elements((*size as u64).pow(3)));

        // Includes the spline prefilter
        group.bench_with_input(BenchmarkId::new("full", size), &size, |b, _| {
            b.iter(|| {
                let mut output = Array3::<f32>::zeros((*size, *size, *size));
                resample_cubic_spline(&mut output.view_mut(), &input.view(), &affine).unwrap();
                black_box(output)
            })
        });

        let spline = CubicSplineVolume::from_volume(&input.view());
        group.bench_with_input(BenchmarkId::new("sample_only", size), &size, |b, _| {
            b.iter(|| {
                let mut output = Array3::<f32>::zeros((*size, *size, *size));
                resample_with_sampler(&mut output.view_mut(), &spline, &affine).unwrap();
                black_box(output)
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_joint_histogram,
    benchmark_similarity,
    benchmark_resample
);
criterion_main!(benches);
