//! Conversion Benchmarks
//!
//! Per-call overhead of the bridge: profile cache lookups, session creation
//! and pixel conversion through sessions and pixel sources.

use std::sync::Arc;

use cmsbridge_core::{
    BufferPixelSource, PixelArea, PixelFormat, PixelSource, PixelSourceExt, ProfileCache, TransformFactory,
    TransformOptions,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

const PIXEL_COUNTS: &[usize] = &[16, 4096, 262144];

fn generate_bgr(count: usize) -> Vec<u8> {
    (0..count * 3).map(|i| ((i * 37) % 256) as u8).collect()
}

// ============================================================================
// Profile cache
// ============================================================================

fn bench_cache_hit(c: &mut Criterion) {
    let cache = ProfileCache::with_defaults().unwrap();
    let srgb = cache.srgb().bytes().to_vec();

    c.bench_function("cache_hit_srgb", |b| {
        b.iter(|| cache.get_or_add(black_box(&srgb)).unwrap())
    });
}

fn bench_session_create(c: &mut Criterion) {
    let cache = ProfileCache::with_defaults().unwrap();

    c.bench_function("session_create_bgr_to_bgra", |b| {
        b.iter(|| {
            cache
                .create_transform(
                    None,
                    black_box(PixelFormat::Bgr24),
                    None,
                    PixelFormat::Bgra32,
                    TransformOptions::default(),
                )
                .unwrap()
        })
    });
}

// ============================================================================
// Pixel conversion
// ============================================================================

fn bench_session_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_convert");
    let cache = ProfileCache::with_defaults().unwrap();
    let session = cache
        .create_transform(None, PixelFormat::Bgr24, None, PixelFormat::Bgra32, TransformOptions::default())
        .unwrap();

    for &count in PIXEL_COUNTS {
        group.throughput(Throughput::Elements(count as u64));
        let input = generate_bgr(count);
        let mut output = vec![0u8; count * 4];

        group.bench_with_input(BenchmarkId::new("bgr24_to_bgra32", count), &count, |b, _| {
            b.iter(|| session.convert(black_box(&input), black_box(&mut output)).unwrap())
        });
    }
    group.finish();
}

fn bench_pixel_source(c: &mut Criterion) {
    let mut group = c.benchmark_group("conversion_transform");
    let factory = TransformFactory::new(Arc::new(ProfileCache::with_defaults().unwrap()));

    for &(width, height) in &[(64u32, 64u32), (1024, 256)] {
        let pixels = (width * height) as usize;
        group.throughput(Throughput::Elements(pixels as u64));
        let source = BufferPixelSource::new(width, height, PixelFormat::Bgr24, generate_bgr(pixels)).unwrap();
        let mut conv = factory
            .create_conversion_transform(source, PixelFormat::Bgra32, None, None)
            .unwrap();
        let stride = width as usize * 4;
        let mut output = vec![0u8; stride * height as usize];

        group.bench_function(BenchmarkId::new("bgr24_to_bgra32", format!("{width}x{height}")), |b| {
            b.iter(|| {
                conv.copy_pixels(PixelArea::full(conv.width(), conv.height()), stride, black_box(&mut output))
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_cache_hit,
    bench_session_create,
    bench_session_convert,
    bench_pixel_source
);
criterion_main!(benches);
