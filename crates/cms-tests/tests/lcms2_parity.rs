//! Parity tests against lcms2
//!
//! The bridge and the safe `lcms2` crate drive the same engine. Output is
//! allowed one code value of slack where the two pick different format
//! pairs; anything larger points at format codes, flags or alpha handling
//! in the bridge.

use cms_tests::compare_buffers;
use cms_tests::fixtures::{display_p3_icc, gray_gamma22_icc, linear_rec709_icc};
use cms_tests::parity::compare_channels;
use cms_tests::patterns::{TestPattern, generate_pixels, sizes};
use cms_tests::reference::transform_lcms2;
use cmsbridge_core::{PixelFormat, ProfileCache, RenderingIntent, TransformOptions};
use lcms2::Intent;

fn bridge_convert(
    cache: &ProfileCache,
    src_icc: Option<&[u8]>,
    src_format: PixelFormat,
    dst_icc: Option<&[u8]>,
    dst_format: PixelFormat,
    options: TransformOptions,
    input: &[u8],
) -> Vec<u8> {
    let src = src_icc.map(|b| cache.get_or_add(b).unwrap());
    let dst = dst_icc.map(|b| cache.get_or_add(b).unwrap());
    let session = cache
        .create_transform(src.as_ref(), src_format, dst.as_ref(), dst_format, options)
        .unwrap();
    let mut out = vec![0u8; session.dst_len_for(input.len())];
    session.convert(input, &mut out).unwrap();
    out
}

/// Compare bridge and lcms2 for the sRGB identity on every pattern
#[test]
fn test_srgb_identity_parity() {
    let cache = ProfileCache::with_defaults().unwrap();
    let srgb = cache.srgb().bytes().to_vec();

    for pattern in TestPattern::ALL {
        let (w, h) = sizes::SMALL;
        let input = generate_pixels(pattern, PixelFormat::Bgr24, w, h);

        // Explicit bytes on one side so the bridge does not short-circuit
        let ours = bridge_convert(
            &cache,
            Some(&srgb),
            PixelFormat::Bgr24,
            None,
            PixelFormat::Bgra32,
            TransformOptions::default(),
            &input,
        );
        let reference =
            transform_lcms2(None, PixelFormat::Bgr24, None, PixelFormat::Bgr24, Intent::Perceptual, &input).unwrap();

        let stats = compare_channels(&reference, 3, &ours, 4, 3);
        assert!(stats.is_acceptable(), "Pattern {pattern:?}: {stats}");
    }
}

/// Wide-gamut to sRGB at several sizes
#[test]
fn test_p3_to_srgb_parity() {
    let cache = ProfileCache::with_defaults().unwrap();
    let p3 = display_p3_icc().unwrap();

    for (w, h) in [sizes::TINY, sizes::SMALL, sizes::ODD, sizes::MEDIUM] {
        let input = generate_pixels(TestPattern::Random(w as u64), PixelFormat::Bgr24, w, h);
        let ours = bridge_convert(
            &cache,
            Some(&p3),
            PixelFormat::Bgr24,
            None,
            PixelFormat::Bgr24,
            TransformOptions::default(),
            &input,
        );
        let reference =
            transform_lcms2(Some(&p3), PixelFormat::Bgr24, None, PixelFormat::Bgr24, Intent::Perceptual, &input)
                .unwrap();

        let stats = compare_buffers(&reference, &ours);
        assert!(stats.is_acceptable(), "{w}x{h}: {stats}");
    }
}

#[test]
fn test_intents_parity() {
    let cache = ProfileCache::with_defaults().unwrap();
    let linear = linear_rec709_icc().unwrap();
    let (w, h) = sizes::SMALL;
    let input = generate_pixels(TestPattern::Random(99), PixelFormat::Bgr24, w, h);

    for (ours, theirs) in [
        (RenderingIntent::Perceptual, Intent::Perceptual),
        (RenderingIntent::RelativeColorimetric, Intent::RelativeColorimetric),
        (RenderingIntent::Saturation, Intent::Saturation),
        (RenderingIntent::AbsoluteColorimetric, Intent::AbsoluteColorimetric),
    ] {
        let out = bridge_convert(
            &cache,
            None,
            PixelFormat::Bgr24,
            Some(&linear),
            PixelFormat::Bgr24,
            TransformOptions::default().with_intent(ours),
            &input,
        );
        let reference =
            transform_lcms2(None, PixelFormat::Bgr24, Some(&linear), PixelFormat::Bgr24, theirs, &input).unwrap();
        let stats = compare_buffers(&reference, &out);
        assert!(stats.is_acceptable(), "{ours:?}: {stats}");
    }
}

#[test]
fn test_gray_to_bgr_parity() {
    let cache = ProfileCache::with_defaults().unwrap();
    let gray = gray_gamma22_icc().unwrap();
    let (w, h) = sizes::SMALL;
    let input = generate_pixels(TestPattern::GradientH, PixelFormat::Grey8, w, h);

    let ours = bridge_convert(
        &cache,
        Some(&gray),
        PixelFormat::Grey8,
        None,
        PixelFormat::Bgr24,
        TransformOptions::default(),
        &input,
    );
    let reference =
        transform_lcms2(Some(&gray), PixelFormat::Grey8, None, PixelFormat::Bgr24, Intent::Perceptual, &input).unwrap();
    let stats = compare_buffers(&reference, &ours);
    assert!(stats.is_acceptable(), "{stats}");
}

/// lcms2 leaves extra channels alone without COPY_ALPHA, so only color is
/// compared; alpha is checked against the source.
#[test]
fn test_bgra_alpha_parity() {
    let cache = ProfileCache::with_defaults().unwrap();
    let p3 = display_p3_icc().unwrap();
    let (w, h) = sizes::TINY;
    let input = generate_pixels(TestPattern::ColorCube, PixelFormat::Bgra32, w, h);

    let ours = bridge_convert(
        &cache,
        Some(&p3),
        PixelFormat::Bgra32,
        None,
        PixelFormat::Bgra32,
        TransformOptions::default(),
        &input,
    );
    let reference =
        transform_lcms2(Some(&p3), PixelFormat::Bgra32, None, PixelFormat::Bgra32, Intent::Perceptual, &input)
            .unwrap();

    let stats = compare_channels(&reference, 4, &ours, 4, 3);
    assert!(stats.is_acceptable(), "{stats}");
    for (src, out) in input.chunks_exact(4).zip(ours.chunks_exact(4)) {
        assert_eq!(src[3], out[3]);
    }
}
