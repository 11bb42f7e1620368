//! Test pattern generation
//!
//! Patterns are generated as RGB8 and then packed into whichever catalog
//! format a test needs.

use cmsbridge_core::PixelFormat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Test pattern types
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Horizontal gradient black to white
    GradientH,
    /// RGB color cube corners (8 colors)
    ColorCube,
    /// Grayscale ramp 0-255 across the whole image
    Grayscale,
    /// Random pixels with seed
    Random(u64),
    /// All zeros (black)
    Black,
    /// All 255 (white)
    White,
}

impl TestPattern {
    pub const ALL: [TestPattern; 6] = [
        TestPattern::GradientH,
        TestPattern::ColorCube,
        TestPattern::Grayscale,
        TestPattern::Random(42),
        TestPattern::Black,
        TestPattern::White,
    ];
}

/// Generate test pattern as RGB8 buffer
pub fn generate_rgb(pattern: TestPattern, width: usize, height: usize) -> Vec<u8> {
    let pixel_count = width * height;
    let mut data = vec![0u8; pixel_count * 3];

    match pattern {
        TestPattern::GradientH => {
            for (i, chunk) in data.chunks_exact_mut(3).enumerate() {
                let x = i % width;
                chunk.fill(((x as f32 / width as f32) * 255.0) as u8);
            }
        }
        TestPattern::ColorCube => {
            for (i, chunk) in data.chunks_exact_mut(3).enumerate() {
                let corner = i % 8;
                for (c, v) in chunk.iter_mut().enumerate() {
                    *v = if corner & (1 << c) != 0 { 255 } else { 0 };
                }
            }
        }
        TestPattern::Grayscale => {
            for (i, chunk) in data.chunks_exact_mut(3).enumerate() {
                chunk.fill(((i as f32 / pixel_count as f32) * 255.0) as u8);
            }
        }
        TestPattern::Random(seed) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.fill_bytes(&mut data);
        }
        TestPattern::Black => {
            // Already zeros
        }
        TestPattern::White => {
            data.fill(255);
        }
    }

    data
}

/// Generate a pattern packed as `format`.
///
/// Gray takes the green channel; alpha cycles through a few values so
/// alpha handling shows up in comparisons. CMYK is a naive complement of
/// RGB with no black generation.
pub fn generate_pixels(pattern: TestPattern, format: PixelFormat, width: usize, height: usize) -> Vec<u8> {
    let rgb = generate_rgb(pattern, width, height);
    let mut out = Vec::with_capacity(width * height * format.bytes_per_pixel());
    for (i, px) in rgb.chunks_exact(3).enumerate() {
        let (r, g, b) = (px[0], px[1], px[2]);
        let alpha = [255u8, 128, 0, 200][i % 4];
        match format {
            PixelFormat::Grey8 => out.push(g),
            PixelFormat::Bgr24 => out.extend_from_slice(&[b, g, r]),
            PixelFormat::Bgra32 => out.extend_from_slice(&[b, g, r, alpha]),
            PixelFormat::Pbgra32 => {
                let pm = |v: u8| ((u16::from(v) * u16::from(alpha) + 127) / 255) as u8;
                out.extend_from_slice(&[pm(b), pm(g), pm(r), alpha]);
            }
            PixelFormat::Cmyk32 => out.extend_from_slice(&[255 - r, 255 - g, 255 - b, 0]),
            PixelFormat::Cmyka40 => out.extend_from_slice(&[255 - r, 255 - g, 255 - b, 0, alpha]),
            PixelFormat::Cmyk64 | PixelFormat::Cmyka80 => {
                for v in [255 - r, 255 - g, 255 - b, 0] {
                    out.extend_from_slice(&(u16::from(v) * 257).to_ne_bytes());
                }
                if format.has_alpha() {
                    out.extend_from_slice(&(u16::from(alpha) * 257).to_ne_bytes());
                }
            }
            _ => unreachable!("unknown pixel format {format}"),
        }
    }
    out
}

/// Standard test sizes
pub mod sizes {
    pub const TINY: (usize, usize) = (8, 8);
    pub const SMALL: (usize, usize) = (64, 64);
    pub const MEDIUM: (usize, usize) = (256, 256);
    /// Not a multiple of any SIMD width
    pub const ODD: (usize, usize) = (100, 50);
}
