//! Test profiles
//!
//! Built at runtime through the safe `lcms2` crate so the tests need no
//! binary fixtures.

use anyhow::{Context, Result};
use lcms2::{CIExyY, CIExyYTRIPLE, Profile, ToneCurve};

/// sRGB transfer function parameters (ICC parametric type 4)
const SRGB_CURVE: [f64; 5] = [2.4, 1.0 / 1.055, 0.055 / 1.055, 1.0 / 12.92, 0.04045];

const D65: CIExyY = CIExyY {
    x: 0.3127,
    y: 0.3290,
    Y: 1.0,
};

fn rgb_profile(primaries: [(f64, f64); 3], curve: &ToneCurve) -> Result<Vec<u8>> {
    let [r, g, b] = primaries;
    let triple = CIExyYTRIPLE {
        Red: CIExyY { x: r.0, y: r.1, Y: 1.0 },
        Green: CIExyY { x: g.0, y: g.1, Y: 1.0 },
        Blue: CIExyY { x: b.0, y: b.1, Y: 1.0 },
    };
    let profile = Profile::new_rgb(&D65, &triple, &[curve, curve, curve]).context("lcms2 new_rgb")?;
    profile.icc().context("lcms2 icc")
}

/// Display P3: DCI-P3 primaries, D65 white, sRGB tone curve
pub fn display_p3_icc() -> Result<Vec<u8>> {
    let curve = ToneCurve::new_parametric(4, &SRGB_CURVE).context("tone curve")?;
    rgb_profile([(0.680, 0.320), (0.265, 0.690), (0.150, 0.060)], &curve)
}

/// Rec. 709 primaries with a linear tone curve
pub fn linear_rec709_icc() -> Result<Vec<u8>> {
    let curve = ToneCurve::new(1.0);
    rgb_profile([(0.640, 0.330), (0.300, 0.600), (0.150, 0.060)], &curve)
}

/// Gray with a plain 2.2 gamma
pub fn gray_gamma22_icc() -> Result<Vec<u8>> {
    let curve = ToneCurve::new(2.2);
    let profile = Profile::new_gray(&D65, &curve).context("lcms2 new_gray")?;
    profile.icc().context("lcms2 icc")
}

/// Same profile with a different header creator, so it hashes to a new key
pub fn creator_variant(icc: &[u8], creator: u32) -> Vec<u8> {
    let mut bytes = icc.to_vec();
    bytes[80..84].copy_from_slice(&creator.to_be_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_are_icc() {
        for icc in [display_p3_icc(), linear_rec709_icc(), gray_gamma22_icc()] {
            let icc = icc.unwrap();
            assert!(icc.len() > 128);
            assert_eq!(&icc[36..40], b"acsp");
        }
    }

    #[test]
    fn test_creator_variant_changes_bytes() {
        let p3 = display_p3_icc().unwrap();
        let v = creator_variant(&p3, 7);
        assert_eq!(p3.len(), v.len());
        assert_ne!(p3, v);
    }
}
