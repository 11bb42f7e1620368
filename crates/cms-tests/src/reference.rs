//! Reference transforms through the safe `lcms2` crate
//!
//! Both sides link the same lcms2 build, so differences point at the
//! bridge (format codes, flags, alpha handling) rather than the engine.

use anyhow::{Context, Result, bail};
use cmsbridge_core::PixelFormat as BridgeFormat;
use lcms2::{Intent, PixelFormat, Profile, Transform};

/// lcms2 pixel format for a catalog format
pub fn lcms2_format(format: BridgeFormat) -> Result<PixelFormat> {
    Ok(match format {
        BridgeFormat::Grey8 => PixelFormat::GRAY_8,
        BridgeFormat::Bgr24 => PixelFormat::BGR_8,
        BridgeFormat::Bgra32 => PixelFormat::BGRA_8,
        BridgeFormat::Cmyk32 => PixelFormat::CMYK_8,
        BridgeFormat::Cmyk64 => PixelFormat::CMYK_16,
        other => bail!("no lcms2 reference for {other}"),
    })
}

fn open(icc: Option<&[u8]>) -> Result<Profile> {
    match icc {
        Some(bytes) => Profile::new_icc(bytes).context("lcms2 profile"),
        None => Ok(Profile::new_srgb()),
    }
}

/// Transform using lcms2. A missing profile means lcms2's built-in sRGB.
///
/// Extra channels are not copied, so only color samples are comparable.
pub fn transform_lcms2(
    src_icc: Option<&[u8]>,
    src_format: BridgeFormat,
    dst_icc: Option<&[u8]>,
    dst_format: BridgeFormat,
    intent: Intent,
    src_pixels: &[u8],
) -> Result<Vec<u8>> {
    let src_profile = open(src_icc)?;
    let dst_profile = open(dst_icc)?;

    let transform = Transform::new(
        &src_profile,
        lcms2_format(src_format)?,
        &dst_profile,
        lcms2_format(dst_format)?,
        intent,
    )
    .context("lcms2 transform")?;

    let pixels = src_pixels.len() / src_format.bytes_per_pixel();
    let mut dst_pixels = vec![0u8; pixels * dst_format.bytes_per_pixel()];
    transform.transform_pixels(src_pixels, &mut dst_pixels);

    Ok(dst_pixels)
}

/// Float RGB transform using lcms2, three samples per pixel
pub fn transform_lcms2_rgb_f32(src_icc: &[u8], dst_icc: &[u8], intent: Intent, src: &[f32]) -> Result<Vec<f32>> {
    let src_profile = Profile::new_icc(src_icc).context("lcms2 src profile")?;
    let dst_profile = Profile::new_icc(dst_icc).context("lcms2 dst profile")?;

    let transform = Transform::<[f32; 3], [f32; 3]>::new(
        &src_profile,
        PixelFormat::RGB_FLT,
        &dst_profile,
        PixelFormat::RGB_FLT,
        intent,
    )
    .context("lcms2 float transform")?;

    let input: Vec<[f32; 3]> = src.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect();
    let mut output = vec![[0f32; 3]; input.len()];
    transform.transform_pixels(&input, &mut output);
    Ok(output.into_iter().flatten().collect())
}
