//! Color Transform operations
//!
//! A [`TransformSession`] owns one lcms2 transform handle and an `Arc` to
//! each profile it was built from. Sessions can move between threads but
//! not be shared by them.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use bitflags::bitflags;

use crate::bridge;
use crate::cache::ProfileCache;
use crate::context::NativeContext;
use crate::ffi::lcms::{
    cmsCreateTransformTHR, cmsDeleteTransform, cmsDoTransform, cmsFLAGS_BLACKPOINTCOMPENSATION,
    cmsFLAGS_COPY_ALPHA, cmsFLAGS_HIGHRESPRECALC, cmsFLAGS_NOCACHE, cmsFLAGS_NOOPTIMIZE,
    cmsHTRANSFORM,
};
use crate::format::{AlphaSlot, FormatDesc, PixelFormat};
use crate::profile::ColorProfile;
use crate::types::RenderingIntent;
use crate::{Error, Result};

// Keeps every cmsDoTransform pixel count well inside u32.
const MAX_CHUNK_PIXELS: usize = 1 << 24;

bitflags! {
    /// lcms2 transform flags the bridge exposes
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransformFlags: u32 {
        const BLACK_POINT_COMPENSATION = cmsFLAGS_BLACKPOINTCOMPENSATION;
        /// Skip the one-pixel result cache
        const NO_CACHE = cmsFLAGS_NOCACHE;
        const NO_OPTIMIZE = cmsFLAGS_NOOPTIMIZE;
        const HIGH_RES_PRECALC = cmsFLAGS_HIGHRESPRECALC;
    }
}

/// Options for transform creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformOptions {
    /// Rendering intent
    pub intent: RenderingIntent,
    pub flags: TransformFlags,
}

impl TransformOptions {
    pub fn with_intent(mut self, intent: RenderingIntent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_flags(mut self, flags: TransformFlags) -> Self {
        self.flags = flags;
        self
    }
}

struct NativeTransform {
    raw: cmsHTRANSFORM,
    _context: Arc<NativeContext>,
}

// lcms2 transforms may be used from any thread, one at a time.
unsafe impl Send for NativeTransform {}

impl Drop for NativeTransform {
    fn drop(&mut self) {
        // SAFETY: raw was created by us and is deleted exactly once.
        unsafe { cmsDeleteTransform(self.raw) };
    }
}

enum SessionKind {
    /// Same format and profile on both sides: a byte copy
    Identity,
    Native(NativeTransform),
}

/// A live conversion between two profile/format pairs
pub struct TransformSession {
    kind: SessionKind,
    src: FormatDesc,
    dst: FormatDesc,
    src_profile: Option<Arc<ColorProfile>>,
    dst_profile: Option<Arc<ColorProfile>>,
    _not_sync: PhantomData<Cell<()>>,
}

impl TransformSession {
    pub(crate) fn build(
        cache: &ProfileCache,
        src_profile: Option<Arc<ColorProfile>>,
        src: FormatDesc,
        dst_profile: Option<Arc<ColorProfile>>,
        dst: FormatDesc,
        options: TransformOptions,
    ) -> Result<Self> {
        let same_profile = match (&src_profile, &dst_profile) {
            (None, None) => true,
            (Some(a), Some(b)) => a.key() == b.key(),
            _ => false,
        };
        if src == dst && same_profile {
            tracing::debug!(format = src.code, "identity transform session");
            return Ok(Self::new(SessionKind::Identity, src, dst, src_profile, dst_profile));
        }

        if (src.premultiplied || dst.premultiplied) && !cache.context().supports_premultiplied() {
            return Err(Error::UnsupportedFormat(format!(
                "premultiplied alpha needs lcms2 2.13 or later, found {}",
                cache.context().version()
            )));
        }

        let src_profile = resolve_profile(cache, src_profile, &src)?;
        let dst_profile = resolve_profile(cache, dst_profile, &dst)?;
        if src == dst && src_profile.key() == dst_profile.key() {
            return Ok(Self::new(SessionKind::Identity, src, dst, Some(src_profile), Some(dst_profile)));
        }

        let mut flags = options.flags.bits();
        if src.alpha.is_some() && dst.alpha.is_some() {
            flags |= cmsFLAGS_COPY_ALPHA;
        }
        let context = cache.context().clone();
        bridge::clear_last_error();
        let raw = ColorProfile::with_pair(&src_profile, &dst_profile, |s, d| {
            // SAFETY: both profiles are locked and live; lcms2 copies what it
            // needs, so the transform does not borrow them.
            unsafe {
                cmsCreateTransformTHR(
                    context.raw(),
                    s.raw(),
                    src.code,
                    d.raw(),
                    dst.code,
                    options.intent.to_lcms(),
                    flags,
                )
            }
        });
        if raw.is_null() {
            return Err(Error::native("cmsCreateTransformTHR"));
        }
        tracing::debug!(
            src = %src_profile.key(),
            dst = %dst_profile.key(),
            src_format = src.code,
            dst_format = dst.code,
            intent = ?options.intent,
            flags,
            "created transform session"
        );

        let native = NativeTransform {
            raw,
            _context: context,
        };
        Ok(Self::new(
            SessionKind::Native(native),
            src,
            dst,
            Some(src_profile),
            Some(dst_profile),
        ))
    }

    fn new(
        kind: SessionKind,
        src: FormatDesc,
        dst: FormatDesc,
        src_profile: Option<Arc<ColorProfile>>,
        dst_profile: Option<Arc<ColorProfile>>,
    ) -> Self {
        Self {
            kind,
            src,
            dst,
            src_profile,
            dst_profile,
            _not_sync: PhantomData,
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.kind, SessionKind::Identity)
    }

    /// Whether this session was built for exactly these pixel formats
    pub fn converts(&self, src: PixelFormat, dst: PixelFormat) -> bool {
        self.src.code == src.lcms_type() && self.dst.code == dst.lcms_type()
    }

    pub fn src_bytes_per_pixel(&self) -> usize {
        self.src.bytes_per_pixel
    }

    pub fn dst_bytes_per_pixel(&self) -> usize {
        self.dst.bytes_per_pixel
    }

    /// Profile on the source side; `None` only for identity sessions built
    /// without profiles
    pub fn src_profile(&self) -> Option<&Arc<ColorProfile>> {
        self.src_profile.as_ref()
    }

    pub fn dst_profile(&self) -> Option<&Arc<ColorProfile>> {
        self.dst_profile.as_ref()
    }

    /// Destination bytes needed for `src_len` source bytes. A trailing
    /// partial pixel is ignored.
    pub fn dst_len_for(&self, src_len: usize) -> usize {
        src_len / self.src.bytes_per_pixel * self.dst.bytes_per_pixel
    }

    /// Convert every whole pixel in `src` into `dst`.
    ///
    /// Fails with [`Error::BufferTooSmall`] before writing anything if `dst`
    /// cannot hold the result. Bytes past the converted length are left
    /// untouched.
    pub fn convert(&self, src: &[u8], dst: &mut [u8]) -> Result<()> {
        let pixels = src.len() / self.src.bytes_per_pixel;
        let needed = pixels * self.dst.bytes_per_pixel;
        if dst.len() < needed {
            return Err(Error::BufferTooSmall {
                expected: needed,
                actual: dst.len(),
            });
        }
        self.convert_pixels(
            &src[..pixels * self.src.bytes_per_pixel],
            &mut dst[..needed],
            pixels,
        );
        Ok(())
    }

    /// Float variant used by the libjxl bridge; lengths in samples.
    pub(crate) fn convert_f32(&self, src: &[f32], dst: &mut [f32]) -> Result<()> {
        self.convert(bytemuck::cast_slice(src), bytemuck::cast_slice_mut(dst))
    }

    /// Convert as many whole pixels as fit in both buffers, with no error
    /// path. Used on the per-scanline hot path after the caller validated
    /// sizes once.
    pub(crate) fn convert_unchecked(&self, src: &[u8], dst: &mut [u8]) {
        let pixels = (src.len() / self.src.bytes_per_pixel).min(dst.len() / self.dst.bytes_per_pixel);
        self.convert_pixels(
            &src[..pixels * self.src.bytes_per_pixel],
            &mut dst[..pixels * self.dst.bytes_per_pixel],
            pixels,
        );
    }

    // src and dst hold exactly `pixels` pixels each.
    fn convert_pixels(&self, src: &[u8], dst: &mut [u8], pixels: usize) {
        if pixels == 0 {
            return;
        }
        match &self.kind {
            SessionKind::Identity => dst.copy_from_slice(src),
            SessionKind::Native(transform) => {
                let src_chunks = src.chunks(MAX_CHUNK_PIXELS * self.src.bytes_per_pixel);
                let dst_chunks = dst.chunks_mut(MAX_CHUNK_PIXELS * self.dst.bytes_per_pixel);
                for (s, d) in src_chunks.zip(dst_chunks) {
                    let n = s.len() / self.src.bytes_per_pixel;
                    // SAFETY: s and d hold n pixels of the formats the
                    // transform was built for; n fits in u32.
                    unsafe { cmsDoTransform(transform.raw, s.as_ptr().cast(), d.as_mut_ptr().cast(), n as u32) };
                }
                if let (None, Some(slot)) = (self.src.alpha, self.dst.alpha) {
                    fill_opaque(dst, self.dst.bytes_per_pixel, slot);
                }
            }
        }
    }
}

/// lcms2 leaves extra channels alone when the source has none to copy.
fn fill_opaque(dst: &mut [u8], bytes_per_pixel: usize, slot: AlphaSlot) {
    for pixel in dst.chunks_exact_mut(bytes_per_pixel) {
        pixel[slot.offset..slot.offset + slot.size].fill(0xFF);
    }
}

fn resolve_profile(
    cache: &ProfileCache,
    profile: Option<Arc<ColorProfile>>,
    format: &FormatDesc,
) -> Result<Arc<ColorProfile>> {
    let profile = match profile {
        Some(profile) => profile,
        None => cache.standard(format.model)?,
    };
    let expected = format.model.color_space();
    if profile.color_space() != expected {
        return Err(Error::UnsupportedFormat(format!(
            "{:?} profile {} cannot describe {:?} pixels",
            profile.color_space(),
            profile.key(),
            expected
        )));
    }
    Ok(profile)
}

impl std::fmt::Debug for TransformSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformSession")
            .field("identity", &self.is_identity())
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("src_profile", &self.src_profile.as_ref().map(|p| p.key()))
            .field("dst_profile", &self.dst_profile.as_ref().map(|p| p.key()))
            .finish()
    }
}
