//! ICC Profile handling
//!
//! A [`ColorProfile`] is the parsed form of one distinct ICC byte sequence.
//! It owns the lcms2 profile handle; [`ColorProfileHandle`] is the
//! capability handed to callers, which never owns native state.

use std::os::raw::c_void;
use std::ptr;
use std::sync::{Arc, Weak};

use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};
use parking_lot::Mutex;

use crate::bridge;
use crate::buffer::{LcmsAllocator, NativeAllocator, NativeBuffer, RawBuffer};
use crate::cache::ProfileCache;
use crate::context::NativeContext;
use crate::ffi::lcms::{
    cmsCIEXYZ, cmsCIExyY, cmsCloseProfile, cmsCreateGrayProfileTHR, cmsCreate_sRGBProfileTHR,
    cmsBuildParametricToneCurve, cmsFreeToneCurve, cmsGetColorSpace, cmsGetDeviceClass,
    cmsGetEncodedICCversion, cmsGetHeaderRenderingIntent, cmsHPROFILE, cmsOpenProfileFromMemTHR,
    cmsReadTag, cmsSaveProfileToMem, cmsSigBlueColorantTag, cmsSigGreenColorantTag,
    cmsSigMediaWhitePointTag, cmsSigRedColorantTag, cmsTagSignature,
};
use crate::format::ColorModel;
use crate::types::{ColorSpace, ProfileClass, ProfileVersion, RenderingIntent, XyzColor};
use crate::{Error, Result};

type Blake2b128 = Blake2b<U16>;

const BASE32: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Content key of a profile: BLAKE2b-128 of its raw bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileKey([u8; 16]);

impl ProfileKey {
    pub fn of(bytes: &[u8]) -> Self {
        let mut key = [0u8; 16];
        key.copy_from_slice(&Blake2b128::digest(bytes));
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// First 40 bits in RFC 4648 base32, for logs and cache file names
    pub fn tag(&self) -> String {
        let b = &self.0;
        let idx = [
            b[0] >> 3,
            ((b[0] & 0x07) << 2) | (b[1] >> 6),
            (b[1] & 0x3e) >> 1,
            ((b[1] & 0x01) << 4) | (b[2] >> 4),
            ((b[2] & 0x0f) << 1) | (b[3] >> 7),
            (b[3] & 0x7c) >> 2,
            ((b[3] & 0x03) << 3) | (b[4] >> 5),
            b[4] & 0x1f,
        ];
        idx.iter().map(|&i| BASE32[i as usize] as char).collect()
    }
}

impl std::fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.tag())
    }
}

impl std::fmt::Debug for ProfileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProfileKey({})", self.tag())
    }
}

/// Header metadata read once at parse time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileInfo {
    pub color_space: ColorSpace,
    pub class: ProfileClass,
    pub version: ProfileVersion,
    /// Intent recorded in the profile header
    pub intent: RenderingIntent,
}

/// An open lcms2 profile handle. Closed on drop.
pub(crate) struct NativeProfile {
    raw: cmsHPROFILE,
    context: Arc<NativeContext>,
}

// lcms2 profiles may move between threads; shared access goes through the
// Mutex in ColorProfile.
unsafe impl Send for NativeProfile {}

impl NativeProfile {
    /// Parse ICC bytes. The bytes are only borrowed for the call.
    fn open(context: &Arc<NativeContext>, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::MalformedProfile("profile data is empty".into()));
        }
        let input = NativeBuffer::<LcmsAllocator>::borrowed(bytes).as_raw();
        let size = u32::try_from(input.size).map_err(|_| {
            Error::MalformedProfile(format!("profile of {} bytes is too large", input.size))
        })?;
        bridge::clear_last_error();
        // SAFETY: input describes `bytes`, live for the duration of the call;
        // lcms2 copies what it keeps.
        let raw = unsafe { cmsOpenProfileFromMemTHR(context.raw(), input.bytes.cast(), size) };
        if raw.is_null() {
            let reason = bridge::take_last_error()
                .map(|e| e.message)
                .unwrap_or_else(|| "lcms2 rejected the profile".into());
            return Err(Error::MalformedProfile(reason));
        }
        Ok(Self {
            raw,
            context: context.clone(),
        })
    }

    fn adopt(context: &Arc<NativeContext>, raw: cmsHPROFILE, operation: &'static str) -> Result<Self> {
        if raw.is_null() {
            return Err(Error::native(operation));
        }
        Ok(Self {
            raw,
            context: context.clone(),
        })
    }

    pub(crate) fn raw(&self) -> cmsHPROFILE {
        self.raw
    }

    pub(crate) fn context(&self) -> &Arc<NativeContext> {
        &self.context
    }

    fn info(&self) -> ProfileInfo {
        // SAFETY: raw is open for the life of self.
        unsafe {
            ProfileInfo {
                color_space: ColorSpace::from_signature(cmsGetColorSpace(self.raw)),
                class: ProfileClass::from_signature(cmsGetDeviceClass(self.raw)),
                version: ProfileVersion::from_encoded(cmsGetEncodedICCversion(self.raw)),
                intent: RenderingIntent::from_lcms(cmsGetHeaderRenderingIntent(self.raw)),
            }
        }
    }

    fn saved_size(&self) -> Result<usize> {
        let mut needed = 0u32;
        bridge::clear_last_error();
        // SAFETY: a null buffer asks lcms2 for the size only.
        if unsafe { cmsSaveProfileToMem(self.raw, ptr::null_mut(), &mut needed) } == 0 {
            return Err(Error::native("cmsSaveProfileToMem"));
        }
        Ok(needed as usize)
    }

    fn save_into(&self, out: *mut u8, size: usize) -> Result<()> {
        let mut written = size as u32;
        // SAFETY: out has room for `size` bytes, the size lcms2 asked for.
        if unsafe { cmsSaveProfileToMem(self.raw, out.cast::<c_void>(), &mut written) } == 0 {
            return Err(Error::native("cmsSaveProfileToMem"));
        }
        Ok(())
    }

    fn save(&self) -> Result<Vec<u8>> {
        let size = self.saved_size()?;
        let mut out = vec![0u8; size];
        self.save_into(out.as_mut_ptr(), size)?;
        Ok(out)
    }

    fn read_xyz(&self, sig: cmsTagSignature) -> Option<XyzColor> {
        // SAFETY: for XYZ tags lcms2 returns a cmsCIEXYZ owned by the
        // profile, or null when the tag is missing.
        let tag = unsafe { cmsReadTag(self.raw, sig) }.cast::<cmsCIEXYZ>();
        // SAFETY: see above; copied out before the lock is released.
        unsafe { tag.as_ref() }.map(|xyz| XyzColor::from(*xyz))
    }
}

impl Drop for NativeProfile {
    fn drop(&mut self) {
        // SAFETY: raw was opened by us and is closed exactly once.
        unsafe { cmsCloseProfile(self.raw) };
    }
}

/// A parsed ICC profile, shared through `Arc`
pub struct ColorProfile {
    key: ProfileKey,
    bytes: Arc<[u8]>,
    info: ProfileInfo,
    native: Mutex<NativeProfile>,
}

impl ColorProfile {
    pub(crate) fn parse(context: &Arc<NativeContext>, key: ProfileKey, bytes: Arc<[u8]>) -> Result<Self> {
        let native = NativeProfile::open(context, &bytes)?;
        let info = native.info();
        tracing::debug!(%key, color_space = ?info.color_space, version = %info.version, "parsed ICC profile");
        Ok(Self {
            key,
            bytes,
            info,
            native: Mutex::new(native),
        })
    }

    /// Build a built-in profile natively and key it by its serialized form.
    pub(crate) fn standard(context: &Arc<NativeContext>, model: ColorModel) -> Result<Self> {
        let native = match model {
            ColorModel::Rgb => {
                // SAFETY: context is live.
                let raw = unsafe { cmsCreate_sRGBProfileTHR(context.raw()) };
                NativeProfile::adopt(context, raw, "cmsCreate_sRGBProfileTHR")?
            }
            ColorModel::Gray => srgb_gray(context)?,
            ColorModel::Cmyk => {
                return Err(Error::UnsupportedFormat(
                    "there is no built-in CMYK profile".into(),
                ));
            }
        };
        let bytes: Arc<[u8]> = native.save()?.into();
        let key = ProfileKey::of(&bytes);
        let info = native.info();
        tracing::debug!(%key, ?model, "built standard profile");
        Ok(Self {
            key,
            bytes,
            info,
            native: Mutex::new(native),
        })
    }

    pub fn key(&self) -> ProfileKey {
        self.key
    }

    /// The ICC bytes this profile was parsed from
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn shared_bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn info(&self) -> ProfileInfo {
        self.info
    }

    pub fn color_space(&self) -> ColorSpace {
        self.info.color_space
    }

    /// Whether the native handle lives in `context`
    pub(crate) fn belongs_to(&self, context: &Arc<NativeContext>) -> bool {
        Arc::ptr_eq(self.native.lock().context(), context)
    }

    /// Media white point tag, if present
    pub fn white_point(&self) -> Option<XyzColor> {
        self.native.lock().read_xyz(cmsSigMediaWhitePointTag)
    }

    /// Red, green and blue colorant tags of a matrix-shaper profile
    pub fn colorants(&self) -> Option<[XyzColor; 3]> {
        let native = self.native.lock();
        Some([
            native.read_xyz(cmsSigRedColorantTag)?,
            native.read_xyz(cmsSigGreenColorantTag)?,
            native.read_xyz(cmsSigBlueColorantTag)?,
        ])
    }

    /// Serialize through lcms2 into storage owned by lcms2's allocator
    pub fn save_to_buffer(&self, allocator: LcmsAllocator) -> Result<NativeBuffer<'static, LcmsAllocator>> {
        let native = self.native.lock();
        let size = native.saved_size()?;
        let block = allocator
            .allocate(size)
            .ok_or(Error::AllocationFailure { size })?;
        if let Err(e) = native.save_into(block.as_ptr(), size) {
            // SAFETY: block came from this allocator and was never shared.
            unsafe { allocator.release(block) };
            return Err(e);
        }
        // SAFETY: allocated by `allocator` and filled by lcms2.
        Ok(unsafe {
            NativeBuffer::from_raw(
                RawBuffer {
                    bytes: block.as_ptr(),
                    size,
                },
                allocator,
            )
        })
    }

    /// A non-owning handle for callers outside the bridge
    pub fn handle(self: &Arc<Self>) -> ColorProfileHandle {
        ColorProfileHandle {
            key: self.key,
            bytes: self.bytes.clone(),
            profile: Arc::downgrade(self),
        }
    }

    /// Run `f` with the native handles of two profiles locked.
    ///
    /// Locks are taken in key order, then address order for distinct
    /// profiles sharing a key; a profile paired with itself is locked once.
    pub(crate) fn with_pair<R>(
        a: &ColorProfile,
        b: &ColorProfile,
        f: impl FnOnce(&NativeProfile, &NativeProfile) -> R,
    ) -> R {
        if ptr::eq(a, b) {
            let native = a.native.lock();
            return f(&native, &native);
        }
        let order = |p: &ColorProfile| (p.key, p as *const ColorProfile as usize);
        if order(a) < order(b) {
            let first = a.native.lock();
            let second = b.native.lock();
            f(&first, &second)
        } else {
            let second = b.native.lock();
            let first = a.native.lock();
            f(&first, &second)
        }
    }
}

impl std::fmt::Debug for ColorProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorProfile")
            .field("key", &self.key)
            .field("len", &self.bytes.len())
            .field("info", &self.info)
            .finish()
    }
}

/// Gray with the sRGB tone curve and a D65 white point
fn srgb_gray(context: &Arc<NativeContext>) -> Result<NativeProfile> {
    let white = cmsCIExyY {
        x: 0.3127,
        y: 0.3290,
        Y: 1.0,
    };
    let params = [2.4, 1.0 / 1.055, 0.055 / 1.055, 1.0 / 12.92, 0.04045];
    bridge::clear_last_error();
    // SAFETY: type 4 takes five parameters.
    let curve = unsafe { cmsBuildParametricToneCurve(context.raw(), 4, params.as_ptr()) };
    if curve.is_null() {
        return Err(Error::native("cmsBuildParametricToneCurve"));
    }
    // SAFETY: lcms2 copies the curve into the profile, so it is freed
    // right after.
    let raw = unsafe {
        let raw = cmsCreateGrayProfileTHR(context.raw(), &white, curve);
        cmsFreeToneCurve(curve);
        raw
    };
    NativeProfile::adopt(context, raw, "cmsCreateGrayProfileTHR")
}

/// A capability referring to a cached profile without owning it.
///
/// The handle keeps the ICC bytes, so it can re-resolve the profile if the
/// cache evicted it.
#[derive(Clone)]
pub struct ColorProfileHandle {
    key: ProfileKey,
    bytes: Arc<[u8]>,
    profile: Weak<ColorProfile>,
}

impl ColorProfileHandle {
    pub fn key(&self) -> ProfileKey {
        self.key
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the parsed profile is still alive somewhere
    pub fn is_resident(&self) -> bool {
        self.profile.strong_count() > 0
    }

    /// Get the parsed profile, re-parsing through `cache` if it was dropped
    /// or belongs to another cache's context.
    pub fn resolve(&self, cache: &ProfileCache) -> Result<Arc<ColorProfile>> {
        if let Some(profile) = self.profile.upgrade() {
            if cache.owns(&profile) {
                return Ok(profile);
            }
        }
        cache.get_or_add_shared(self.key, self.bytes.clone())
    }
}

impl std::fmt::Debug for ColorProfileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorProfileHandle")
            .field("key", &self.key)
            .field("resident", &self.is_resident())
            .finish()
    }
}
