//! libjxl color management interface backed by the profile cache
//!
//! [`CmsBridge::interface`] fills a `JxlCmsInterface` whose callbacks parse
//! profiles through a shared [`ProfileCache`] and convert float pixels with
//! [`TransformSession`]s. libjxl calls `init` once per image and then `run`
//! from its worker threads, each with its own thread index.

use std::os::raw::c_void;
use std::ptr;
use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{Registration, guard};
use crate::cache::ProfileCache;
use crate::ffi::jxl::{
    JXL_BOOL, JXL_FALSE, JXL_TRUE, JxlCmsInterface, JxlColorEncoding, JxlColorProfile, JxlColorSpace,
    JxlPrimaries, JxlTransferFunction, JxlWhitePoint,
};
use crate::format::{ColorModel, FormatDesc};
use crate::profile::ColorProfile;
use crate::transform::TransformSession;
use crate::types::ColorSpace;
use crate::{Error, Result};

struct CmsShared {
    cache: Arc<ProfileCache>,
    outstanding: AtomicUsize,
}

/// Owner of the user data behind a [`JxlCmsInterface`].
///
/// Keep the bridge alive while libjxl may still call `set_fields_from_icc`
/// or `init`. States returned by `init` hold their own reference and stay
/// valid until `destroy`, even if the bridge goes first.
pub struct CmsBridge {
    shared: Registration<Arc<CmsShared>>,
}

impl CmsBridge {
    pub fn new(cache: Arc<ProfileCache>) -> Self {
        Self {
            shared: Registration::new(Arc::new(CmsShared {
                cache,
                outstanding: AtomicUsize::new(0),
            })),
        }
    }

    pub fn cache(&self) -> &Arc<ProfileCache> {
        &self.shared.get().cache
    }

    /// The callback table to hand to a libjxl decoder or encoder
    pub fn interface(&self) -> JxlCmsInterface {
        JxlCmsInterface {
            set_fields_data: self.shared.as_user_data(),
            set_fields_from_icc: Some(set_fields_from_icc),
            init_data: self.shared.as_user_data(),
            init: Some(init),
            get_src_buf: Some(get_src_buf),
            get_dst_buf: Some(get_dst_buf),
            run: Some(run),
            destroy: Some(destroy),
        }
    }

    /// Transform states created by `init` and not yet destroyed
    pub fn outstanding(&self) -> usize {
        self.shared.get().outstanding.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CmsBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmsBridge")
            .field("outstanding", &self.outstanding())
            .finish_non_exhaustive()
    }
}

fn model_of(space: ColorSpace) -> Option<ColorModel> {
    match space {
        ColorSpace::Rgb => Some(ColorModel::Rgb),
        ColorSpace::Gray => Some(ColorModel::Gray),
        ColorSpace::Cmyk => Some(ColorModel::Cmyk),
        _ => None,
    }
}

/// # Safety
///
/// `user_data` must be the `set_fields_data`/`init_data` of a live bridge.
unsafe fn shared<'a>(user_data: *mut c_void) -> Option<&'a Arc<CmsShared>> {
    // SAFETY: guaranteed by the caller.
    unsafe { Registration::<Arc<CmsShared>>::from_user_data(user_data) }
}

/// # Safety
///
/// `data` must be null or valid for `size` bytes.
unsafe fn icc_slice<'a>(data: *const u8, size: usize) -> &'a [u8] {
    if data.is_null() || size == 0 {
        &[]
    } else {
        // SAFETY: guaranteed by the caller.
        unsafe { slice::from_raw_parts(data, size) }
    }
}

fn describe(profile: &ColorProfile) -> (JxlColorEncoding, bool) {
    let mut c = JxlColorEncoding {
        color_space: match profile.color_space() {
            ColorSpace::Rgb => JxlColorSpace::RGB,
            ColorSpace::Gray => JxlColorSpace::GRAY,
            _ => JxlColorSpace::UNKNOWN,
        },
        // Tone curves are read from the ICC data itself
        transfer_function: JxlTransferFunction::UNKNOWN,
        rendering_intent: profile.info().intent.into(),
        ..JxlColorEncoding::default()
    };

    if let Some(xy) = profile.white_point().and_then(|wp| wp.to_xy()) {
        c.white_point = JxlWhitePoint::CUSTOM;
        c.white_point_xy = xy;
    }
    if profile.color_space() == ColorSpace::Rgb {
        let xy = profile
            .colorants()
            .and_then(|[r, g, b]| Some([r.to_xy()?, g.to_xy()?, b.to_xy()?]));
        if let Some([r, g, b]) = xy {
            c.primaries = JxlPrimaries::CUSTOM;
            c.primaries_red_xy = r;
            c.primaries_green_xy = g;
            c.primaries_blue_xy = b;
        }
    }
    (c, profile.color_space() == ColorSpace::Cmyk)
}

unsafe extern "C" fn set_fields_from_icc(
    user_data: *mut c_void,
    icc_data: *const u8,
    icc_size: usize,
    c: *mut JxlColorEncoding,
    cmyk: *mut JXL_BOOL,
) -> JXL_BOOL {
    guard("jxl cms set_fields_from_icc", JXL_FALSE, || {
        // SAFETY: libjxl passes back our set_fields_data.
        let Some(shared) = (unsafe { shared(user_data) }) else {
            return JXL_FALSE;
        };
        // SAFETY: libjxl passes a buffer of icc_size bytes.
        let icc = unsafe { icc_slice(icc_data, icc_size) };
        let profile = match shared.cache.get_or_add(icc) {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(error = %e, "cms set_fields_from_icc rejected profile");
                return JXL_FALSE;
            }
        };
        let (encoding, is_cmyk) = describe(&profile);
        // SAFETY: out-pointers are provided by libjxl; null ones are skipped.
        unsafe {
            if let Some(c) = c.as_mut() {
                *c = encoding;
            }
            if let Some(cmyk) = cmyk.as_mut() {
                *cmyk = if is_cmyk { JXL_TRUE } else { JXL_FALSE };
            }
        }
        JXL_TRUE
    })
}

struct ThreadSlot {
    session: TransformSession,
    src: Vec<f32>,
    dst: Vec<f32>,
    staging: Vec<f32>,
}

struct CmsState {
    shared: Arc<CmsShared>,
    threads: Vec<Mutex<ThreadSlot>>,
    src_model: ColorModel,
    src_channels: usize,
    dst_channels: usize,
}

impl Drop for CmsState {
    fn drop(&mut self) {
        self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Profile for one side of the conversion. Empty ICC data means the
/// built-in profile matching the channel count.
fn side_profile(cache: &ProfileCache, profile: &JxlColorProfile) -> Result<(Arc<ColorProfile>, ColorModel)> {
    // SAFETY: libjxl keeps the ICC data alive for the duration of init.
    let icc = unsafe { icc_slice(profile.icc.data, profile.icc.size) };
    let resolved = if icc.is_empty() {
        let model = match profile.num_channels {
            1 => ColorModel::Gray,
            3 => ColorModel::Rgb,
            n => {
                return Err(Error::UnsupportedFormat(format!(
                    "no built-in profile for {n} channels"
                )));
            }
        };
        cache.standard(model)?
    } else {
        cache.get_or_add(icc)?
    };
    let model = model_of(resolved.color_space()).ok_or_else(|| {
        Error::UnsupportedFormat(format!("{:?} profiles cannot be run", resolved.color_space()))
    })?;
    Ok((resolved, model))
}

fn build_state(
    shared: &Arc<CmsShared>,
    num_threads: usize,
    pixels_per_thread: usize,
    input: &JxlColorProfile,
    output: &JxlColorProfile,
) -> Result<CmsState> {
    let cache = &shared.cache;
    let (src_profile, src_model) = side_profile(cache, input)?;
    let (dst_profile, dst_model) = side_profile(cache, output)?;
    if dst_model == ColorModel::Cmyk {
        return Err(Error::UnsupportedFormat("CMYK output is not supported".into()));
    }
    let src = FormatDesc::float(src_model);
    let dst = FormatDesc::float(dst_model);
    let options = cache
        .options()
        .transform_options()
        .with_intent(src_profile.info().intent);

    let mut threads = Vec::with_capacity(num_threads);
    for _ in 0..num_threads {
        let session = TransformSession::build(
            cache,
            Some(src_profile.clone()),
            src,
            Some(dst_profile.clone()),
            dst,
            options,
        )?;
        threads.push(Mutex::new(ThreadSlot {
            session,
            src: vec![0.0; pixels_per_thread * src.channels()],
            dst: vec![0.0; pixels_per_thread * dst.channels()],
            staging: Vec::with_capacity(pixels_per_thread * src.channels()),
        }));
    }

    tracing::debug!(
        src = %src_profile.key(),
        dst = %dst_profile.key(),
        num_threads,
        pixels_per_thread,
        "initialized jxl cms state"
    );
    shared.outstanding.fetch_add(1, Ordering::AcqRel);
    Ok(CmsState {
        shared: shared.clone(),
        threads,
        src_model,
        src_channels: src.channels(),
        dst_channels: dst.channels(),
    })
}

unsafe extern "C" fn init(
    init_data: *mut c_void,
    num_threads: usize,
    pixels_per_thread: usize,
    input_profile: *const JxlColorProfile,
    output_profile: *const JxlColorProfile,
    _intensity_target: f32,
) -> *mut c_void {
    guard("jxl cms init", ptr::null_mut(), || {
        // SAFETY: libjxl passes back our init_data and valid profiles.
        let (shared, input, output) = unsafe {
            match (shared(init_data), input_profile.as_ref(), output_profile.as_ref()) {
                (Some(s), Some(i), Some(o)) => (s, i, o),
                _ => return ptr::null_mut(),
            }
        };
        match build_state(shared, num_threads, pixels_per_thread, input, output) {
            Ok(state) => Box::into_raw(Box::new(state)).cast(),
            Err(e) => {
                tracing::warn!(error = %e, "jxl cms init failed");
                ptr::null_mut()
            }
        }
    })
}

/// # Safety
///
/// `user_data` must be null or a state returned by `init` and not yet
/// destroyed.
unsafe fn state<'a>(user_data: *mut c_void) -> Option<&'a CmsState> {
    // SAFETY: guaranteed by the caller.
    unsafe { user_data.cast::<CmsState>().as_ref() }
}

unsafe extern "C" fn get_src_buf(user_data: *mut c_void, thread: usize) -> *mut f32 {
    guard("jxl cms get_src_buf", ptr::null_mut(), || {
        // SAFETY: libjxl passes the pointer init returned.
        unsafe { state(user_data) }
            .and_then(|s| s.threads.get(thread))
            .map_or(ptr::null_mut(), |slot| slot.lock().src.as_mut_ptr())
    })
}

unsafe extern "C" fn get_dst_buf(user_data: *mut c_void, thread: usize) -> *mut f32 {
    guard("jxl cms get_dst_buf", ptr::null_mut(), || {
        // SAFETY: libjxl passes the pointer init returned.
        unsafe { state(user_data) }
            .and_then(|s| s.threads.get(thread))
            .map_or(ptr::null_mut(), |slot| slot.lock().dst.as_mut_ptr())
    })
}

unsafe extern "C" fn run(
    user_data: *mut c_void,
    thread: usize,
    input_buffer: *const f32,
    output_buffer: *mut f32,
    num_pixels: usize,
) -> JXL_BOOL {
    guard("jxl cms run", JXL_FALSE, || {
        // SAFETY: libjxl passes the pointer init returned.
        let Some(state) = (unsafe { state(user_data) }) else {
            return JXL_FALSE;
        };
        let Some(slot) = state.threads.get(thread) else {
            return JXL_FALSE;
        };
        if input_buffer.is_null() || output_buffer.is_null() {
            return JXL_FALSE;
        }
        let mut slot = slot.lock();
        let ThreadSlot { session, staging, .. } = &mut *slot;

        // Input and output may be the same buffer, so the input is staged
        // before anything is written.
        staging.clear();
        // SAFETY: libjxl provides num_pixels pixels of input.
        staging.extend_from_slice(unsafe {
            slice::from_raw_parts(input_buffer, num_pixels * state.src_channels)
        });
        if state.src_model == ColorModel::Cmyk {
            // libjxl stores ink as 1 - amount; lcms2 float CMYK is 0..100
            for v in staging.iter_mut() {
                *v = 100.0 - 100.0 * *v;
            }
        }
        // SAFETY: libjxl provides room for num_pixels pixels of output.
        let output = unsafe { slice::from_raw_parts_mut(output_buffer, num_pixels * state.dst_channels) };
        match session.convert_f32(&staging[..], output) {
            Ok(()) => JXL_TRUE,
            Err(e) => {
                tracing::warn!(error = %e, thread, "jxl cms run failed");
                JXL_FALSE
            }
        }
    })
}

unsafe extern "C" fn destroy(user_data: *mut c_void) {
    guard("jxl cms destroy", (), || {
        if !user_data.is_null() {
            // SAFETY: user_data came from Box::into_raw in init and libjxl
            // destroys each state once.
            drop(unsafe { Box::from_raw(user_data.cast::<CmsState>()) });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::jxl::JxlIccData;

    fn bridge() -> CmsBridge {
        CmsBridge::new(Arc::new(ProfileCache::with_defaults().unwrap()))
    }

    fn jxl_profile(icc: &[u8], num_channels: usize) -> JxlColorProfile {
        JxlColorProfile {
            icc: JxlIccData {
                data: if icc.is_empty() { ptr::null() } else { icc.as_ptr() },
                size: icc.len(),
            },
            color_encoding: JxlColorEncoding::default(),
            num_channels,
        }
    }

    #[test]
    fn test_set_fields_from_srgb() {
        let bridge = bridge();
        let iface = bridge.interface();
        let icc = bridge.cache().srgb().bytes().to_vec();
        let mut c = JxlColorEncoding::default();
        let mut cmyk = JXL_TRUE;
        let ok = unsafe {
            (iface.set_fields_from_icc.unwrap())(iface.set_fields_data, icc.as_ptr(), icc.len(), &mut c, &mut cmyk)
        };
        assert_eq!(ok, JXL_TRUE);
        assert_eq!(cmyk, JXL_FALSE);
        assert_eq!(c.color_space, JxlColorSpace::RGB);
        assert_eq!(c.primaries, JxlPrimaries::CUSTOM);
        assert!((0.62..0.67).contains(&c.primaries_red_xy[0]));
        assert_eq!(c.transfer_function, JxlTransferFunction::UNKNOWN);
    }

    #[test]
    fn test_set_fields_rejects_garbage() {
        let bridge = bridge();
        let iface = bridge.interface();
        let junk = [9u8; 64];
        let mut c = JxlColorEncoding::default();
        let mut cmyk = JXL_FALSE;
        let ok = unsafe {
            (iface.set_fields_from_icc.unwrap())(iface.set_fields_data, junk.as_ptr(), junk.len(), &mut c, &mut cmyk)
        };
        assert_eq!(ok, JXL_FALSE);
    }

    #[test]
    fn test_run_gray_to_rgb_through_table() {
        let bridge = bridge();
        let iface = bridge.interface();
        let input = jxl_profile(&[], 1);
        let srgb = bridge.cache().srgb().bytes().to_vec();
        let output = jxl_profile(&srgb, 3);

        let state = unsafe { (iface.init.unwrap())(iface.init_data, 2, 4, &input, &output, 255.0) };
        assert!(!state.is_null());
        assert_eq!(bridge.outstanding(), 1);

        unsafe {
            let src = (iface.get_src_buf.unwrap())(state, 1);
            let dst = (iface.get_dst_buf.unwrap())(state, 1);
            assert!(!src.is_null() && !dst.is_null());
            for (i, v) in [0.0f32, 0.25, 0.5, 1.0].into_iter().enumerate() {
                *src.add(i) = v;
            }
            assert_eq!((iface.run.unwrap())(state, 1, src, dst, 4), JXL_TRUE);
            let out = slice::from_raw_parts(dst, 12);
            for (px, expected) in out.chunks_exact(3).zip([0.0f32, 0.25, 0.5, 1.0]) {
                for &v in px {
                    assert!((v - expected).abs() < 0.02, "{v} vs {expected}");
                }
            }

            // Out-of-range thread index
            assert!((iface.get_src_buf.unwrap())(state, 2).is_null());
            assert_eq!((iface.run.unwrap())(state, 2, src, dst, 4), JXL_FALSE);

            (iface.destroy.unwrap())(state);
        }
        assert_eq!(bridge.outstanding(), 0);
    }

    #[test]
    fn test_run_in_place() {
        let bridge = bridge();
        let iface = bridge.interface();
        let input = jxl_profile(&[], 3);
        let output = jxl_profile(&[], 3);
        unsafe {
            let state = (iface.init.unwrap())(iface.init_data, 1, 2, &input, &output, 255.0);
            assert!(!state.is_null());
            let buf = (iface.get_src_buf.unwrap())(state, 0);
            for i in 0..6 {
                *buf.add(i) = i as f32 / 6.0;
            }
            assert_eq!((iface.run.unwrap())(state, 0, buf, buf, 2), JXL_TRUE);
            for i in 0..6 {
                assert!((*buf.add(i) - i as f32 / 6.0).abs() < 1e-3);
            }
            (iface.destroy.unwrap())(state);
        }
        assert_eq!(bridge.outstanding(), 0);
    }

    #[test]
    fn test_state_outlives_bridge() {
        let bridge = bridge();
        let iface = bridge.interface();
        let input = jxl_profile(&[], 3);
        let output = jxl_profile(&[], 1);
        let state = unsafe { (iface.init.unwrap())(iface.init_data, 1, 1, &input, &output, 255.0) };
        assert!(!state.is_null());
        drop(bridge);
        unsafe {
            let src = (iface.get_src_buf.unwrap())(state, 0);
            let dst = (iface.get_dst_buf.unwrap())(state, 0);
            *src = 1.0;
            *src.add(1) = 1.0;
            *src.add(2) = 1.0;
            assert_eq!((iface.run.unwrap())(state, 0, src, dst, 1), JXL_TRUE);
            assert!((*dst - 1.0).abs() < 0.01);
            (iface.destroy.unwrap())(state);
        }
    }

    #[test]
    fn test_init_rejects_unknown_channel_count() {
        let bridge = bridge();
        let iface = bridge.interface();
        let input = jxl_profile(&[], 2);
        let output = jxl_profile(&[], 3);
        let state = unsafe { (iface.init.unwrap())(iface.init_data, 1, 1, &input, &output, 255.0) };
        assert!(state.is_null());
        assert_eq!(bridge.outstanding(), 0);
    }
}
