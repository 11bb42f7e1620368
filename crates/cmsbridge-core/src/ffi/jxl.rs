//! libjxl color management interface (`jxl/cms_interface.h`,
//! `jxl/color_encoding.h`, `jxl/memory_manager.h`).
//!
//! The enums are 4-byte C enums. They are mirrored as transparent newtypes
//! rather than Rust enums because values written by the native side are not
//! guaranteed to be in range.

#![allow(non_camel_case_types)]

use std::os::raw::{c_int, c_void};

pub type JXL_BOOL = c_int;
pub const JXL_TRUE: JXL_BOOL = 1;
pub const JXL_FALSE: JXL_BOOL = 0;

macro_rules! c_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $value:expr),* $(,)? }) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub c_int);

        impl $name {
            $(pub const $variant: Self = Self($value);)*
        }
    };
}

c_enum!(
    /// Color space of the image data
    JxlColorSpace {
        RGB = 0,
        GRAY = 1,
        XYB = 2,
        UNKNOWN = 3,
    }
);

c_enum!(
    /// Built-in white points
    JxlWhitePoint {
        D65 = 1,
        CUSTOM = 2,
        E = 10,
        DCI = 11,
    }
);

c_enum!(
    /// Built-in primaries
    JxlPrimaries {
        SRGB = 1,
        CUSTOM = 2,
        P2100 = 9,
        P3 = 11,
    }
);

c_enum!(
    /// Built-in transfer functions
    JxlTransferFunction {
        BT709 = 1,
        UNKNOWN = 2,
        LINEAR = 8,
        SRGB = 13,
        PQ = 16,
        DCI = 17,
        HLG = 18,
        GAMMA = 65535,
    }
);

c_enum!(
    /// Rendering intent, same numbering as ICC
    JxlRenderingIntent {
        PERCEPTUAL = 0,
        RELATIVE = 1,
        SATURATION = 2,
        ABSOLUTE = 3,
    }
);

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct JxlColorEncoding {
    pub color_space: JxlColorSpace,
    pub white_point: JxlWhitePoint,
    pub white_point_xy: [f64; 2],
    pub primaries: JxlPrimaries,
    pub primaries_red_xy: [f64; 2],
    pub primaries_green_xy: [f64; 2],
    pub primaries_blue_xy: [f64; 2],
    pub transfer_function: JxlTransferFunction,
    pub gamma: f64,
    pub rendering_intent: JxlRenderingIntent,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct JxlIccData {
    pub data: *const u8,
    pub size: usize,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct JxlColorProfile {
    pub icc: JxlIccData,
    pub color_encoding: JxlColorEncoding,
    pub num_channels: usize,
}

pub type jpegxl_cms_set_fields_from_icc_func = unsafe extern "C" fn(
    user_data: *mut c_void,
    icc_data: *const u8,
    icc_size: usize,
    c: *mut JxlColorEncoding,
    cmyk: *mut JXL_BOOL,
) -> JXL_BOOL;

pub type jpegxl_cms_init_func = unsafe extern "C" fn(
    init_data: *mut c_void,
    num_threads: usize,
    pixels_per_thread: usize,
    input_profile: *const JxlColorProfile,
    output_profile: *const JxlColorProfile,
    intensity_target: f32,
) -> *mut c_void;

pub type jpegxl_cms_get_buffer_func =
    unsafe extern "C" fn(user_data: *mut c_void, thread: usize) -> *mut f32;

pub type jpegxl_cms_run_func = unsafe extern "C" fn(
    user_data: *mut c_void,
    thread: usize,
    input_buffer: *const f32,
    output_buffer: *mut f32,
    num_pixels: usize,
) -> JXL_BOOL;

pub type jpegxl_cms_destroy_func = unsafe extern "C" fn(user_data: *mut c_void);

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct JxlCmsInterface {
    pub set_fields_data: *mut c_void,
    pub set_fields_from_icc: Option<jpegxl_cms_set_fields_from_icc_func>,
    pub init_data: *mut c_void,
    pub init: Option<jpegxl_cms_init_func>,
    pub get_src_buf: Option<jpegxl_cms_get_buffer_func>,
    pub get_dst_buf: Option<jpegxl_cms_get_buffer_func>,
    pub run: Option<jpegxl_cms_run_func>,
    pub destroy: Option<jpegxl_cms_destroy_func>,
}

pub type jpegxl_alloc_func = unsafe extern "C" fn(opaque: *mut c_void, size: usize) -> *mut c_void;
pub type jpegxl_free_func = unsafe extern "C" fn(opaque: *mut c_void, address: *mut c_void);

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct JxlMemoryManager {
    pub opaque: *mut c_void,
    pub alloc: Option<jpegxl_alloc_func>,
    pub free: Option<jpegxl_free_func>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_enum_width() {
        assert_eq!(size_of::<JxlColorSpace>(), 4);
        assert_eq!(size_of::<JxlTransferFunction>(), 4);
        assert_eq!(JxlTransferFunction::GAMMA.0, 65535);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_color_encoding_layout() {
        assert_eq!(size_of::<JxlColorEncoding>(), 104);
        assert_eq!(offset_of!(JxlColorEncoding, white_point), 4);
        assert_eq!(offset_of!(JxlColorEncoding, white_point_xy), 8);
        assert_eq!(offset_of!(JxlColorEncoding, primaries), 24);
        assert_eq!(offset_of!(JxlColorEncoding, primaries_red_xy), 32);
        assert_eq!(offset_of!(JxlColorEncoding, primaries_green_xy), 48);
        assert_eq!(offset_of!(JxlColorEncoding, primaries_blue_xy), 64);
        assert_eq!(offset_of!(JxlColorEncoding, transfer_function), 80);
        assert_eq!(offset_of!(JxlColorEncoding, gamma), 88);
        assert_eq!(offset_of!(JxlColorEncoding, rendering_intent), 96);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_color_profile_layout() {
        assert_eq!(size_of::<JxlColorProfile>(), 128);
        assert_eq!(offset_of!(JxlColorProfile, icc), 0);
        assert_eq!(offset_of!(JxlColorProfile, color_encoding), 16);
        assert_eq!(offset_of!(JxlColorProfile, num_channels), 120);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_interface_layout() {
        assert_eq!(size_of::<JxlCmsInterface>(), 64);
        assert_eq!(offset_of!(JxlCmsInterface, init), 24);
        assert_eq!(offset_of!(JxlCmsInterface, destroy), 56);
        assert_eq!(size_of::<JxlMemoryManager>(), 24);
        assert_eq!(offset_of!(JxlMemoryManager, free), 16);
    }
}
