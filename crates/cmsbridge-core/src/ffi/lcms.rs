//! Little CMS 2 ABI: the structs, constants and flat C functions this crate
//! calls. Layouts follow `lcms2.h` / `lcms2_plugin.h` for lcms 2.9 and later.

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(non_upper_case_globals)]

use std::os::raw::{c_char, c_int, c_void};

// Handles
pub type cmsContext = *mut c_void;
pub type cmsHPROFILE = *mut c_void;
pub type cmsHTRANSFORM = *mut c_void;
pub type cmsBool = c_int;
pub type cmsUInt32Number = u32;
pub type cmsFloat64Number = f64;
pub type cmsTagSignature = u32;
pub type cmsColorSpaceSignature = u32;
pub type cmsProfileClassSignature = u32;

/// Opaque tone curve
#[repr(C)]
pub struct cmsToneCurve {
    _private: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct cmsCIEXYZ {
    pub X: f64,
    pub Y: f64,
    pub Z: f64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct cmsCIExyY {
    pub x: f64,
    pub y: f64,
    pub Y: f64,
}

// Plugin structures
#[repr(C)]
pub struct cmsPluginBase {
    pub Magic: cmsUInt32Number,
    pub ExpectedVersion: cmsUInt32Number,
    pub Type: cmsUInt32Number,
    pub Next: *mut cmsPluginBase,
}

pub type _cmsMallocFnPtrType =
    unsafe extern "C" fn(ContextID: cmsContext, size: cmsUInt32Number) -> *mut c_void;
pub type _cmsFreeFnPtrType = unsafe extern "C" fn(ContextID: cmsContext, Ptr: *mut c_void);
pub type _cmsReallocFnPtrType = unsafe extern "C" fn(
    ContextID: cmsContext,
    Ptr: *mut c_void,
    NewSize: cmsUInt32Number,
) -> *mut c_void;
pub type _cmsMalloZerocFnPtrType =
    unsafe extern "C" fn(ContextID: cmsContext, size: cmsUInt32Number) -> *mut c_void;
pub type _cmsCallocFnPtrType = unsafe extern "C" fn(
    ContextID: cmsContext,
    Num: cmsUInt32Number,
    Size: cmsUInt32Number,
) -> *mut c_void;
pub type _cmsDupFnPtrType = unsafe extern "C" fn(
    ContextID: cmsContext,
    Org: *const c_void,
    size: cmsUInt32Number,
) -> *mut c_void;

/// Memory handler plugin. Malloc, free and realloc are required; lcms
/// derives the optional ones from them when left null.
#[repr(C)]
pub struct cmsPluginMemHandler {
    pub base: cmsPluginBase,
    pub MallocPtr: Option<_cmsMallocFnPtrType>,
    pub FreePtr: Option<_cmsFreeFnPtrType>,
    pub ReallocPtr: Option<_cmsReallocFnPtrType>,
    pub MallocZeroPtr: Option<_cmsMalloZerocFnPtrType>,
    pub CallocPtr: Option<_cmsCallocFnPtrType>,
    pub DupPtr: Option<_cmsDupFnPtrType>,
}

pub type cmsLogErrorHandlerFunction =
    unsafe extern "C" fn(ContextID: cmsContext, ErrorCode: cmsUInt32Number, Text: *const c_char);

// Plugin identification
pub const cmsPluginMagicNumber: u32 = 0x61637070; // 'acpp'
pub const cmsPluginMemHandlerSig: u32 = 0x6D656D48; // 'memH'

/// Oldest engine this crate accepts, also the plugin's ExpectedVersion.
pub const LCMS_MIN_VERSION: c_int = 2090;
/// First engine version with premultiplied alpha formats.
pub const LCMS_PREMUL_VERSION: c_int = 2130;
pub const LCMS_NEXT_MAJOR: c_int = 3000;

// Pixel format bit fields
pub const fn PREMUL_SH(m: u32) -> u32 {
    m << 23
}
pub const fn FLOAT_SH(a: u32) -> u32 {
    a << 22
}
pub const fn COLORSPACE_SH(s: u32) -> u32 {
    s << 16
}
pub const fn SWAPFIRST_SH(s: u32) -> u32 {
    s << 14
}
pub const fn DOSWAP_SH(e: u32) -> u32 {
    e << 10
}
pub const fn EXTRA_SH(e: u32) -> u32 {
    e << 7
}
pub const fn CHANNELS_SH(c: u32) -> u32 {
    c << 3
}
pub const fn BYTES_SH(b: u32) -> u32 {
    b
}

pub const PT_GRAY: u32 = 3;
pub const PT_RGB: u32 = 4;
pub const PT_CMYK: u32 = 6;

pub const TYPE_GRAY_8: u32 = COLORSPACE_SH(PT_GRAY) | CHANNELS_SH(1) | BYTES_SH(1);
pub const TYPE_BGR_8: u32 = COLORSPACE_SH(PT_RGB) | CHANNELS_SH(3) | BYTES_SH(1) | DOSWAP_SH(1);
pub const TYPE_BGRA_8: u32 = COLORSPACE_SH(PT_RGB)
    | EXTRA_SH(1)
    | CHANNELS_SH(3)
    | BYTES_SH(1)
    | DOSWAP_SH(1)
    | SWAPFIRST_SH(1);
pub const TYPE_BGRA_8_PREMUL: u32 = TYPE_BGRA_8 | PREMUL_SH(1);
pub const TYPE_CMYK_8: u32 = COLORSPACE_SH(PT_CMYK) | CHANNELS_SH(4) | BYTES_SH(1);
pub const TYPE_CMYKA_8: u32 = COLORSPACE_SH(PT_CMYK) | EXTRA_SH(1) | CHANNELS_SH(4) | BYTES_SH(1);
pub const TYPE_CMYK_16: u32 = COLORSPACE_SH(PT_CMYK) | CHANNELS_SH(4) | BYTES_SH(2);
pub const TYPE_CMYKA_16: u32 = COLORSPACE_SH(PT_CMYK) | EXTRA_SH(1) | CHANNELS_SH(4) | BYTES_SH(2);

// Floating point formats encode 4-byte samples as BYTES_SH(4)
pub const TYPE_GRAY_FLT: u32 = FLOAT_SH(1) | COLORSPACE_SH(PT_GRAY) | CHANNELS_SH(1) | BYTES_SH(4);
pub const TYPE_RGB_FLT: u32 = FLOAT_SH(1) | COLORSPACE_SH(PT_RGB) | CHANNELS_SH(3) | BYTES_SH(4);
pub const TYPE_CMYK_FLT: u32 = FLOAT_SH(1) | COLORSPACE_SH(PT_CMYK) | CHANNELS_SH(4) | BYTES_SH(4);

// Intents
pub const INTENT_PERCEPTUAL: u32 = 0;
pub const INTENT_RELATIVE_COLORIMETRIC: u32 = 1;
pub const INTENT_SATURATION: u32 = 2;
pub const INTENT_ABSOLUTE_COLORIMETRIC: u32 = 3;

// Transform flags
pub const cmsFLAGS_NOCACHE: u32 = 0x0040;
pub const cmsFLAGS_NOOPTIMIZE: u32 = 0x0100;
pub const cmsFLAGS_NULLTRANSFORM: u32 = 0x0200;
pub const cmsFLAGS_HIGHRESPRECALC: u32 = 0x0400;
pub const cmsFLAGS_BLACKPOINTCOMPENSATION: u32 = 0x2000;
pub const cmsFLAGS_COPY_ALPHA: u32 = 0x0400_0000;

// Color space signatures
pub const cmsSigXYZData: u32 = 0x58595A20;
pub const cmsSigLabData: u32 = 0x4C616220;
pub const cmsSigRgbData: u32 = 0x52474220;
pub const cmsSigGrayData: u32 = 0x47524159;
pub const cmsSigCmykData: u32 = 0x434D594B;

// Profile class signatures
pub const cmsSigInputClass: u32 = 0x73636E72;
pub const cmsSigDisplayClass: u32 = 0x6D6E7472;
pub const cmsSigOutputClass: u32 = 0x70727472;
pub const cmsSigLinkClass: u32 = 0x6C696E6B;
pub const cmsSigAbstractClass: u32 = 0x61627374;
pub const cmsSigColorSpaceClass: u32 = 0x73706163;
pub const cmsSigNamedColorClass: u32 = 0x6E6D636C;

// Tag signatures
pub const cmsSigMediaWhitePointTag: cmsTagSignature = 0x77747074;
pub const cmsSigRedColorantTag: cmsTagSignature = 0x7258595A;
pub const cmsSigGreenColorantTag: cmsTagSignature = 0x6758595A;
pub const cmsSigBlueColorantTag: cmsTagSignature = 0x6258595A;

unsafe extern "C" {
    pub fn cmsGetEncodedCMMversion() -> c_int;

    // Contexts
    pub fn cmsCreateContext(Plugin: *mut c_void, UserData: *mut c_void) -> cmsContext;
    pub fn cmsDeleteContext(ContextID: cmsContext);
    pub fn cmsGetContextUserData(ContextID: cmsContext) -> *mut c_void;
    pub fn cmsSetLogErrorHandlerTHR(ContextID: cmsContext, Fn: Option<cmsLogErrorHandlerFunction>);

    // Profiles
    pub fn cmsOpenProfileFromMemTHR(
        ContextID: cmsContext,
        MemPtr: *const c_void,
        dwSize: cmsUInt32Number,
    ) -> cmsHPROFILE;
    pub fn cmsCloseProfile(hProfile: cmsHPROFILE) -> cmsBool;
    pub fn cmsCreate_sRGBProfileTHR(ContextID: cmsContext) -> cmsHPROFILE;
    pub fn cmsCreateGrayProfileTHR(
        ContextID: cmsContext,
        WhitePoint: *const cmsCIExyY,
        TransferFunction: *const cmsToneCurve,
    ) -> cmsHPROFILE;
    pub fn cmsBuildParametricToneCurve(
        ContextID: cmsContext,
        Type: c_int,
        Params: *const cmsFloat64Number,
    ) -> *mut cmsToneCurve;
    pub fn cmsFreeToneCurve(Curve: *mut cmsToneCurve);
    pub fn cmsSaveProfileToMem(
        hProfile: cmsHPROFILE,
        MemPtr: *mut c_void,
        BytesNeeded: *mut cmsUInt32Number,
    ) -> cmsBool;
    pub fn cmsGetColorSpace(hProfile: cmsHPROFILE) -> cmsColorSpaceSignature;
    pub fn cmsGetDeviceClass(hProfile: cmsHPROFILE) -> cmsProfileClassSignature;
    pub fn cmsGetEncodedICCversion(hProfile: cmsHPROFILE) -> cmsUInt32Number;
    pub fn cmsGetHeaderRenderingIntent(hProfile: cmsHPROFILE) -> cmsUInt32Number;
    pub fn cmsReadTag(hProfile: cmsHPROFILE, sig: cmsTagSignature) -> *mut c_void;

    // Transforms
    pub fn cmsCreateTransformTHR(
        ContextID: cmsContext,
        Input: cmsHPROFILE,
        InputFormat: cmsUInt32Number,
        Output: cmsHPROFILE,
        OutputFormat: cmsUInt32Number,
        Intent: cmsUInt32Number,
        dwFlags: cmsUInt32Number,
    ) -> cmsHTRANSFORM;
    pub fn cmsDeleteTransform(hTransform: cmsHTRANSFORM);
    pub fn cmsDoTransform(
        Transform: cmsHTRANSFORM,
        InputBuffer: *const c_void,
        OutputBuffer: *mut c_void,
        Size: cmsUInt32Number,
    );

    // Context allocator, exported for plugins
    pub fn _cmsMalloc(ContextID: cmsContext, size: cmsUInt32Number) -> *mut c_void;
    pub fn _cmsFree(ContextID: cmsContext, Ptr: *mut c_void);
}
