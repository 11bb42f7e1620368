//! Public API types for cmsbridge
//!
//! These types keep lcms2 signatures and libjxl enum values out of the
//! public API.

use crate::ffi::jxl::JxlRenderingIntent;
use crate::ffi::lcms::{self, cmsCIEXYZ};

/// Color space of profile data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ColorSpace {
    /// RGB color space
    Rgb,
    /// CMYK color space
    Cmyk,
    /// Grayscale
    Gray,
    /// CIELAB
    Lab,
    /// CIEXYZ
    Xyz,
    /// Anything else lcms2 can parse but the bridge does not map
    Unknown,
}

impl ColorSpace {
    /// Number of channels for this color space
    pub fn channels(&self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb | Self::Lab | Self::Xyz => 3,
            Self::Cmyk => 4,
            Self::Unknown => 0,
        }
    }

    /// Map an lcms2 color space signature
    pub fn from_signature(sig: u32) -> Self {
        match sig {
            lcms::cmsSigRgbData => Self::Rgb,
            lcms::cmsSigCmykData => Self::Cmyk,
            lcms::cmsSigGrayData => Self::Gray,
            lcms::cmsSigLabData => Self::Lab,
            lcms::cmsSigXYZData => Self::Xyz,
            _ => Self::Unknown,
        }
    }
}

/// ICC profile class (device type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ProfileClass {
    /// Input device (scanner, camera)
    Input,
    /// Display device (monitor)
    Display,
    /// Output device (printer)
    Output,
    /// Device link (direct device-to-device)
    DeviceLink,
    /// Color space conversion
    ColorSpace,
    /// Abstract profile
    Abstract,
    /// Named color profile
    NamedColor,
    /// Unknown class
    Unknown,
}

impl ProfileClass {
    pub fn from_signature(sig: u32) -> Self {
        match sig {
            lcms::cmsSigInputClass => Self::Input,
            lcms::cmsSigDisplayClass => Self::Display,
            lcms::cmsSigOutputClass => Self::Output,
            lcms::cmsSigLinkClass => Self::DeviceLink,
            lcms::cmsSigColorSpaceClass => Self::ColorSpace,
            lcms::cmsSigAbstractClass => Self::Abstract,
            lcms::cmsSigNamedColorClass => Self::NamedColor,
            _ => Self::Unknown,
        }
    }
}

/// ICC profile version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProfileVersion {
    /// Major version (2 or 4)
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Patch version
    pub patch: u8,
}

impl ProfileVersion {
    /// Create a new profile version
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self { major, minor, patch }
    }

    /// ICC v4.3
    pub const V4_3: Self = Self::new(4, 3, 0);

    /// Decode the header's BCD version field (`0x04300000` is 4.3.0)
    pub const fn from_encoded(v: u32) -> Self {
        Self::new((v >> 24) as u8, ((v >> 20) & 0xF) as u8, ((v >> 16) & 0xF) as u8)
    }

    /// Check if this is a v2 profile
    pub fn is_v2(&self) -> bool {
        self.major == 2
    }
}

impl std::fmt::Display for ProfileVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Rendering intent for color transformations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RenderingIntent {
    /// Perceptual - compress gamut to fit, preserve relationships
    #[default]
    Perceptual,
    /// Relative colorimetric - map white point, clip out-of-gamut
    RelativeColorimetric,
    /// Saturation - preserve saturation over accuracy
    Saturation,
    /// Absolute colorimetric - no white point mapping
    AbsoluteColorimetric,
}

impl RenderingIntent {
    /// lcms2 intent code
    pub const fn to_lcms(self) -> u32 {
        match self {
            Self::Perceptual => lcms::INTENT_PERCEPTUAL,
            Self::RelativeColorimetric => lcms::INTENT_RELATIVE_COLORIMETRIC,
            Self::Saturation => lcms::INTENT_SATURATION,
            Self::AbsoluteColorimetric => lcms::INTENT_ABSOLUTE_COLORIMETRIC,
        }
    }

    /// Intent from an ICC header or lcms2 code; unknown values fall back
    /// to relative colorimetric.
    pub const fn from_lcms(code: u32) -> Self {
        match code {
            lcms::INTENT_PERCEPTUAL => Self::Perceptual,
            lcms::INTENT_SATURATION => Self::Saturation,
            lcms::INTENT_ABSOLUTE_COLORIMETRIC => Self::AbsoluteColorimetric,
            _ => Self::RelativeColorimetric,
        }
    }
}

impl From<RenderingIntent> for JxlRenderingIntent {
    fn from(ri: RenderingIntent) -> Self {
        match ri {
            RenderingIntent::Perceptual => Self::PERCEPTUAL,
            RenderingIntent::RelativeColorimetric => Self::RELATIVE,
            RenderingIntent::Saturation => Self::SATURATION,
            RenderingIntent::AbsoluteColorimetric => Self::ABSOLUTE,
        }
    }
}

impl From<JxlRenderingIntent> for RenderingIntent {
    fn from(ri: JxlRenderingIntent) -> Self {
        // Same numbering as ICC
        Self::from_lcms(ri.0 as u32)
    }
}

/// CIE XYZ color value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XyzColor {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl XyzColor {
    /// Create a new XYZ color
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// D65 white point (sRGB, Display P3)
    pub const D65: Self = Self::new(0.95047, 1.0, 1.08883);

    /// Chromaticity coordinates, or `None` for black
    pub fn to_xy(&self) -> Option<[f64; 2]> {
        let sum = self.x + self.y + self.z;
        if sum.abs() < f64::EPSILON {
            return None;
        }
        Some([self.x / sum, self.y / sum])
    }
}

impl From<cmsCIEXYZ> for XyzColor {
    fn from(xyz: cmsCIEXYZ) -> Self {
        Self::new(xyz.X, xyz.Y, xyz.Z)
    }
}
