//! Pixel format catalog and its lcms2 format codes

use crate::ffi::lcms;
use crate::types::ColorSpace;

/// Interleaved pixel formats the bridge can convert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// 8-bit grayscale
    Grey8,
    /// 24-bit BGR
    Bgr24,
    /// 32-bit BGRA, straight alpha
    Bgra32,
    /// 32-bit BGRA, premultiplied alpha
    Pbgra32,
    /// 8-bit CMYK
    Cmyk32,
    /// 8-bit CMYK with straight alpha
    Cmyka40,
    /// 16-bit CMYK
    Cmyk64,
    /// 16-bit CMYK with straight alpha
    Cmyka80,
}

/// Color model a format's channels belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorModel {
    Gray,
    Rgb,
    Cmyk,
}

impl ColorModel {
    pub fn color_space(self) -> ColorSpace {
        match self {
            Self::Gray => ColorSpace::Gray,
            Self::Rgb => ColorSpace::Rgb,
            Self::Cmyk => ColorSpace::Cmyk,
        }
    }
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 8] = [
        Self::Grey8,
        Self::Bgr24,
        Self::Bgra32,
        Self::Pbgra32,
        Self::Cmyk32,
        Self::Cmyka40,
        Self::Cmyk64,
        Self::Cmyka80,
    ];

    pub const fn bits_per_pixel(self) -> usize {
        match self {
            Self::Grey8 => 8,
            Self::Bgr24 => 24,
            Self::Bgra32 | Self::Pbgra32 | Self::Cmyk32 => 32,
            Self::Cmyka40 => 40,
            Self::Cmyk64 => 64,
            Self::Cmyka80 => 80,
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        self.bits_per_pixel() / 8
    }

    pub const fn color_model(self) -> ColorModel {
        match self {
            Self::Grey8 => ColorModel::Gray,
            Self::Bgr24 | Self::Bgra32 | Self::Pbgra32 => ColorModel::Rgb,
            Self::Cmyk32 | Self::Cmyka40 | Self::Cmyk64 | Self::Cmyka80 => ColorModel::Cmyk,
        }
    }

    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Bgra32 | Self::Pbgra32 | Self::Cmyka40 | Self::Cmyka80)
    }

    pub const fn is_premultiplied(self) -> bool {
        matches!(self, Self::Pbgra32)
    }

    /// Bytes per channel sample
    pub const fn sample_size(self) -> usize {
        match self {
            Self::Cmyk64 | Self::Cmyka80 => 2,
            _ => 1,
        }
    }

    /// lcms2 `TYPE_*` code
    pub const fn lcms_type(self) -> u32 {
        match self {
            Self::Grey8 => lcms::TYPE_GRAY_8,
            Self::Bgr24 => lcms::TYPE_BGR_8,
            Self::Bgra32 => lcms::TYPE_BGRA_8,
            Self::Pbgra32 => lcms::TYPE_BGRA_8_PREMUL,
            Self::Cmyk32 => lcms::TYPE_CMYK_8,
            Self::Cmyka40 => lcms::TYPE_CMYKA_8,
            Self::Cmyk64 => lcms::TYPE_CMYK_16,
            Self::Cmyka80 => lcms::TYPE_CMYKA_16,
        }
    }

    pub(crate) fn desc(self) -> FormatDesc {
        FormatDesc {
            code: self.lcms_type(),
            bytes_per_pixel: self.bytes_per_pixel(),
            model: self.color_model(),
            alpha: if self.has_alpha() {
                Some(AlphaSlot {
                    // Alpha is the last sample in every catalog format
                    offset: self.bytes_per_pixel() - self.sample_size(),
                    size: self.sample_size(),
                })
            } else {
                None
            },
            premultiplied: self.is_premultiplied(),
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Where a pixel's alpha sample lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AlphaSlot {
    pub offset: usize,
    pub size: usize,
}

/// What a transform session needs to know about one side's pixel layout.
/// Covers the catalog formats and the float formats used by the libjxl
/// bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FormatDesc {
    pub code: u32,
    pub bytes_per_pixel: usize,
    pub model: ColorModel,
    pub alpha: Option<AlphaSlot>,
    pub premultiplied: bool,
}

impl FormatDesc {
    /// 32-bit float interleaved samples for `model`, no alpha
    pub fn float(model: ColorModel) -> Self {
        let (code, channels) = match model {
            ColorModel::Gray => (lcms::TYPE_GRAY_FLT, 1),
            ColorModel::Rgb => (lcms::TYPE_RGB_FLT, 3),
            ColorModel::Cmyk => (lcms::TYPE_CMYK_FLT, 4),
        };
        Self {
            code,
            bytes_per_pixel: channels * 4,
            model,
            alpha: None,
            premultiplied: false,
        }
    }

    pub fn channels(&self) -> usize {
        ((self.code >> 3) & 0xF) as usize
    }
}
