//! Pixel source adapter
//!
//! Codecs and pipeline stages produce pixels through [`PixelSource`]. A
//! [`ConversionTransform`] wraps a source and converts each scanline through
//! a [`TransformSession`]; [`TransformFactory`] builds both from profile
//! handles or raw ICC bytes.

use std::sync::Arc;

use crate::cache::ProfileCache;
use crate::format::PixelFormat;
use crate::profile::{ColorProfile, ColorProfileHandle};
use crate::transform::{TransformOptions, TransformSession};
use crate::{Error, Result};

/// A rectangle of pixels, in source coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelArea {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelArea {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// The whole of a `width` x `height` image
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(
            0,
            0,
            i32::try_from(width).unwrap_or(i32::MAX),
            i32::try_from(height).unwrap_or(i32::MAX),
        )
    }

    /// `height` rows starting `y` rows into this area
    pub const fn slice(&self, y: i32, height: i32) -> Self {
        Self::new(self.x, self.y + y, self.width, height)
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Something that can copy rectangles of pixels into a caller buffer
pub trait PixelSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> PixelFormat;

    /// Copy `area` into `buffer`, one row every `stride` bytes.
    ///
    /// Callers go through [`PixelSourceExt::copy_pixels`], which has already
    /// checked the area and buffer geometry.
    fn copy_pixels_unchecked(&mut self, area: PixelArea, stride: usize, buffer: &mut [u8]) -> Result<()>;
}

impl<S: PixelSource + ?Sized> PixelSource for Box<S> {
    fn width(&self) -> u32 {
        (**self).width()
    }

    fn height(&self) -> u32 {
        (**self).height()
    }

    fn format(&self) -> PixelFormat {
        (**self).format()
    }

    fn copy_pixels_unchecked(&mut self, area: PixelArea, stride: usize, buffer: &mut [u8]) -> Result<()> {
        (**self).copy_pixels_unchecked(area, stride, buffer)
    }
}

/// Validated entry point for every [`PixelSource`]
pub trait PixelSourceExt: PixelSource {
    /// Copy `area` into `buffer`. Fails before writing anything if the area
    /// is outside the source or the buffer cannot hold it.
    fn copy_pixels(&mut self, area: PixelArea, stride: usize, buffer: &mut [u8]) -> Result<()> {
        validate_copy(self.width(), self.height(), self.format(), area, stride, buffer.len())?;
        if area.is_empty() {
            return Ok(());
        }
        self.copy_pixels_unchecked(area, stride, buffer)
    }
}

impl<S: PixelSource + ?Sized> PixelSourceExt for S {}

/// Bytes in one row of `width` pixels
pub fn line_bytes(format: PixelFormat, width: usize) -> usize {
    (width * format.bits_per_pixel()).div_ceil(8)
}

fn validate_copy(
    width: u32,
    height: u32,
    format: PixelFormat,
    area: PixelArea,
    stride: usize,
    buffer_len: usize,
) -> Result<()> {
    if area.x < 0 || area.y < 0 || area.width < 0 || area.height < 0 {
        return Err(Error::InvalidRegion(format!("negative area {area:?}")));
    }
    let right = i64::from(area.x) + i64::from(area.width);
    let bottom = i64::from(area.y) + i64::from(area.height);
    if right > i64::from(width) || bottom > i64::from(height) {
        return Err(Error::InvalidRegion(format!(
            "area {area:?} is outside the {width}x{height} source"
        )));
    }
    if area.is_empty() {
        return Ok(());
    }

    let line = line_bytes(format, area.width as usize);
    if stride < line {
        return Err(Error::BufferTooSmall {
            expected: line,
            actual: stride,
        });
    }
    let needed = (area.height as usize - 1)
        .checked_mul(stride)
        .and_then(|n| n.checked_add(line))
        .unwrap_or(usize::MAX);
    if buffer_len < needed {
        return Err(Error::BufferTooSmall {
            expected: needed,
            actual: buffer_len,
        });
    }
    Ok(())
}

/// An in-memory image
#[derive(Debug, Clone)]
pub struct BufferPixelSource {
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: usize,
    data: Vec<u8>,
}

impl BufferPixelSource {
    /// Wrap tightly packed rows.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let stride = line_bytes(format, width as usize);
        Self::with_stride(width, height, format, stride, data)
    }

    pub fn with_stride(width: u32, height: u32, format: PixelFormat, stride: usize, data: Vec<u8>) -> Result<Self> {
        let line = line_bytes(format, width as usize);
        if stride < line {
            return Err(Error::BufferTooSmall {
                expected: line,
                actual: stride,
            });
        }
        let needed = stride.checked_mul(height as usize).unwrap_or(usize::MAX);
        if data.len() < needed {
            return Err(Error::BufferTooSmall {
                expected: needed,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            stride,
            data,
        })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl PixelSource for BufferPixelSource {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn copy_pixels_unchecked(&mut self, area: PixelArea, stride: usize, buffer: &mut [u8]) -> Result<()> {
        let line = line_bytes(self.format, area.width as usize);
        let offset = line_bytes(self.format, area.x as usize);
        for row in 0..area.height as usize {
            let start = (area.y as usize + row) * self.stride + offset;
            let out = row * stride;
            buffer[out..out + line].copy_from_slice(&self.data[start..start + line]);
        }
        Ok(())
    }
}

/// Converts one run of whole pixels. Implementations skip bounds
/// validation; callers size both slices.
pub trait ConversionRoutine {
    fn convert_line(&self, src: &[u8], dst: &mut [u8]);
}

impl ConversionRoutine for TransformSession {
    fn convert_line(&self, src: &[u8], dst: &mut [u8]) {
        self.convert_unchecked(src, dst);
    }
}

/// Block converter for callers that manage their own buffers
#[derive(Debug)]
pub struct PixelProcessor<R> {
    routine: R,
}

impl<R: ConversionRoutine> PixelProcessor<R> {
    pub fn new(routine: R) -> Self {
        Self { routine }
    }

    pub fn routine(&self) -> &R {
        &self.routine
    }

    /// Convert `src` into `dst`
    pub fn process(&self, dst: &mut [u8], src: &[u8]) {
        self.routine.convert_line(src, dst);
    }
}

/// A [`PixelSource`] that converts another source's pixels on the fly
pub struct ConversionTransform<S> {
    source: S,
    format: PixelFormat,
    session: TransformSession,
    line: Vec<u8>,
}

impl<S: PixelSource> ConversionTransform<S> {
    /// Chain `source` through `session`, producing `format` pixels.
    pub fn new(source: S, format: PixelFormat, session: TransformSession) -> Result<Self> {
        if !session.converts(source.format(), format) {
            return Err(Error::UnsupportedFormat(format!(
                "session does not convert {} to {}",
                source.format(),
                format
            )));
        }
        Ok(Self {
            source,
            format,
            session,
            line: Vec::new(),
        })
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn session(&self) -> &TransformSession {
        &self.session
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S: PixelSource> PixelSource for ConversionTransform<S> {
    fn width(&self) -> u32 {
        self.source.width()
    }

    fn height(&self) -> u32 {
        self.source.height()
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn copy_pixels_unchecked(&mut self, area: PixelArea, stride: usize, buffer: &mut [u8]) -> Result<()> {
        let src_line = line_bytes(self.source.format(), area.width as usize);
        let dst_line = line_bytes(self.format, area.width as usize);
        self.line.resize(src_line, 0);

        for row in 0..area.height {
            self.source
                .copy_pixels_unchecked(area.slice(row, 1), src_line, &mut self.line)?;
            let out = row as usize * stride;
            self.session
                .convert_line(&self.line, &mut buffer[out..out + dst_line]);
        }
        Ok(())
    }
}

impl<S> std::fmt::Debug for ConversionTransform<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionTransform")
            .field("format", &self.format)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Builds conversions against one shared profile cache
#[derive(Debug, Clone)]
pub struct TransformFactory {
    cache: Arc<ProfileCache>,
    options: TransformOptions,
}

impl TransformFactory {
    /// Factory using the cache's configured intent and flags
    pub fn new(cache: Arc<ProfileCache>) -> Self {
        let options = cache.options().transform_options();
        Self { cache, options }
    }

    pub fn with_options(mut self, options: TransformOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache(&self) -> &Arc<ProfileCache> {
        &self.cache
    }

    pub fn options(&self) -> TransformOptions {
        self.options
    }

    /// Convert `source` to `dest_format`. A missing handle means the
    /// built-in profile for that side's color model.
    pub fn create_conversion_transform<S: PixelSource>(
        &self,
        source: S,
        dest_format: PixelFormat,
        src_profile: Option<&ColorProfileHandle>,
        dst_profile: Option<&ColorProfileHandle>,
    ) -> Result<ConversionTransform<S>> {
        let src = self.resolve(src_profile)?;
        let dst = self.resolve(dst_profile)?;
        let session = self.session(source.format(), src, dest_format, dst)?;
        ConversionTransform::new(source, dest_format, session)
    }

    /// Same as [`create_conversion_transform`](Self::create_conversion_transform)
    /// but from raw ICC bytes, parsed through the cache.
    pub fn create_conversion_transform_from_icc<S: PixelSource>(
        &self,
        source: S,
        dest_format: PixelFormat,
        src_icc: Option<&[u8]>,
        dst_icc: Option<&[u8]>,
    ) -> Result<ConversionTransform<S>> {
        let src = src_icc.map(|bytes| self.cache.get_or_add(bytes)).transpose()?;
        let dst = dst_icc.map(|bytes| self.cache.get_or_add(bytes)).transpose()?;
        let session = self.session(source.format(), src, dest_format, dst)?;
        ConversionTransform::new(source, dest_format, session)
    }

    pub fn create_pixel_processor(
        &self,
        src_format: PixelFormat,
        dest_format: PixelFormat,
        src_profile: Option<&ColorProfileHandle>,
        dst_profile: Option<&ColorProfileHandle>,
    ) -> Result<PixelProcessor<TransformSession>> {
        let src = self.resolve(src_profile)?;
        let dst = self.resolve(dst_profile)?;
        let session = self.session(src_format, src, dest_format, dst)?;
        Ok(PixelProcessor::new(session))
    }

    fn resolve(&self, handle: Option<&ColorProfileHandle>) -> Result<Option<Arc<ColorProfile>>> {
        handle.map(|h| h.resolve(&self.cache)).transpose()
    }

    fn session(
        &self,
        src_format: PixelFormat,
        src: Option<Arc<ColorProfile>>,
        dst_format: PixelFormat,
        dst: Option<Arc<ColorProfile>>,
    ) -> Result<TransformSession> {
        self.cache
            .create_transform(src.as_ref(), src_format, dst.as_ref(), dst_format, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> BufferPixelSource {
        let data = (0..width * height).map(|i| (i % 251) as u8).collect();
        BufferPixelSource::new(width, height, PixelFormat::Grey8, data).unwrap()
    }

    #[test]
    fn test_copy_sub_rectangle() {
        let mut src = gradient(8, 4);
        let mut out = vec![0u8; 6];
        src.copy_pixels(PixelArea::new(2, 1, 3, 2), 3, &mut out).unwrap();
        assert_eq!(out, [10, 11, 12, 18, 19, 20]);
    }

    #[test]
    fn test_out_of_bounds_is_invalid_region() {
        let mut src = gradient(8, 4);
        let mut out = vec![0xEEu8; 64];
        for area in [
            PixelArea::new(-1, 0, 2, 2),
            PixelArea::new(0, 0, 9, 1),
            PixelArea::new(0, 3, 1, 2),
            PixelArea::new(0, 0, 1, -1),
        ] {
            let err = src.copy_pixels(area, 8, &mut out).unwrap_err();
            assert!(matches!(err, Error::InvalidRegion(_)), "{area:?}");
        }
        assert!(out.iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_short_stride_and_buffer() {
        let mut src = gradient(8, 4);
        let mut out = vec![0xEEu8; 64];
        let err = src.copy_pixels(PixelArea::full(8, 4), 7, &mut out).unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall { expected: 8, actual: 7 }));

        // Last row needs only `line` bytes, not a full stride
        let mut exact = vec![0u8; 3 * 10 + 8];
        src.copy_pixels(PixelArea::full(8, 4), 10, &mut exact).unwrap();
        let err = src.copy_pixels(PixelArea::full(8, 4), 10, &mut exact[..37]).unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall { expected: 38, actual: 37 }));
    }

    #[test]
    fn test_empty_area_is_noop() {
        let mut src = gradient(4, 4);
        src.copy_pixels(PixelArea::new(4, 4, 0, 0), 0, &mut []).unwrap();
    }

    #[test]
    fn test_source_rejects_short_data() {
        let err = BufferPixelSource::new(4, 4, PixelFormat::Bgr24, vec![0; 47]).unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall { expected: 48, actual: 47 }));
    }

    #[test]
    fn test_conversion_transform_gray_to_bgra() {
        let cache = Arc::new(ProfileCache::with_defaults().unwrap());
        let factory = TransformFactory::new(cache);
        let mut conv = factory
            .create_conversion_transform(gradient(6, 3), PixelFormat::Bgra32, None, None)
            .unwrap();
        assert_eq!(conv.format(), PixelFormat::Bgra32);

        let mut out = vec![0u8; 6 * 4 * 3];
        conv.copy_pixels(PixelArea::full(6, 3), 24, &mut out).unwrap();
        for px in out.chunks_exact(4) {
            // Neutral gray stays neutral
            assert!((px[0] as i32 - px[1] as i32).abs() <= 1);
            assert!((px[1] as i32 - px[2] as i32).abs() <= 1);
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn test_processor_matches_session() {
        let cache = Arc::new(ProfileCache::with_defaults().unwrap());
        let factory = TransformFactory::new(cache.clone());
        let processor = factory
            .create_pixel_processor(PixelFormat::Bgr24, PixelFormat::Bgra32, None, None)
            .unwrap();
        let src = [1u8, 2, 3, 200, 100, 50];
        let mut dst = [0u8; 8];
        processor.process(&mut dst, &src);
        assert_eq!(dst[3], 255);
        assert_eq!(dst[7], 255);
    }

    #[test]
    fn test_mismatched_session_is_rejected() {
        let cache = ProfileCache::with_defaults().unwrap();
        let session = cache
            .create_transform(None, PixelFormat::Bgr24, None, PixelFormat::Bgr24, TransformOptions::default())
            .unwrap();
        let err = ConversionTransform::new(gradient(2, 2), PixelFormat::Bgr24, session).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_same_size_format_mismatch_is_rejected() {
        let cache = ProfileCache::with_defaults().unwrap();
        let bgra = || {
            cache
                .create_transform(None, PixelFormat::Bgra32, None, PixelFormat::Bgra32, TransformOptions::default())
                .unwrap()
        };
        let cmyk = BufferPixelSource::new(2, 2, PixelFormat::Cmyk32, vec![0; 16]).unwrap();
        let err = ConversionTransform::new(cmyk, PixelFormat::Bgra32, bgra()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));

        let bgra_src = BufferPixelSource::new(2, 2, PixelFormat::Bgra32, vec![0; 16]).unwrap();
        let err = ConversionTransform::new(bgra_src.clone(), PixelFormat::Pbgra32, bgra()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));

        assert!(ConversionTransform::new(bgra_src, PixelFormat::Bgra32, bgra()).is_ok());
    }

    #[test]
    fn test_huge_stride_is_too_small_not_overflow() {
        let err = BufferPixelSource::with_stride(1, 2, PixelFormat::Grey8, 1usize << 63, vec![0; 4]).unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall { expected: usize::MAX, actual: 4 }));
    }
}
