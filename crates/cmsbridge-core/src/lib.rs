//! # cmsbridge - native interop boundary for Little CMS
//!
//! Safe Rust plumbing around the lcms2 C library and the libjxl color
//! management interface.
//!
//! ## Layers
//!
//! - **ABI mirrors** ([`ffi`]): `#[repr(C)]` structs, constants and the flat
//!   function table, with layout tests
//! - **Callback bridge** ([`bridge`]): user-data registration, panic guards,
//!   the lcms2 memory plugin and the libjxl CMS table
//! - **Buffer ownership** ([`buffer`]): one release path per allocator
//! - **Profiles and transforms** ([`cache`], [`transform`]): content-keyed
//!   profile cache and conversion sessions
//! - **Pixel sources** ([`pixel`]): scanline conversion for codec pipelines
//!
//! ## Quick Start
//!
//! ```no_run
//! use cmsbridge_core::{PixelFormat, ProfileCache, TransformOptions};
//!
//! let cache = ProfileCache::with_defaults().unwrap();
//!
//! // No profiles: sGray in, sRGB out
//! let session = cache
//!     .create_transform(None, PixelFormat::Grey8, None, PixelFormat::Bgra32, TransformOptions::default())
//!     .unwrap();
//!
//! let src = [0u8, 128, 255];
//! let mut dst = [0u8; 12];
//! session.convert(&src, &mut dst).unwrap();
//! ```

// Links the lcms2 C library; every binding is declared in `ffi::lcms`.
extern crate lcms2_sys;

pub mod bridge;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod ffi;
pub mod format;
pub mod pixel;
pub mod profile;
pub mod transform;
pub mod types;

pub use bridge::alloc::{AllocationSnapshot, MemoryManagerBridge};
pub use bridge::cms::CmsBridge;
pub use bridge::{NativeError, Registration};
pub use buffer::{BufferOwner, CrtAllocator, LcmsAllocator, NativeAllocator, NativeBuffer, RawBuffer};
pub use cache::{CacheStats, ProfileCache};
pub use config::BridgeOptions;
pub use context::{NativeContext, engine_version};
pub use error::{Error, Result};
pub use format::{ColorModel, PixelFormat};
pub use pixel::{
    BufferPixelSource, ConversionRoutine, ConversionTransform, PixelArea, PixelProcessor, PixelSource,
    PixelSourceExt, TransformFactory,
};
pub use profile::{ColorProfile, ColorProfileHandle, ProfileInfo, ProfileKey};
pub use transform::{TransformFlags, TransformOptions, TransformSession};
pub use types::{ColorSpace, ProfileClass, ProfileVersion, RenderingIntent, XyzColor};

/// Version of cmsbridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
