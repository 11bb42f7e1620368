//! # cms-tests
//!
//! Integration, concurrency and parity testing for cmsbridge.
//!
//! This crate provides:
//! - Test profiles built through the safe `lcms2` crate
//! - Pixel pattern generation for every catalog format
//! - Reference transforms through `lcms2` for parity checks
//! - Per-channel difference statistics
//!
//! ## Test Categories
//!
//! 1. **Profile Cache**: deduplication, eviction, concurrent parsing
//! 2. **Conversion**: sessions, pixel sources and processors
//! 3. **Native Buffers**: ownership protocol and allocator accounting
//! 4. **CMS Interface**: the libjxl callback table driven through its
//!    function pointers
//! 5. **Parity**: output compared against `lcms2`

pub mod fixtures;
pub mod parity;
pub mod patterns;
pub mod reference;

pub use parity::{DiffStats, compare_buffers};
