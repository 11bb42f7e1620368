//! Hand-written ABI mirrors for the native libraries behind the bridge
//!
//! Nothing here is validated at runtime. Each submodule carries `size_of` and
//! `offset_of!` tests against the layouts the C compilers produce.

pub mod jxl;
pub mod lcms;
