//! lcms2 context lifecycle
//!
//! Each [`NativeContext`] is created with the managed memory plugin and the
//! error-log callback. Profiles and transforms hold an `Arc` to the context
//! they were created in, so the context is deleted only after all of them.

use std::ffi::CStr;
use std::os::raw::c_char;

use crate::bridge::alloc::{AllocationSnapshot, ContextState};
use crate::bridge::{self, Registration};
use crate::ffi::lcms::{
    LCMS_MIN_VERSION, LCMS_NEXT_MAJOR, cmsContext, cmsCreateContext, cmsDeleteContext,
    cmsGetEncodedCMMversion, cmsSetLogErrorHandlerTHR, cmsUInt32Number,
};
use crate::{Error, Result};

/// Encoded version of the linked lcms2 (e.g. 2160 for 2.16)
pub fn engine_version() -> i32 {
    // SAFETY: no preconditions.
    unsafe { cmsGetEncodedCMMversion() }
}

/// An lcms2 context wired to our allocator and error callbacks
pub struct NativeContext {
    raw: cmsContext,
    version: i32,
    // Declared after `raw`: it must outlive cmsDeleteContext.
    state: Registration<ContextState>,
}

// lcms2 contexts are safe to share; per-object locking is done by the
// profile and transform wrappers.
unsafe impl Send for NativeContext {}
unsafe impl Sync for NativeContext {}

impl NativeContext {
    /// Create a context that refuses single allocations above
    /// `max_allocation` bytes.
    pub fn new(max_allocation: usize) -> Result<Self> {
        let version = engine_version();
        if !(LCMS_MIN_VERSION..LCMS_NEXT_MAJOR).contains(&version) {
            return Err(Error::NativeCallFailure {
                operation: "cmsGetEncodedCMMversion",
                code: u32::try_from(version).ok(),
                message: Some(format!(
                    "lcms2 {version} is outside the supported range {LCMS_MIN_VERSION}..{LCMS_NEXT_MAJOR}"
                )),
            });
        }

        let mut state = Registration::new(ContextState::new(max_allocation));
        let plugin = state.get_mut().plugin_ptr();
        bridge::clear_last_error();
        // SAFETY: plugin and user data point into the registration, which is
        // stored next to the context and dropped after it.
        let raw = unsafe { cmsCreateContext(plugin, state.as_user_data()) };
        if raw.is_null() {
            return Err(Error::native("cmsCreateContext"));
        }
        // SAFETY: raw is a live context.
        unsafe { cmsSetLogErrorHandlerTHR(raw, Some(log_error)) };

        tracing::debug!(version, max_allocation, "created lcms2 context");
        Ok(Self { raw, version, state })
    }

    pub(crate) fn raw(&self) -> cmsContext {
        self.raw
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Whether the engine understands premultiplied alpha formats
    pub fn supports_premultiplied(&self) -> bool {
        self.version >= crate::ffi::lcms::LCMS_PREMUL_VERSION
    }

    pub fn allocation_stats(&self) -> AllocationSnapshot {
        self.state.get().stats.snapshot()
    }
}

impl Drop for NativeContext {
    fn drop(&mut self) {
        // SAFETY: every profile and transform holds an Arc to this context,
        // so nothing created in it is still alive.
        unsafe { cmsDeleteContext(self.raw) };
        tracing::debug!(
            live_blocks = self.state.get().stats.snapshot().live_blocks,
            "deleted lcms2 context"
        );
    }
}

impl std::fmt::Debug for NativeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeContext")
            .field("version", &self.version)
            .field("allocations", &self.allocation_stats())
            .finish()
    }
}

unsafe extern "C" fn log_error(_ctx: cmsContext, code: cmsUInt32Number, text: *const c_char) {
    bridge::guard("lcms log error", (), || {
        let message = if text.is_null() {
            String::new()
        } else {
            // SAFETY: lcms2 passes a NUL-terminated buffer valid for the call.
            unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
        };
        tracing::warn!(code, %message, "lcms2 error");
        bridge::record_error(code, message);
    })
}
