//! Callback bridging between native libraries and Rust
//!
//! Native libraries receive two things from us: `extern "C"` thunks and an
//! opaque user-data pointer that the thunks cast back to Rust state. The
//! user data is owned by a [`Registration`] token; dropping the token is the
//! only way to unregister, so the token's owner must outlive every native
//! handle that was given the pointer.
//!
//! Thunk bodies run inside [`guard`], which turns a panic into the calling
//! library's failure sentinel instead of unwinding into C.

pub mod alloc;
pub mod cms;

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::os::raw::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;

thread_local! {
    static CALLBACK_DEPTH: Cell<u32> = const { Cell::new(0) };
    static LAST_ERROR: RefCell<Option<NativeError>> = const { RefCell::new(None) };
}

/// Error reported by a native library through its logging callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub code: u32,
    pub message: String,
}

/// Record an error for the current thread, replacing any earlier one.
pub(crate) fn record_error(code: u32, message: String) {
    let _ = LAST_ERROR.try_with(|slot| *slot.borrow_mut() = Some(NativeError { code, message }));
}

/// Take the error recorded on this thread, if any.
pub fn take_last_error() -> Option<NativeError> {
    LAST_ERROR
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
}

/// Clear stale errors before a native call whose failure we want to explain.
pub(crate) fn clear_last_error() {
    let _ = take_last_error();
}

/// Whether the current thread is inside a bridged callback.
pub fn in_callback() -> bool {
    CALLBACK_DEPTH.try_with(|d| d.get() > 0).unwrap_or(false)
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        let _ = CALLBACK_DEPTH.try_with(|d| d.set(d.get() + 1));
        DepthGuard
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        let _ = CALLBACK_DEPTH.try_with(|d| d.set(d.get().saturating_sub(1)));
    }
}

/// Run a callback body, returning `sentinel` if it panics.
///
/// `name` identifies the callback in the log.
pub fn guard<R>(name: &'static str, sentinel: R, body: impl FnOnce() -> R) -> R {
    let _depth = DepthGuard::enter();
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(value) => value,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(callback = name, %reason, "panic caught at native callback boundary");
            sentinel
        }
    }
}

fn check_not_reentrant(action: &str) {
    if in_callback() {
        tracing::error!(action, "callback registration changed from inside a native callback");
        debug_assert!(false, "{action} from inside a native callback");
    }
}

/// Heap-pinned user data handed to a native library.
///
/// The value lives at a fixed address from [`Registration::new`] until the
/// token is dropped. Moving the token does not move the value.
pub struct Registration<T> {
    ptr: NonNull<T>,
    _owns: PhantomData<T>,
}

// The token owns a `T` just like a `Box<T>` would.
unsafe impl<T: Send> Send for Registration<T> {}
unsafe impl<T: Sync> Sync for Registration<T> {}

impl<T> Registration<T> {
    /// Pin `value` on the heap and return its token.
    pub fn new(value: T) -> Self {
        check_not_reentrant("register");
        let ptr = NonNull::from(Box::leak(Box::new(value)));
        Self {
            ptr,
            _owns: PhantomData,
        }
    }

    /// Pointer to pass as the native library's user data.
    pub fn as_user_data(&self) -> *mut c_void {
        self.ptr.as_ptr().cast()
    }

    pub fn get(&self) -> &T {
        // SAFETY: ptr came from Box::leak and is freed only in Drop.
        unsafe { self.ptr.as_ref() }
    }

    /// Mutable access for setup that happens before the pointer is shared.
    pub(crate) fn get_mut(&mut self) -> &mut T {
        // SAFETY: as in `get`; &mut self rules out other Rust borrows.
        unsafe { self.ptr.as_mut() }
    }

    /// Recover a shared reference from user data received in a callback.
    ///
    /// # Safety
    ///
    /// `user_data` must come from [`Registration::as_user_data`] on a token
    /// of the same `T` that is still alive.
    pub unsafe fn from_user_data<'a>(user_data: *mut c_void) -> Option<&'a T> {
        // SAFETY: guaranteed by the caller.
        unsafe { user_data.cast::<T>().as_ref() }
    }
}

impl<T> Drop for Registration<T> {
    fn drop(&mut self) {
        check_not_reentrant("unregister");
        // SAFETY: ptr came from Box::leak and is reclaimed exactly once here.
        drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Registration<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("user_data", &self.ptr)
            .field("value", self.get())
            .finish()
    }
}
