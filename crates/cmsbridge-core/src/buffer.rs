//! Byte buffers that cross the native boundary
//!
//! A [`NativeBuffer`] is tagged with who owns its storage:
//!
//! - **Caller**: borrowed from Rust for the duration of a call. Clearing
//!   only forgets the pointer.
//! - **Library**: allocated by a native library and released through the
//!   same library's free routine, via the [`NativeAllocator`] the buffer
//!   was created with.
//!
//! Copies always land in fresh library-owned storage.

use std::marker::PhantomData;
use std::os::raw::c_void;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use crate::context::NativeContext;
use crate::ffi::lcms::{_cmsFree, _cmsMalloc};
use crate::{Error, Result};

/// An allocator owned by a native library.
///
/// # Safety
///
/// Blocks returned by `allocate` must stay valid for reads and writes of
/// `size` bytes until passed to `release` on an allocator that compares
/// equal in the sense of sharing the same native heap. `release` must accept
/// every block `allocate` returned.
pub unsafe trait NativeAllocator {
    /// Name used in logs
    fn name(&self) -> &'static str;

    fn allocate(&self, size: usize) -> Option<NonNull<u8>>;

    /// # Safety
    ///
    /// `block` must have come from `allocate` on this allocator's heap and
    /// must not be used afterwards.
    unsafe fn release(&self, block: NonNull<u8>);
}

/// The C runtime heap (`malloc`/`free`), which libjxl and libwebp use unless
/// given a memory manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrtAllocator;

unsafe impl NativeAllocator for CrtAllocator {
    fn name(&self) -> &'static str {
        "crt"
    }

    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        // SAFETY: malloc accepts any size; zero is bumped to keep the
        // result distinguishable from failure.
        NonNull::new(unsafe { libc::malloc(size.max(1)) }.cast())
    }

    unsafe fn release(&self, block: NonNull<u8>) {
        // SAFETY: guaranteed by the caller.
        unsafe { libc::free(block.as_ptr().cast()) }
    }
}

/// lcms2's context allocator (`_cmsMalloc`/`_cmsFree`). With our contexts
/// this routes through the managed memory plugin.
#[derive(Clone)]
pub struct LcmsAllocator {
    context: Arc<NativeContext>,
}

impl LcmsAllocator {
    pub fn new(context: Arc<NativeContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<NativeContext> {
        &self.context
    }
}

impl std::fmt::Debug for LcmsAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LcmsAllocator").finish_non_exhaustive()
    }
}

unsafe impl NativeAllocator for LcmsAllocator {
    fn name(&self) -> &'static str {
        "lcms2"
    }

    fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let size = u32::try_from(size).ok()?;
        // SAFETY: the context is alive for as long as self.
        NonNull::new(unsafe { _cmsMalloc(self.context.raw(), size) }.cast())
    }

    unsafe fn release(&self, block: NonNull<u8>) {
        // SAFETY: guaranteed by the caller.
        unsafe { _cmsFree(self.context.raw(), block.as_ptr().cast::<c_void>()) }
    }
}

/// `{pointer, size}` pair as native libraries pass it (`WebPData` has this
/// exact shape).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawBuffer {
    pub bytes: *const u8,
    pub size: usize,
}

impl RawBuffer {
    pub const EMPTY: RawBuffer = RawBuffer {
        bytes: ptr::null(),
        size: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.bytes.is_null() || self.size == 0
    }
}

/// Who releases a buffer's storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOwner {
    Caller,
    Library,
}

/// A byte buffer exchanged with a native library.
///
/// Not `Send` or `Sync`: the raw descriptor pins it to one thread.
pub struct NativeBuffer<'a, A: NativeAllocator> {
    raw: RawBuffer,
    owner: BufferOwner,
    allocator: Option<A>,
    _borrow: PhantomData<&'a [u8]>,
}

impl<'a, A: NativeAllocator> NativeBuffer<'a, A> {
    /// Describe caller-owned bytes. Nothing is freed on clear or drop.
    pub fn borrowed(bytes: &'a [u8]) -> Self {
        Self {
            raw: RawBuffer {
                bytes: bytes.as_ptr(),
                size: bytes.len(),
            },
            owner: BufferOwner::Caller,
            allocator: None,
            _borrow: PhantomData,
        }
    }

    pub fn owner(&self) -> BufferOwner {
        self.owner
    }

    pub fn len(&self) -> usize {
        if self.raw.bytes.is_null() { 0 } else { self.raw.size }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.raw.is_empty() {
            return &[];
        }
        // SAFETY: the descriptor is non-empty and either borrowed for 'a or
        // owned by us until clear.
        unsafe { std::slice::from_raw_parts(self.raw.bytes, self.raw.size) }
    }

    /// Writable view of library-owned storage; borrowed buffers are read-only.
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        if self.owner != BufferOwner::Library || self.raw.is_empty() {
            return None;
        }
        // SAFETY: library-owned storage is exclusively ours until clear.
        Some(unsafe { std::slice::from_raw_parts_mut(self.raw.bytes.cast_mut(), self.raw.size) })
    }

    /// Duplicate the contents into fresh storage from `allocator`.
    pub fn copy_with(&self, allocator: A) -> Result<NativeBuffer<'static, A>> {
        NativeBuffer::copy_in(allocator, self.as_slice())
    }

    /// Release the storage through the allocator that produced it and reset
    /// to empty. Calling it again does nothing.
    pub fn clear(&mut self) {
        let raw = std::mem::replace(&mut self.raw, RawBuffer::EMPTY);
        let owner = std::mem::replace(&mut self.owner, BufferOwner::Caller);
        let allocator = self.allocator.take();
        if owner != BufferOwner::Library {
            return;
        }
        if let (Some(block), Some(allocator)) = (NonNull::new(raw.bytes.cast_mut()), allocator) {
            // SAFETY: library-owned storage came from this allocator and the
            // descriptor no longer refers to it.
            unsafe { allocator.release(block) };
        }
    }

    /// Descriptor for passing to a native call.
    pub(crate) fn as_raw(&self) -> RawBuffer {
        self.raw
    }
}

impl<A: NativeAllocator> NativeBuffer<'static, A> {
    /// Adopt a buffer a native library allocated with `allocator`.
    ///
    /// # Safety
    ///
    /// `raw` must be empty or describe `raw.size` initialized bytes that
    /// were allocated by `allocator`'s heap and are owned by nobody else.
    pub unsafe fn from_raw(raw: RawBuffer, allocator: A) -> Self {
        if raw.bytes.is_null() {
            return Self::empty();
        }
        Self {
            raw,
            owner: BufferOwner::Library,
            allocator: Some(allocator),
            _borrow: PhantomData,
        }
    }

    /// Copy `bytes` into storage allocated by `allocator`.
    ///
    /// An empty source gives an empty buffer without allocating.
    pub fn copy_in(allocator: A, bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::empty());
        }
        let block = allocator.allocate(bytes.len()).ok_or_else(|| {
            tracing::warn!(allocator = allocator.name(), size = bytes.len(), "buffer copy failed");
            Error::AllocationFailure { size: bytes.len() }
        })?;
        // SAFETY: block has room for bytes.len() bytes and is fresh.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), block.as_ptr(), bytes.len()) };
        // SAFETY: just allocated by `allocator` and fully initialized.
        Ok(unsafe {
            Self::from_raw(
                RawBuffer {
                    bytes: block.as_ptr(),
                    size: bytes.len(),
                },
                allocator,
            )
        })
    }

    pub fn empty() -> Self {
        Self {
            raw: RawBuffer::EMPTY,
            owner: BufferOwner::Caller,
            allocator: None,
            _borrow: PhantomData,
        }
    }
}

impl<A: NativeAllocator> Drop for NativeBuffer<'_, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<A: NativeAllocator> std::fmt::Debug for NativeBuffer<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("owner", &self.owner)
            .field("len", &self.len())
            .field("allocator", &self.allocator.as_ref().map(|a| a.name()))
            .finish()
    }
}
