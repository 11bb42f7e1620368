//! Managed allocator callbacks
//!
//! Two directions are covered here:
//!
//! - lcms2 allocates through a `cmsPluginMemHandler` whose thunks carve
//!   blocks out of the Rust global allocator and count them in
//!   [`AllocationStats`].
//! - libjxl style `JxlMemoryManager` tables are built over any
//!   [`NativeAllocator`] by [`MemoryManagerBridge`].

use std::alloc::{self, Layout};
use std::os::raw::c_void;
use std::ptr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::bridge::{self, Registration};
use crate::buffer::NativeAllocator;
use crate::ffi::jxl::JxlMemoryManager;
use crate::ffi::lcms::{
    LCMS_MIN_VERSION, cmsContext, cmsGetContextUserData, cmsPluginBase, cmsPluginMagicNumber,
    cmsPluginMemHandler, cmsPluginMemHandlerSig, cmsUInt32Number,
};

/// lcms2's own ceiling for a single allocation
pub const DEFAULT_MAX_ALLOCATION: usize = 512 * 1024 * 1024;

// Every block starts with [size: usize][stats: *const AllocationStats],
// padded so the returned pointer keeps the header's alignment.
const HEADER: usize = 16;
const ALIGN: usize = 16;

/// Allocation counters for one native context
#[derive(Debug, Default)]
pub struct AllocationStats {
    live_blocks: AtomicUsize,
    live_bytes: AtomicUsize,
    total_allocations: AtomicU64,
    refused: AtomicU64,
}

/// Point-in-time copy of [`AllocationStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocationSnapshot {
    pub live_blocks: usize,
    pub live_bytes: usize,
    pub total_allocations: u64,
    /// Requests over the size limit or failed by the system allocator
    pub refused: u64,
}

impl AllocationStats {
    pub fn snapshot(&self) -> AllocationSnapshot {
        AllocationSnapshot {
            live_blocks: self.live_blocks.load(Ordering::Acquire),
            live_bytes: self.live_bytes.load(Ordering::Acquire),
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
            refused: self.refused.load(Ordering::Relaxed),
        }
    }
}

/// State reachable from an lcms2 context's user-data pointer.
pub(crate) struct ContextState {
    pub(crate) stats: AllocationStats,
    pub(crate) max_allocation: usize,
    plugin: cmsPluginMemHandler,
}

// `plugin.base.Next` is always null; lcms2 reads the plugin only while the
// context is being created.
unsafe impl Send for ContextState {}
unsafe impl Sync for ContextState {}

impl ContextState {
    pub(crate) fn new(max_allocation: usize) -> Self {
        Self {
            stats: AllocationStats::default(),
            max_allocation,
            plugin: cmsPluginMemHandler {
                base: cmsPluginBase {
                    Magic: cmsPluginMagicNumber,
                    ExpectedVersion: LCMS_MIN_VERSION as u32,
                    Type: cmsPluginMemHandlerSig,
                    Next: ptr::null_mut(),
                },
                MallocPtr: Some(lcms_malloc),
                FreePtr: Some(lcms_free),
                ReallocPtr: Some(lcms_realloc),
                MallocZeroPtr: None,
                CallocPtr: None,
                DupPtr: None,
            },
        }
    }

    /// Plugin chain to pass to `cmsCreateContext`.
    pub(crate) fn plugin_ptr(&mut self) -> *mut c_void {
        (&mut self.plugin as *mut cmsPluginMemHandler).cast()
    }
}

/// Resolve our state from a context handle.
///
/// lcms2 passes null or a temporary context while it creates and tears down
/// a context; both resolve to its global user data, which is null.
unsafe fn state_for<'a>(ctx: cmsContext) -> Option<&'a ContextState> {
    if ctx.is_null() {
        return None;
    }
    // SAFETY: every context that carries these thunks was created with a
    // `Registration<ContextState>` as its user data, and the registration
    // outlives the context.
    unsafe { Registration::<ContextState>::from_user_data(cmsGetContextUserData(ctx)) }
}

fn block_layout(size: usize) -> Option<Layout> {
    Layout::from_size_align(size.checked_add(HEADER)?, ALIGN).ok()
}

unsafe fn heap_alloc(state: Option<&ContextState>, size: usize) -> *mut c_void {
    let limit = state.map_or(DEFAULT_MAX_ALLOCATION, |s| s.max_allocation);
    let stats = state.map(|s| &s.stats);
    let layout = match block_layout(size) {
        Some(layout) if size <= limit => layout,
        _ => {
            refuse(stats, size);
            return ptr::null_mut();
        }
    };
    // SAFETY: layout has non-zero size.
    let base = unsafe { alloc::alloc(layout) };
    if base.is_null() {
        refuse(stats, size);
        return ptr::null_mut();
    }
    let stats_ptr = stats.map_or(ptr::null(), |s| s as *const AllocationStats);
    // SAFETY: base is 16-byte aligned with room for two words.
    unsafe {
        base.cast::<usize>().write(size);
        base.cast::<usize>().add(1).cast::<*const AllocationStats>().write(stats_ptr);
    }
    if let Some(stats) = stats {
        stats.live_blocks.fetch_add(1, Ordering::AcqRel);
        stats.live_bytes.fetch_add(size, Ordering::AcqRel);
        stats.total_allocations.fetch_add(1, Ordering::Relaxed);
    }
    // SAFETY: HEADER < layout.size()
    unsafe { base.add(HEADER).cast() }
}

unsafe fn read_header(block: *mut c_void) -> (*mut u8, usize, *const AllocationStats) {
    // SAFETY: block was returned by heap_alloc/heap_realloc.
    unsafe {
        let base = block.cast::<u8>().sub(HEADER);
        let size = base.cast::<usize>().read();
        let stats = base.cast::<usize>().add(1).cast::<*const AllocationStats>().read();
        (base, size, stats)
    }
}

unsafe fn heap_free(block: *mut c_void) {
    if block.is_null() {
        return;
    }
    // SAFETY: non-null blocks handed to lcms2 come from heap_alloc.
    let (base, size, stats) = unsafe { read_header(block) };
    // SAFETY: the stats outlive every block they count.
    if let Some(stats) = unsafe { stats.as_ref() } {
        stats.live_blocks.fetch_sub(1, Ordering::AcqRel);
        stats.live_bytes.fetch_sub(size, Ordering::AcqRel);
    }
    if let Some(layout) = block_layout(size) {
        // SAFETY: same layout as the allocation.
        unsafe { alloc::dealloc(base, layout) };
    }
}

unsafe fn heap_realloc(state: Option<&ContextState>, block: *mut c_void, new_size: usize) -> *mut c_void {
    if block.is_null() {
        // SAFETY: forwarded.
        return unsafe { heap_alloc(state, new_size) };
    }
    let limit = state.map_or(DEFAULT_MAX_ALLOCATION, |s| s.max_allocation);
    // SAFETY: non-null blocks handed to lcms2 come from heap_alloc.
    let (base, old_size, stats_ptr) = unsafe { read_header(block) };
    // SAFETY: the stats outlive every block they count.
    let stats = unsafe { stats_ptr.as_ref() };
    let (Some(old_layout), Some(_)) = (block_layout(old_size), block_layout(new_size)) else {
        refuse(stats, new_size);
        return ptr::null_mut();
    };
    if new_size > limit {
        refuse(stats, new_size);
        return ptr::null_mut();
    }
    // SAFETY: base/old_layout describe the live block; new size is checked.
    let new_base = unsafe { alloc::realloc(base, old_layout, new_size + HEADER) };
    if new_base.is_null() {
        refuse(stats, new_size);
        return ptr::null_mut();
    }
    // SAFETY: the header moved with the block.
    unsafe { new_base.cast::<usize>().write(new_size) };
    if let Some(stats) = stats {
        stats.live_bytes.fetch_add(new_size, Ordering::AcqRel);
        stats.live_bytes.fetch_sub(old_size, Ordering::AcqRel);
    }
    // SAFETY: HEADER < new layout size
    unsafe { new_base.add(HEADER).cast() }
}

fn refuse(stats: Option<&AllocationStats>, size: usize) {
    if let Some(stats) = stats {
        stats.refused.fetch_add(1, Ordering::Relaxed);
    }
    tracing::warn!(size, "native allocation refused");
}

unsafe extern "C" fn lcms_malloc(ctx: cmsContext, size: cmsUInt32Number) -> *mut c_void {
    bridge::guard("lcms malloc", ptr::null_mut(), || unsafe {
        heap_alloc(state_for(ctx), size as usize)
    })
}

unsafe extern "C" fn lcms_free(_ctx: cmsContext, block: *mut c_void) {
    bridge::guard("lcms free", (), || unsafe { heap_free(block) })
}

unsafe extern "C" fn lcms_realloc(
    ctx: cmsContext,
    block: *mut c_void,
    new_size: cmsUInt32Number,
) -> *mut c_void {
    bridge::guard("lcms realloc", ptr::null_mut(), || unsafe {
        heap_realloc(state_for(ctx), block, new_size as usize)
    })
}

/// A `JxlMemoryManager` table backed by a [`NativeAllocator`].
///
/// The table's `opaque` pointer refers to the allocator owned by this
/// bridge, so the bridge must outlive every native object created with the
/// table and every block allocated through it.
pub struct MemoryManagerBridge<A: NativeAllocator> {
    registration: Registration<A>,
}

impl<A: NativeAllocator + Sync> MemoryManagerBridge<A> {
    pub fn new(allocator: A) -> Self {
        Self {
            registration: Registration::new(allocator),
        }
    }

    pub fn allocator(&self) -> &A {
        self.registration.get()
    }

    /// The table to hand to the native library.
    pub fn manager(&self) -> JxlMemoryManager {
        JxlMemoryManager {
            opaque: self.registration.as_user_data(),
            alloc: Some(jxl_alloc::<A>),
            free: Some(jxl_free::<A>),
        }
    }
}

unsafe extern "C" fn jxl_alloc<A: NativeAllocator>(opaque: *mut c_void, size: usize) -> *mut c_void {
    bridge::guard("jxl alloc", ptr::null_mut(), || {
        // SAFETY: opaque comes from MemoryManagerBridge::manager.
        let allocator = unsafe { Registration::<A>::from_user_data(opaque) };
        allocator
            .and_then(|a| a.allocate(size))
            .map_or(ptr::null_mut(), |p| p.as_ptr().cast())
    })
}

unsafe extern "C" fn jxl_free<A: NativeAllocator>(opaque: *mut c_void, address: *mut c_void) {
    bridge::guard("jxl free", (), || {
        let Some(block) = ptr::NonNull::new(address.cast::<u8>()) else {
            return;
        };
        // SAFETY: opaque comes from MemoryManagerBridge::manager and address
        // was returned by jxl_alloc on the same table.
        unsafe {
            if let Some(allocator) = Registration::<A>::from_user_data(opaque) {
                allocator.release(block);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::CrtAllocator;

    #[test]
    fn test_heap_counts_blocks() {
        let state = ContextState::new(1024);
        unsafe {
            let a = heap_alloc(Some(&state), 100);
            let b = heap_alloc(Some(&state), 28);
            assert!(!a.is_null() && !b.is_null());
            assert_eq!(a as usize % ALIGN, 0);
            let snap = state.stats.snapshot();
            assert_eq!(snap.live_blocks, 2);
            assert_eq!(snap.live_bytes, 128);

            heap_free(a);
            heap_free(b);
        }
        let snap = state.stats.snapshot();
        assert_eq!(snap.live_blocks, 0);
        assert_eq!(snap.live_bytes, 0);
        assert_eq!(snap.total_allocations, 2);
    }

    #[test]
    fn test_heap_refuses_over_limit() {
        let state = ContextState::new(64);
        let block = unsafe { heap_alloc(Some(&state), 65) };
        assert!(block.is_null());
        assert_eq!(state.stats.snapshot().refused, 1);
        assert_eq!(state.stats.snapshot().live_blocks, 0);
    }

    #[test]
    fn test_realloc_preserves_contents() {
        let state = ContextState::new(1024);
        unsafe {
            let block = heap_alloc(Some(&state), 4).cast::<u8>();
            block.copy_from_nonoverlapping([1u8, 2, 3, 4].as_ptr(), 4);
            let grown = heap_realloc(Some(&state), block.cast(), 512).cast::<u8>();
            assert!(!grown.is_null());
            assert_eq!(std::slice::from_raw_parts(grown, 4), &[1, 2, 3, 4]);
            assert_eq!(state.stats.snapshot().live_bytes, 512);
            assert!(heap_realloc(Some(&state), grown.cast(), 2048).is_null());
            heap_free(grown.cast());
        }
        assert_eq!(state.stats.snapshot(), AllocationSnapshot {
            live_blocks: 0,
            live_bytes: 0,
            total_allocations: 1,
            refused: 1,
        });
    }

    #[test]
    fn test_untracked_blocks_free_cleanly() {
        unsafe {
            let block = heap_alloc(None, 16);
            assert!(!block.is_null());
            heap_free(block);
            heap_free(ptr::null_mut());
        }
    }

    #[test]
    fn test_memory_manager_round_trip() {
        let bridge = MemoryManagerBridge::new(CrtAllocator);
        let manager = bridge.manager();
        unsafe {
            let block = (manager.alloc.unwrap())(manager.opaque, 32);
            assert!(!block.is_null());
            block.cast::<u8>().write_bytes(0xAB, 32);
            (manager.free.unwrap())(manager.opaque, block);
            (manager.free.unwrap())(manager.opaque, ptr::null_mut());
        }
    }
}
