//! Native buffer ownership protocol
//!
//! Copies are independent, clears are idempotent, and every block goes back
//! to the allocator that produced it exactly once.

use std::sync::Arc;

use cms_tests::fixtures::display_p3_icc;
use cmsbridge_core::{
    BufferOwner, ColorSpace, CrtAllocator, Error, LcmsAllocator, MemoryManagerBridge, NativeAllocator, NativeBuffer,
    NativeContext, ProfileCache,
};

const LIMIT: usize = 64 * 1024;

fn context() -> Arc<NativeContext> {
    Arc::new(NativeContext::new(LIMIT).unwrap())
}

#[test]
fn test_borrowed_buffer_is_read_only() {
    let bytes = vec![1u8, 2, 3];
    let mut buffer = NativeBuffer::<CrtAllocator>::borrowed(&bytes);
    assert_eq!(buffer.owner(), BufferOwner::Caller);
    assert_eq!(buffer.as_slice(), &bytes[..]);
    assert!(buffer.as_mut_slice().is_none());

    buffer.clear();
    assert!(buffer.is_empty());
    assert_eq!(bytes, [1, 2, 3]);
}

#[test]
fn test_copy_is_independent() {
    let mut source = vec![9u8; 32];
    let mut first = NativeBuffer::copy_in(CrtAllocator, &source).unwrap();
    source.fill(0);
    assert!(first.as_slice().iter().all(|&b| b == 9));

    let second = first.copy_with(CrtAllocator).unwrap();
    first.as_mut_slice().unwrap()[0] = 42;
    assert_eq!(second.as_slice()[0], 9);
    assert_eq!(second.owner(), BufferOwner::Library);
}

#[test]
fn test_clear_returns_stats_to_baseline_once() {
    let ctx = context();
    let baseline = ctx.allocation_stats();

    let mut buffer = NativeBuffer::copy_in(LcmsAllocator::new(ctx.clone()), &[7u8; 1000]).unwrap();
    let held = ctx.allocation_stats();
    assert_eq!(held.live_blocks, baseline.live_blocks + 1);
    assert_eq!(held.live_bytes, baseline.live_bytes + 1000);

    buffer.clear();
    buffer.clear();
    drop(buffer);
    let after = ctx.allocation_stats();
    assert_eq!(after.live_blocks, baseline.live_blocks);
    assert_eq!(after.live_bytes, baseline.live_bytes);
    assert_eq!(after.total_allocations, held.total_allocations);
}

#[test]
fn test_copy_of_empty_allocates_nothing() {
    let ctx = context();
    let before = ctx.allocation_stats();
    let buffer = NativeBuffer::copy_in(LcmsAllocator::new(ctx.clone()), &[]).unwrap();
    assert!(buffer.is_empty());
    assert_eq!(buffer.len(), 0);
    assert_eq!(ctx.allocation_stats().total_allocations, before.total_allocations);
}

#[test]
fn test_copy_over_limit_is_allocation_failure() {
    let ctx = context();
    let before = ctx.allocation_stats();
    let big = vec![0u8; LIMIT + 1];
    let err = NativeBuffer::copy_in(LcmsAllocator::new(ctx.clone()), &big).unwrap_err();
    assert!(matches!(err, Error::AllocationFailure { size } if size == LIMIT + 1), "{err}");

    let after = ctx.allocation_stats();
    assert_eq!(after.refused, before.refused + 1);
    assert_eq!(after.live_blocks, before.live_blocks);
}

#[test]
fn test_memory_manager_table_routes_to_allocator() {
    let ctx = context();
    let bridge = MemoryManagerBridge::new(LcmsAllocator::new(ctx.clone()));
    let manager = bridge.manager();
    let baseline = ctx.allocation_stats();

    unsafe {
        let block = (manager.alloc.unwrap())(manager.opaque, 256);
        assert!(!block.is_null());
        assert_eq!(ctx.allocation_stats().live_blocks, baseline.live_blocks + 1);
        (manager.free.unwrap())(manager.opaque, block);
        // Freeing null is a no-op, as with free()
        (manager.free.unwrap())(manager.opaque, std::ptr::null_mut());
    }
    assert_eq!(ctx.allocation_stats().live_blocks, baseline.live_blocks);
    assert_eq!(bridge.allocator().name(), "lcms2");
}

#[test]
fn test_profile_saved_into_lcms_storage() {
    let cache = ProfileCache::with_defaults().unwrap();
    let p3 = cache.get_or_add(&display_p3_icc().unwrap()).unwrap();
    let saved = p3.save_to_buffer(LcmsAllocator::new(cache.context().clone())).unwrap();
    assert_eq!(saved.owner(), BufferOwner::Library);
    assert!(saved.len() > 128);

    let other = ProfileCache::with_defaults().unwrap();
    let reparsed = other.get_or_add(saved.as_slice()).unwrap();
    assert_eq!(reparsed.color_space(), ColorSpace::Rgb);
}
