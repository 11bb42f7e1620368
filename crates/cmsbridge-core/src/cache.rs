//! Content-keyed cache of parsed profiles
//!
//! The map lock is only held to find or insert a per-key slot. Parsing runs
//! inside the slot's `OnceCell`, so the same bytes are parsed once while
//! unrelated profiles parse in parallel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::config::BridgeOptions;
use crate::context::NativeContext;
use crate::format::{ColorModel, PixelFormat};
use crate::profile::{ColorProfile, ProfileKey};
use crate::transform::{TransformOptions, TransformSession};
use crate::{Error, Result};

type Cell = Arc<OnceCell<Arc<ColorProfile>>>;

struct Slot {
    cell: Cell,
    last_used: u64,
    pinned: bool,
}

/// Cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Native parses that ran, successful or not
    pub parses: u64,
    pub hits: u64,
    pub evictions: u64,
    /// Entries currently cached, built-in profiles included
    pub len: usize,
}

#[derive(Default)]
struct Counters {
    parses: AtomicU64,
    hits: AtomicU64,
    evictions: AtomicU64,
}

/// Process-scoped profile cache with its own lcms2 context.
///
/// Construct one at startup and share it (`Arc<ProfileCache>`); tests can
/// build as many isolated caches as they like.
pub struct ProfileCache {
    entries: Mutex<HashMap<ProfileKey, Slot>>,
    clock: AtomicU64,
    counters: Counters,
    srgb: Arc<ColorProfile>,
    sgray: Arc<ColorProfile>,
    options: BridgeOptions,
    context: Arc<NativeContext>,
}

impl ProfileCache {
    pub fn new(options: BridgeOptions) -> Result<Self> {
        let context = Arc::new(NativeContext::new(options.max_native_allocation)?);
        let srgb = Arc::new(ColorProfile::standard(&context, ColorModel::Rgb)?);
        let sgray = Arc::new(ColorProfile::standard(&context, ColorModel::Gray)?);

        let mut entries = HashMap::new();
        for profile in [&srgb, &sgray] {
            entries.insert(
                profile.key(),
                Slot {
                    cell: Arc::new(OnceCell::with_value(profile.clone())),
                    last_used: 0,
                    pinned: true,
                },
            );
        }

        tracing::debug!(capacity = options.profile_cache_capacity, "created profile cache");
        Ok(Self {
            entries: Mutex::new(entries),
            clock: AtomicU64::new(1),
            counters: Counters::default(),
            srgb,
            sgray,
            options,
            context,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(BridgeOptions::default())
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    pub fn context(&self) -> &Arc<NativeContext> {
        &self.context
    }

    /// Return the cached profile for `bytes`, parsing it on first use.
    ///
    /// Zero-length input is always [`Error::MalformedProfile`].
    pub fn get_or_add(&self, bytes: &[u8]) -> Result<Arc<ColorProfile>> {
        if bytes.is_empty() {
            return Err(Error::MalformedProfile("profile data is empty".into()));
        }
        let key = ProfileKey::of(bytes);
        self.lookup(key, || Arc::from(bytes))
    }

    pub(crate) fn get_or_add_shared(&self, key: ProfileKey, bytes: Arc<[u8]>) -> Result<Arc<ColorProfile>> {
        if bytes.is_empty() {
            return Err(Error::MalformedProfile("profile data is empty".into()));
        }
        self.lookup(key, || bytes)
    }

    fn lookup(&self, key: ProfileKey, bytes: impl FnOnce() -> Arc<[u8]>) -> Result<Arc<ColorProfile>> {
        let cell = {
            let mut entries = self.entries.lock();
            let tick = self.clock.fetch_add(1, Ordering::Relaxed);
            let slot = entries.entry(key).or_insert_with(|| Slot {
                cell: Arc::new(OnceCell::new()),
                last_used: tick,
                pinned: false,
            });
            slot.last_used = tick;
            slot.cell.clone()
        };

        let mut parsed = false;
        let result = cell.get_or_try_init(|| {
            parsed = true;
            self.counters.parses.fetch_add(1, Ordering::Relaxed);
            ColorProfile::parse(&self.context, key, bytes()).map(Arc::new)
        });

        match result {
            Ok(profile) => {
                let profile = profile.clone();
                if parsed {
                    self.evict_over_capacity();
                } else {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(%key, "profile cache hit");
                }
                Ok(profile)
            }
            Err(e) => {
                let mut entries = self.entries.lock();
                let failed = entries
                    .get(&key)
                    .is_some_and(|slot| Arc::ptr_eq(&slot.cell, &cell) && slot.cell.get().is_none());
                if failed {
                    entries.remove(&key);
                }
                Err(e)
            }
        }
    }

    fn evict_over_capacity(&self) {
        let mut entries = self.entries.lock();
        loop {
            let cached = entries.values().filter(|s| !s.pinned).count();
            if cached <= self.options.profile_cache_capacity {
                return;
            }
            // Slots still being parsed are never evicted.
            let victim = entries
                .iter()
                .filter(|(_, s)| !s.pinned && s.cell.get().is_some())
                .min_by_key(|(_, s)| s.last_used)
                .map(|(k, _)| *k);
            let Some(victim) = victim else {
                return;
            };
            entries.remove(&victim);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %victim, "evicted profile");
        }
    }

    /// Built-in profile for a color model: sRGB or gray with the sRGB
    /// tone curve. CMYK has none.
    pub fn standard(&self, model: ColorModel) -> Result<Arc<ColorProfile>> {
        match model {
            ColorModel::Rgb => Ok(self.srgb.clone()),
            ColorModel::Gray => Ok(self.sgray.clone()),
            ColorModel::Cmyk => Err(Error::UnsupportedFormat(
                "CMYK pixels need an explicit profile".into(),
            )),
        }
    }

    pub fn srgb(&self) -> &Arc<ColorProfile> {
        &self.srgb
    }

    pub fn contains(&self, key: &ProfileKey) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|s| s.cell.get().is_some())
    }

    /// Whether `profile` can be used with transforms from this cache
    pub fn owns(&self, profile: &ColorProfile) -> bool {
        profile.belongs_to(&self.context)
    }

    /// Drop every unpinned entry. Profiles still referenced elsewhere stay
    /// alive until their last `Arc` goes.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, s| s.pinned);
        tracing::debug!(removed = before - entries.len(), "cleared profile cache");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            parses: self.counters.parses.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            len: self.entries.lock().len(),
        }
    }

    /// Build a transform session. A missing profile means the built-in
    /// profile for that format's color model.
    pub fn create_transform(
        &self,
        src_profile: Option<&Arc<ColorProfile>>,
        src_format: PixelFormat,
        dst_profile: Option<&Arc<ColorProfile>>,
        dst_format: PixelFormat,
        options: TransformOptions,
    ) -> Result<TransformSession> {
        TransformSession::build(
            self,
            src_profile.cloned(),
            src_format.desc(),
            dst_profile.cloned(),
            dst_format.desc(),
            options,
        )
    }
}

impl std::fmt::Debug for ProfileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileCache")
            .field("stats", &self.stats())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_cache(capacity: usize) -> ProfileCache {
        ProfileCache::new(BridgeOptions::default().with_profile_cache_capacity(capacity)).unwrap()
    }

    #[test]
    fn test_standard_bytes_hit_pinned_entry() {
        let cache = ProfileCache::with_defaults().unwrap();
        let srgb = cache.srgb().clone();
        let again = cache.get_or_add(srgb.bytes()).unwrap();
        assert!(Arc::ptr_eq(&srgb, &again));
        assert_eq!(cache.stats().parses, 0);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_empty_is_malformed_and_not_cached() {
        let cache = ProfileCache::with_defaults().unwrap();
        let err = cache.get_or_add(&[]).unwrap_err();
        assert!(matches!(err, Error::MalformedProfile(_)));
        assert_eq!(cache.stats().len, 2);
    }

    #[test]
    fn test_failed_parse_leaves_no_entry() {
        let cache = ProfileCache::with_defaults().unwrap();
        let garbage = vec![7u8; 300];
        assert!(cache.get_or_add(&garbage).is_err());
        assert!(!cache.contains(&ProfileKey::of(&garbage)));
        assert_eq!(cache.stats().len, 2);
        // A retry parses again rather than reporting a stale failure
        assert!(cache.get_or_add(&garbage).is_err());
        assert_eq!(cache.stats().parses, 2);
    }

    /// Same profile with a different header creator field
    fn variant(base: &[u8], n: u32) -> Vec<u8> {
        let mut bytes = base.to_vec();
        bytes[80..84].copy_from_slice(&n.to_be_bytes());
        bytes
    }

    #[test]
    fn test_lru_eviction_keeps_pinned() {
        let cache = small_cache(2);
        let base = cache.srgb().bytes().to_vec();

        let first = cache.get_or_add(&variant(&base, 1)).unwrap();
        cache.get_or_add(&variant(&base, 2)).unwrap();
        // Touch the first so the second is least recently used
        cache.get_or_add(&variant(&base, 1)).unwrap();
        cache.get_or_add(&variant(&base, 3)).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.parses, 3);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.len, 4);
        assert!(cache.contains(&first.key()));
        assert!(!cache.contains(&ProfileKey::of(&variant(&base, 2))));
        assert!(cache.contains(&cache.srgb().key()));
    }

    #[test]
    fn test_evicted_profile_outlives_its_entry() {
        let cache = small_cache(1);
        let base = cache.srgb().bytes().to_vec();
        let first = cache.get_or_add(&variant(&base, 1)).unwrap();
        let handle = first.handle();
        cache.get_or_add(&variant(&base, 2)).unwrap();
        assert!(!cache.contains(&first.key()));
        assert!(handle.is_resident());
        assert!(Arc::ptr_eq(&handle.resolve(&cache).unwrap(), &first));

        drop(first);
        assert!(!handle.is_resident());
        let reparsed = handle.resolve(&cache).unwrap();
        assert_eq!(reparsed.key(), handle.key());
        assert_eq!(cache.stats().parses, 3);
    }

    #[test]
    fn test_clear_keeps_builtins() {
        let cache = ProfileCache::with_defaults().unwrap();
        cache.clear();
        assert_eq!(cache.stats().len, 2);
        assert!(cache.contains(&cache.srgb().key()));
    }
}
