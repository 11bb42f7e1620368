//! Bridge configuration
//!
//! Hosts usually build [`BridgeOptions`] once at startup. With the `serde`
//! feature it can be read from the host's own config file; missing fields
//! take their defaults.

use crate::bridge::alloc::DEFAULT_MAX_ALLOCATION;
use crate::transform::{TransformFlags, TransformOptions};
use crate::types::RenderingIntent;

/// Default number of parsed profiles kept by a cache
pub const DEFAULT_PROFILE_CACHE_CAPACITY: usize = 32;

/// Settings for a [`ProfileCache`](crate::ProfileCache) and the transforms
/// it creates
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BridgeOptions {
    /// Parsed profiles kept before the least recently used is evicted.
    /// Built-in profiles are not counted.
    pub profile_cache_capacity: usize,
    /// Intent used when a caller does not pass one
    pub default_intent: RenderingIntent,
    pub black_point_compensation: bool,
    /// Largest single allocation lcms2 may make through the bridge
    pub max_native_allocation: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            profile_cache_capacity: DEFAULT_PROFILE_CACHE_CAPACITY,
            default_intent: RenderingIntent::Perceptual,
            black_point_compensation: false,
            max_native_allocation: DEFAULT_MAX_ALLOCATION,
        }
    }
}

impl BridgeOptions {
    pub fn with_profile_cache_capacity(mut self, capacity: usize) -> Self {
        self.profile_cache_capacity = capacity.max(1);
        self
    }

    pub fn with_default_intent(mut self, intent: RenderingIntent) -> Self {
        self.default_intent = intent;
        self
    }

    pub fn with_black_point_compensation(mut self, enabled: bool) -> Self {
        self.black_point_compensation = enabled;
        self
    }

    pub fn with_max_native_allocation(mut self, bytes: usize) -> Self {
        self.max_native_allocation = bytes;
        self
    }

    /// Transform options implied by these settings
    pub fn transform_options(&self) -> TransformOptions {
        let mut flags = TransformFlags::empty();
        flags.set(TransformFlags::BLACK_POINT_COMPENSATION, self.black_point_compensation);
        TransformOptions {
            intent: self.default_intent,
            flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = BridgeOptions::default();
        assert_eq!(opts.profile_cache_capacity, 32);
        assert_eq!(opts.max_native_allocation, 512 * 1024 * 1024);
        assert_eq!(opts.transform_options(), TransformOptions::default());
    }

    #[test]
    fn test_builder() {
        let opts = BridgeOptions::default()
            .with_profile_cache_capacity(0)
            .with_default_intent(RenderingIntent::Saturation)
            .with_black_point_compensation(true);
        assert_eq!(opts.profile_cache_capacity, 1);
        let t = opts.transform_options();
        assert_eq!(t.intent, RenderingIntent::Saturation);
        assert!(t.flags.contains(TransformFlags::BLACK_POINT_COMPENSATION));
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_deserialize_partial() {
        let opts: BridgeOptions =
            serde_json::from_str(r#"{"profile_cache_capacity": 4, "default_intent": "saturation"}"#)
                .unwrap();
        assert_eq!(opts.profile_cache_capacity, 4);
        assert_eq!(opts.default_intent, RenderingIntent::Saturation);
        assert!(!opts.black_point_compensation);
    }
}
