//! Output comparison
//!
//! Two runs over the same lcms2 build should agree to the byte; the
//! thresholds in the tests leave room for one rounding step.

use std::fmt;

/// Per-channel absolute differences between two byte buffers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffStats {
    pub max: u8,
    pub mean: f64,
    /// Samples that differ at all
    pub mismatched: usize,
    pub count: usize,
}

impl DiffStats {
    pub fn is_exact(&self) -> bool {
        self.max == 0
    }

    /// Within one code value everywhere
    pub fn is_acceptable(&self) -> bool {
        self.max <= 1
    }
}

impl fmt::Display for DiffStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max={} mean={:.4} mismatched={}/{}",
            self.max, self.mean, self.mismatched, self.count
        )
    }
}

/// Compare the first `channels` samples of every `stride`-byte pixel.
///
/// Lets a BGRA result be checked against a BGR reference.
pub fn compare_channels(
    reference: &[u8],
    reference_stride: usize,
    result: &[u8],
    result_stride: usize,
    channels: usize,
) -> DiffStats {
    let mut max = 0u8;
    let mut sum = 0u64;
    let mut mismatched = 0;
    let mut count = 0;
    for (a, b) in reference
        .chunks_exact(reference_stride)
        .zip(result.chunks_exact(result_stride))
    {
        for c in 0..channels {
            let d = a[c].abs_diff(b[c]);
            max = max.max(d);
            sum += u64::from(d);
            mismatched += usize::from(d != 0);
            count += 1;
        }
    }
    DiffStats {
        max,
        mean: if count == 0 { 0.0 } else { sum as f64 / count as f64 },
        mismatched,
        count,
    }
}

/// Compare two buffers sample by sample
pub fn compare_buffers(reference: &[u8], result: &[u8]) -> DiffStats {
    assert_eq!(reference.len(), result.len(), "buffer lengths differ");
    compare_channels(reference, 1, result, 1, 1)
}
