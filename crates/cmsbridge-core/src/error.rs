//! Error types for cmsbridge

use thiserror::Error;

/// Result type for cmsbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur at the native boundary
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// ICC bytes that the native parser rejected (or empty input)
    #[error("Malformed profile: {0}")]
    MalformedProfile(String),

    /// Pixel format or profile combination with no native mapping
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A native routine returned its failure sentinel
    #[error("Native call {operation} failed{}", native_detail(.code, .message))]
    NativeCallFailure {
        operation: &'static str,
        /// Library-specific error code, when the library reports one
        code: Option<u32>,
        message: Option<String>,
    },

    /// Caller buffer or stride is smaller than required
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    /// Requested rectangle is negative or outside the source bounds
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// A native allocator returned null
    #[error("Native allocation of {size} bytes failed")]
    AllocationFailure { size: usize },
}

impl Error {
    /// Build a `NativeCallFailure`, picking up whatever the native error
    /// callback recorded on this thread since the last call.
    pub(crate) fn native(operation: &'static str) -> Self {
        match crate::bridge::take_last_error() {
            Some(e) => Error::NativeCallFailure {
                operation,
                code: Some(e.code),
                message: Some(e.message),
            },
            None => Error::NativeCallFailure {
                operation,
                code: None,
                message: None,
            },
        }
    }
}

fn native_detail(code: &Option<u32>, message: &Option<String>) -> String {
    match (code, message) {
        (Some(c), Some(m)) => format!(" (code {c}): {m}"),
        (Some(c), None) => format!(" (code {c})"),
        (None, Some(m)) => format!(": {m}"),
        (None, None) => String::new(),
    }
}
