//! Size limits enforced before any storage mutation
//!
//! The key limit is checked per row against the summed size of the key
//! cells (the serialized key). Violations are reported as BAD_REQUEST with
//! a message naming both the offending size and the threshold.

use thiserror::Error;

/// Largest serialized row key accepted by a shard (1 MiB + 1 KiB)
pub const MAX_WRITE_KEY_SIZE: usize = 1_049_600;

/// Size limits applied to write requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum serialized key size in bytes (default: 1,049,600)
    pub max_key_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_key_bytes: MAX_WRITE_KEY_SIZE,
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    pub fn with_small_limits() -> Self {
        Limits { max_key_bytes: 16 }
    }

    /// Validate a serialized key size
    pub fn validate_key_size(&self, size: usize) -> Result<(), LimitError> {
        if size > self.max_key_bytes {
            return Err(LimitError::KeyTooLarge {
                actual: size,
                max: self.max_key_bytes,
            });
        }
        Ok(())
    }
}

/// Limit validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    /// Serialized row key exceeds the threshold
    #[error("Row key size of {actual} bytes is larger than the allowed threshold {max}")]
    KeyTooLarge {
        /// Actual key size in bytes
        actual: usize,
        /// Maximum allowed size
        max: usize,
    },
}

impl LimitError {
    /// Stable reason code
    pub fn reason_code(&self) -> &'static str {
        match self {
            LimitError::KeyTooLarge { .. } => "key_too_large",
        }
    }
}
