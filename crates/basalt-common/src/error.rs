//! Error types for BasaltDB buffer components.

use thiserror::Error;

/// Result type alias using BasaltError.
pub type Result<T> = std::result::Result<T, BasaltError>;

/// Errors that can occur in BasaltDB buffer operations.
///
/// Every variant is local and synchronous: a failed call leaves the
/// component in its prior state and the caller is expected to fix its
/// own logic rather than retry.
#[derive(Debug, Error)]
pub enum BasaltError {
    // Replacer errors
    #[error("frame id out of range: {frame_id} (capacity {capacity})")]
    FrameOutOfRange { frame_id: u32, capacity: usize },

    #[error("cannot remove non-evictable frame {frame_id}")]
    FrameNotEvictable { frame_id: u32 },

    // Configuration errors
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}
