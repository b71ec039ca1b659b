//! Core identifier types for BasaltDB buffer management.

use serde::{Deserialize, Serialize};

/// Unique identifier for a frame in the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId(pub u32);

impl FrameId {
    /// Invalid frame ID.
    pub const INVALID: FrameId = FrameId(u32::MAX);

    /// Returns true if this is a valid frame ID.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// Unique identifier for a page within a file.
///
/// PageId consists of a file ID and page number within that file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId {
    /// File identifier (0 = data file, 1+ = index files).
    pub file_id: u32,
    /// Page number within the file (0-indexed).
    pub page_num: u32,
}

impl PageId {
    /// Creates a new PageId.
    pub fn new(file_id: u32, page_num: u32) -> Self {
        Self { file_id, page_num }
    }

    /// Returns the PageId as a single u64 for compact storage.
    pub fn as_u64(&self) -> u64 {
        ((self.file_id as u64) << 32) | (self.page_num as u64)
    }

    /// Creates a PageId from a u64 representation.
    pub fn from_u64(value: u64) -> Self {
        Self {
            file_id: (value >> 32) as u32,
            page_num: value as u32,
        }
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file_id, self.page_num)
    }
}
