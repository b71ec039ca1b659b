//! Configuration structures for BasaltDB buffer management.

use serde::{Deserialize, Serialize};

/// Configuration for the buffer pool core.
///
/// Covers the two in-memory structures the pool is built on: the LRU-K
/// replacer and the extendible hash page table. The embedding engine reads
/// these knobs once at startup and passes them to the constructors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Number of frames in the pool (also the replacer capacity).
    pub num_frames: usize,
    /// Number of historical accesses the replacer tracks per frame.
    pub replacer_k: usize,
    /// Number of entries each page-table bucket holds before splitting.
    pub bucket_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            num_frames: 1024,
            replacer_k: 2,
            bucket_size: 64,
        }
    }
}
