//! Buffer pool core for BasaltDB.
//!
//! This crate provides the two in-memory structures the buffer pool
//! manager is built on:
//! - LRU-K eviction policy for selecting victim frames under memory
//!   pressure
//! - Extendible hash table for the page ID to frame ID page table
//!
//! The structures never call each other; the buffer pool manager
//! coordinates them (record accesses on every page touch, flip
//! evictability on pin transitions, drop the page-table entry of an
//! evicted frame).

mod hash_table;
mod replacer;

pub use hash_table::ExtendibleHashTable;
pub use replacer::{LrukReplacer, Replacer};
