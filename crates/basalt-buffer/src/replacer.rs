//! Page replacement policies for the buffer pool.

use basalt_common::{BasaltError, FrameId, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Trait for page replacement algorithms.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    ///
    /// Fails if the frame id is outside the replacer's capacity. The
    /// logical clock advances by one tick regardless of outcome.
    fn record_access(&self, frame_id: FrameId) -> Result<()>;

    /// Marks a frame as evictable (unpinned) or non-evictable (pinned).
    ///
    /// No-op for frames that have never been recorded.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Selects a victim frame for eviction and drops its bookkeeping.
    ///
    /// Returns None if no frames are evictable.
    fn evict(&self) -> Option<FrameId>;

    /// Removes a frame's access history from the replacer.
    ///
    /// No-op for unknown frames; fails for tracked frames that are
    /// currently non-evictable.
    fn remove(&self, frame_id: FrameId) -> Result<()>;

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// LRU-K replacement algorithm implementation.
///
/// Tracks the last K access timestamps of each frame and evicts the frame
/// with the largest backward k-distance: the time elapsed since the K-th
/// most recent access. Frames with fewer than K recorded accesses have
/// infinite distance and are always evicted first; ties among them fall
/// back to classic LRU on the earliest recorded access. This keeps one
/// sequential scan from flushing the pool's hot set.
pub struct LrukReplacer {
    /// Internal state protected by mutex.
    inner: Mutex<LrukReplacerInner>,
}

struct LrukReplacerInner {
    /// Maximum number of trackable frames.
    num_frames: usize,
    /// Number of historical accesses kept per frame.
    k: usize,
    /// Logical clock, one tick per recorded access. Never reset.
    current_ts: u64,
    /// Number of frames currently marked evictable.
    evictable_count: usize,
    /// Access history per tracked frame.
    frames: HashMap<FrameId, FrameAccess>,
}

#[derive(Default)]
struct FrameAccess {
    /// Up to K access ticks, oldest first.
    history: VecDeque<u64>,
    /// Whether this frame may be selected for eviction.
    evictable: bool,
}

impl FrameAccess {
    /// Oldest retained tick; for a frame with K accesses this is exactly
    /// the K-th most recent one.
    fn oldest_tick(&self) -> u64 {
        self.history.front().copied().unwrap_or(u64::MAX)
    }

    /// Returns true if this frame should be evicted before `other`.
    ///
    /// A frame with fewer than K accesses (infinite k-distance) always
    /// loses to one with a full history; otherwise the smaller oldest
    /// retained tick wins, which for full histories is the larger
    /// backward k-distance and for short histories is LRU recency.
    fn evicts_before(&self, other: &FrameAccess, k: usize) -> bool {
        if self.history.len() < k && other.history.len() == k {
            return true;
        }
        if self.history.len() == k && other.history.len() < k {
            return false;
        }
        self.oldest_tick() < other.oldest_tick()
    }
}

impl LrukReplacer {
    /// Creates a new LRU-K replacer tracking up to `num_frames` frames
    /// with `k` historical accesses each. `k` is clamped to a minimum
    /// of 1; K=1 degenerates to classic LRU.
    pub fn new(num_frames: usize, k: usize) -> Self {
        Self {
            inner: Mutex::new(LrukReplacerInner {
                num_frames,
                k: k.max(1),
                current_ts: 0,
                evictable_count: 0,
                frames: HashMap::new(),
            }),
        }
    }

    /// Returns the maximum number of trackable frames.
    pub fn capacity(&self) -> usize {
        self.inner.lock().num_frames
    }

    /// Returns the configured history depth K.
    pub fn k(&self) -> usize {
        self.inner.lock().k
    }

    #[cfg(test)]
    fn current_tick(&self) -> u64 {
        self.inner.lock().current_ts
    }

    #[cfg(test)]
    fn history_of(&self, frame_id: FrameId) -> Option<Vec<u64>> {
        let inner = self.inner.lock();
        inner
            .frames
            .get(&frame_id)
            .map(|f| f.history.iter().copied().collect())
    }
}

impl LrukReplacerInner {
    /// Drops a frame's bookkeeping. Caller has verified the frame is
    /// tracked and evictable.
    fn remove_frame(&mut self, frame_id: FrameId) {
        self.frames.remove(&frame_id);
        self.evictable_count -= 1;
    }
}

impl Replacer for LrukReplacer {
    fn record_access(&self, frame_id: FrameId) -> Result<()> {
        let mut inner = self.inner.lock();
        let tick = inner.current_ts;
        inner.current_ts += 1;

        if frame_id.0 as usize >= inner.num_frames {
            return Err(BasaltError::FrameOutOfRange {
                frame_id: frame_id.0,
                capacity: inner.num_frames,
            });
        }

        let k = inner.k;
        let frame = inner.frames.entry(frame_id).or_default();
        if frame.history.len() == k {
            frame.history.pop_front();
        }
        frame.history.push_back(tick);
        Ok(())
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut inner = self.inner.lock();
        let Some(frame) = inner.frames.get_mut(&frame_id) else {
            return;
        };

        let was_evictable = frame.evictable;
        frame.evictable = evictable;
        if !was_evictable && evictable {
            inner.evictable_count += 1;
        } else if was_evictable && !evictable {
            inner.evictable_count -= 1;
        }
    }

    fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        let k = inner.k;

        let mut victim: Option<FrameId> = None;
        for (&frame_id, frame) in &inner.frames {
            if !frame.evictable {
                continue;
            }
            let beats_current = match victim {
                None => true,
                Some(current) => frame.evicts_before(&inner.frames[&current], k),
            };
            if beats_current {
                victim = Some(frame_id);
            }
        }

        let frame_id = victim?;
        inner.remove_frame(frame_id);
        Some(frame_id)
    }

    fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut inner = self.inner.lock();
        let Some(frame) = inner.frames.get(&frame_id) else {
            return Ok(());
        };
        if !frame.evictable {
            return Err(BasaltError::FrameNotEvictable {
                frame_id: frame_id.0,
            });
        }
        inner.remove_frame(frame_id);
        Ok(())
    }

    fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records one access and marks the frame evictable.
    fn touch(replacer: &LrukReplacer, frame_id: u32) {
        replacer.record_access(FrameId(frame_id)).unwrap();
        replacer.set_evictable(FrameId(frame_id), true);
    }

    #[test]
    fn test_lruk_new() {
        let replacer = LrukReplacer::new(10, 2);
        assert_eq!(replacer.capacity(), 10);
        assert_eq!(replacer.k(), 2);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lruk_record_access_out_of_range() {
        let replacer = LrukReplacer::new(5, 2);

        let err = replacer.record_access(FrameId(5)).unwrap_err();
        assert!(matches!(
            err,
            BasaltError::FrameOutOfRange {
                frame_id: 5,
                capacity: 5
            }
        ));

        // A failed access never creates a tracked frame.
        replacer.set_evictable(FrameId(5), true);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lruk_clock_advances_on_failed_access() {
        let replacer = LrukReplacer::new(5, 2);
        assert_eq!(replacer.current_tick(), 0);

        replacer.record_access(FrameId(99)).unwrap_err();
        assert_eq!(replacer.current_tick(), 1);

        replacer.record_access(FrameId(0)).unwrap();
        assert_eq!(replacer.current_tick(), 2);
    }

    #[test]
    fn test_lruk_set_evictable_unknown_frame() {
        let replacer = LrukReplacer::new(10, 2);

        // Never recorded: silently ignored.
        replacer.set_evictable(FrameId(3), true);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lruk_size_tracks_evictable_transitions() {
        let replacer = LrukReplacer::new(10, 2);
        replacer.record_access(FrameId(0)).unwrap();
        replacer.record_access(FrameId(1)).unwrap();

        // New frames start non-evictable.
        assert_eq!(replacer.size(), 0);

        replacer.set_evictable(FrameId(0), true);
        replacer.set_evictable(FrameId(1), true);
        assert_eq!(replacer.size(), 2);

        // Redundant flips leave the count unchanged.
        replacer.set_evictable(FrameId(0), true);
        assert_eq!(replacer.size(), 2);

        replacer.set_evictable(FrameId(1), false);
        assert_eq!(replacer.size(), 1);
        replacer.set_evictable(FrameId(1), false);
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn test_lruk_evict_empty() {
        let replacer = LrukReplacer::new(10, 2);
        assert!(replacer.evict().is_none());

        // Tracked but pinned frames are not candidates.
        replacer.record_access(FrameId(0)).unwrap();
        assert!(replacer.evict().is_none());
    }

    #[test]
    fn test_lruk_evict_recency_tie_break() {
        let replacer = LrukReplacer::new(10, 2);

        // Frames 1, 2, 3 accessed once each (ticks 0, 1, 2): all have
        // infinite k-distance, so the least recently touched one goes.
        touch(&replacer, 1);
        touch(&replacer, 2);
        touch(&replacer, 3);

        assert_eq!(replacer.evict(), Some(FrameId(1)));
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_lruk_evict_protects_warmed_up_frames() {
        let replacer = LrukReplacer::new(10, 2);

        touch(&replacer, 1);
        touch(&replacer, 2);
        touch(&replacer, 3);
        assert_eq!(replacer.evict(), Some(FrameId(1)));

        // Frame 2 reaches K accesses and gains a finite k-distance;
        // frame 3 stays infinite and must be preferred.
        replacer.record_access(FrameId(2)).unwrap();
        assert_eq!(replacer.evict(), Some(FrameId(3)));
        assert_eq!(replacer.evict(), Some(FrameId(2)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lruk_evict_infinite_beats_finite_regardless_of_age() {
        let replacer = LrukReplacer::new(10, 2);

        // Frame 0 warms up first (ticks 0, 1), frame 1 arrives later with
        // a single access (tick 2). The younger frame is still evicted
        // first because its k-distance is infinite.
        replacer.record_access(FrameId(0)).unwrap();
        replacer.record_access(FrameId(0)).unwrap();
        replacer.set_evictable(FrameId(0), true);
        touch(&replacer, 1);

        assert_eq!(replacer.evict(), Some(FrameId(1)));
        assert_eq!(replacer.evict(), Some(FrameId(0)));
    }

    #[test]
    fn test_lruk_evict_largest_backward_k_distance() {
        let replacer = LrukReplacer::new(10, 2);

        // K=2 histories: frame 0 = {0, 5}, frame 1 = {1, 2}, frame 2 = {3, 4}.
        // The k-th most recent accesses are ticks 0, 1, and 3; frame 0 has
        // the largest backward distance.
        replacer.record_access(FrameId(0)).unwrap(); // tick 0
        replacer.record_access(FrameId(1)).unwrap(); // tick 1
        replacer.record_access(FrameId(1)).unwrap(); // tick 2
        replacer.record_access(FrameId(2)).unwrap(); // tick 3
        replacer.record_access(FrameId(2)).unwrap(); // tick 4
        replacer.record_access(FrameId(0)).unwrap(); // tick 5
        for i in 0..3 {
            replacer.set_evictable(FrameId(i), true);
        }

        assert_eq!(replacer.evict(), Some(FrameId(0)));
        assert_eq!(replacer.evict(), Some(FrameId(1)));
        assert_eq!(replacer.evict(), Some(FrameId(2)));
    }

    #[test]
    fn test_lruk_history_is_sliding_window() {
        let replacer = LrukReplacer::new(10, 2);

        // Six accesses with K=2 retain only the two most recent ticks.
        for _ in 0..6 {
            replacer.record_access(FrameId(0)).unwrap();
        }
        assert_eq!(replacer.history_of(FrameId(0)), Some(vec![4, 5]));

        // The retained window drives eviction: frame 0's k-th most recent
        // access (tick 4) is older than frame 1's (tick 6).
        replacer.record_access(FrameId(1)).unwrap(); // tick 6
        replacer.record_access(FrameId(1)).unwrap(); // tick 7
        replacer.set_evictable(FrameId(0), true);
        replacer.set_evictable(FrameId(1), true);

        assert_eq!(replacer.evict(), Some(FrameId(0)));
    }

    #[test]
    fn test_lruk_remove_unknown_frame() {
        let replacer = LrukReplacer::new(10, 2);
        assert!(replacer.remove(FrameId(4)).is_ok());
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lruk_remove_non_evictable_fails() {
        let replacer = LrukReplacer::new(10, 2);
        replacer.record_access(FrameId(4)).unwrap();

        let err = replacer.remove(FrameId(4)).unwrap_err();
        assert!(matches!(
            err,
            BasaltError::FrameNotEvictable { frame_id: 4 }
        ));

        // The frame is still tracked afterwards.
        replacer.set_evictable(FrameId(4), true);
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn test_lruk_remove_discards_history() {
        let replacer = LrukReplacer::new(10, 2);

        // Warm frame 0 up, then remove it; on return it must start cold
        // (infinite k-distance) and lose to the warmed-up frame 1.
        replacer.record_access(FrameId(0)).unwrap();
        replacer.record_access(FrameId(0)).unwrap();
        replacer.set_evictable(FrameId(0), true);
        replacer.remove(FrameId(0)).unwrap();
        assert_eq!(replacer.size(), 0);

        replacer.record_access(FrameId(1)).unwrap();
        replacer.record_access(FrameId(1)).unwrap();
        replacer.set_evictable(FrameId(1), true);
        touch(&replacer, 0);

        assert_eq!(replacer.evict(), Some(FrameId(0)));
    }

    #[test]
    fn test_lruk_evict_removes_bookkeeping() {
        let replacer = LrukReplacer::new(10, 2);
        touch(&replacer, 0);

        assert_eq!(replacer.evict(), Some(FrameId(0)));
        assert_eq!(replacer.size(), 0);

        // Evicted frames are forgotten entirely.
        replacer.set_evictable(FrameId(0), true);
        assert_eq!(replacer.size(), 0);
        assert!(replacer.remove(FrameId(0)).is_ok());
    }

    #[test]
    fn test_lruk_pin_unpin_cycle() {
        let replacer = LrukReplacer::new(3, 2);
        touch(&replacer, 0);
        touch(&replacer, 1);
        touch(&replacer, 2);
        assert_eq!(replacer.size(), 3);

        // Pin frame 0 (the best victim); eviction must skip it.
        replacer.set_evictable(FrameId(0), false);
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.evict(), Some(FrameId(1)));

        // Unpin frame 0; it becomes the victim again.
        replacer.set_evictable(FrameId(0), true);
        assert_eq!(replacer.evict(), Some(FrameId(0)));
    }

    #[test]
    fn test_lruk_usable_as_trait_object() {
        let replacer: Box<dyn Replacer> = Box::new(LrukReplacer::new(4, 2));
        replacer.record_access(FrameId(0)).unwrap();
        replacer.set_evictable(FrameId(0), true);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.evict(), Some(FrameId(0)));
    }

    #[test]
    fn test_lruk_k_equals_one_behaves_like_lru() {
        let replacer = LrukReplacer::new(10, 1);

        touch(&replacer, 0);
        touch(&replacer, 1);
        replacer.record_access(FrameId(0)).unwrap(); // refresh frame 0

        assert_eq!(replacer.evict(), Some(FrameId(1)));
        assert_eq!(replacer.evict(), Some(FrameId(0)));
    }
}
