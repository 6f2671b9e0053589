//! Fixed-size cache of page indices whose bitmaps are kept off-screen

use log::debug;

use super::error::RenderError;
use super::types::ViewTime;

/// Outcome of [`PageCache::insert`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheInsertion {
    /// The page was cached before; nothing changed
    AlreadyCached,
    /// The page took a free slot
    Inserted { slot: usize },
    /// The cache was full; `evicted` gave up its slot
    Evicted { slot: usize, evicted: usize },
}

impl CacheInsertion {
    #[must_use]
    pub const fn evicted(&self) -> Option<usize> {
        match self {
            Self::Evicted { evicted, .. } => Some(*evicted),
            _ => None,
        }
    }
}

/// Set of cached pages with least-recently-viewed eviction.
///
/// Recency is the owning request's `last_view_time`, looked up when a victim
/// is needed, so pages that were looked at again after being cached survive
/// longer. Capacity is a few dozen pages; every operation is a linear scan.
#[derive(Debug, Clone)]
pub struct PageCache {
    slots: Vec<Option<usize>>,
    len: usize,
}

impl PageCache {
    /// Create a new cache with the given capacity (at least one slot).
    ///
    /// The capacity comes from user settings, so a failed allocation is
    /// reported instead of aborting.
    pub fn new(capacity: usize) -> Result<Self, RenderError> {
        let capacity = capacity.max(1);
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| RenderError::CacheAllocation { capacity })?;
        slots.resize(capacity, None);

        Ok(Self { slots, len: 0 })
    }

    #[must_use]
    pub fn is_cached(&self, page: usize) -> bool {
        if self.len != 0 && self.slots.iter().flatten().any(|&p| p == page) {
            debug!("Page {} is a cache hit", page + 1);
            return true;
        }
        debug!("Page {} is a cache miss", page + 1);
        false
    }

    /// Insert a page, evicting the least recently viewed one when full.
    ///
    /// `view_time_of` reports the current view time of a cached page.
    pub fn insert<F>(&mut self, page: usize, view_time_of: F) -> CacheInsertion
    where
        F: Fn(usize) -> ViewTime,
    {
        if self.is_cached(page) {
            return CacheInsertion::AlreadyCached;
        }

        if let Some(slot) = self.slots.iter().position(Option::is_none) {
            self.slots[slot] = Some(page);
            self.len += 1;
            debug!("Page {} is cached at cache index {slot}", page + 1);
            return CacheInsertion::Inserted { slot };
        }

        let (slot, evicted) = self.least_recently_viewed(&view_time_of);
        self.slots[slot] = Some(page);
        debug!(
            "Invalidated page {} at cache index {slot}, page {} takes its place",
            evicted + 1,
            page + 1
        );
        CacheInsertion::Evicted { slot, evicted }
    }

    // Only called when full, so every slot holds a page.
    fn least_recently_viewed<F>(&self, view_time_of: &F) -> (usize, usize)
    where
        F: Fn(usize) -> ViewTime,
    {
        let mut lru = (0, self.slots[0].unwrap_or_default());
        let mut lru_time = ViewTime::from_micros(i64::MAX);
        for (slot, page) in self.slots.iter().enumerate() {
            let Some(page) = *page else { continue };
            let time = view_time_of(page);
            if time < lru_time {
                lru_time = time;
                lru = (slot, page);
            }
        }
        lru
    }

    /// Clear all cached pages, returning the pages that were cached
    pub fn invalidate_all(&mut self) -> Vec<usize> {
        let pages = self.pages();
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.len = 0;
        pages
    }

    /// Cached pages in slot order
    #[must_use]
    pub fn pages(&self) -> Vec<usize> {
        self.slots.iter().flatten().copied().collect()
    }

    /// Number of cached pages
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn times(pairs: &[(usize, i64)]) -> impl Fn(usize) -> ViewTime {
        let map: HashMap<usize, i64> = pairs.iter().copied().collect();
        move |page| ViewTime::from_micros(map.get(&page).copied().unwrap_or(i64::MIN))
    }

    #[test]
    fn cache_insert_and_lookup() {
        let mut cache = PageCache::new(10).unwrap();
        let t = times(&[]);

        assert_eq!(cache.insert(3, &t), CacheInsertion::Inserted { slot: 0 });
        assert!(cache.is_cached(3));
        assert!(!cache.is_cached(4));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn insert_twice_is_noop() {
        let mut cache = PageCache::new(2).unwrap();
        let t = times(&[]);

        cache.insert(1, &t);
        assert_eq!(cache.insert(1, &t), CacheInsertion::AlreadyCached);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_smallest_view_time() {
        let mut cache = PageCache::new(2).unwrap();
        let t = times(&[(5, 100), (7, 200), (9, 300)]);

        cache.insert(5, &t);
        cache.insert(7, &t);
        let outcome = cache.insert(9, &t);

        assert_eq!(outcome, CacheInsertion::Evicted { slot: 0, evicted: 5 });
        assert_eq!(outcome.evicted(), Some(5));
        let mut pages = cache.pages();
        pages.sort_unstable();
        assert_eq!(pages, vec![7, 9]);
    }

    #[test]
    fn recency_is_read_at_eviction_time() {
        let mut cache = PageCache::new(3).unwrap();
        cache.insert(1, times(&[]));
        cache.insert(2, times(&[]));
        cache.insert(3, times(&[]));

        // Page 1 was inserted first but looked at most recently.
        let outcome = cache.insert(4, times(&[(1, 500), (2, 100), (3, 300)]));
        assert_eq!(outcome.evicted(), Some(2));
        assert!(cache.is_cached(1));
        assert!(cache.is_cached(4));
    }

    #[test]
    fn pages_without_a_request_go_first() {
        let mut cache = PageCache::new(2).unwrap();
        cache.insert(1, times(&[]));
        cache.insert(2, times(&[]));

        let outcome = cache.insert(3, times(&[(1, 10)]));
        assert_eq!(outcome.evicted(), Some(2));
    }

    #[test]
    fn lru_holds_for_any_capacity() {
        for capacity in 1..6 {
            let mut cache = PageCache::new(capacity).unwrap();
            let t = |page: usize| ViewTime::from_micros(page as i64 * 10);
            for page in 0..capacity {
                cache.insert(page, t);
            }
            assert!(cache.is_full());

            let outcome = cache.insert(100, t);
            assert_eq!(outcome.evicted(), Some(0), "capacity {capacity}");
        }
    }

    #[test]
    fn cache_invalidate_all() {
        let mut cache = PageCache::new(10).unwrap();
        let t = times(&[]);
        for i in 0..5 {
            cache.insert(i, &t);
        }

        assert_eq!(cache.len(), 5);
        let dropped = cache.invalidate_all();
        assert_eq!(dropped, vec![0, 1, 2, 3, 4]);
        assert!(cache.is_empty());
        assert!(!cache.is_cached(0));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache = PageCache::new(0).unwrap();
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn oversized_capacity_is_an_error() {
        assert!(matches!(
            PageCache::new(usize::MAX),
            Err(RenderError::CacheAllocation {
                capacity: usize::MAX
            })
        ));
    }
}
