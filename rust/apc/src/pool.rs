//! Reusable invoke-id allocation.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use apc_wire::InvokeId;

/// Allocates correlation tags for outstanding requests.
///
/// The wire caps the tag at four decimal digits, so ids must be recycled
/// aggressively: [`InvokeIdPool::get`] always returns the lowest free tag,
/// and the issued tags form the dense prefix `1..=max_used` minus the free
/// set. Releasing the high-water tag walks `max_used` back down through any
/// contiguously freed tags.
#[derive(Debug, Default)]
pub struct InvokeIdPool {
    inner: Mutex<PoolInner>,
}

#[derive(Debug, Default)]
struct PoolInner {
    /// Highest tag ever issued and not yet reclaimed by the walk-down.
    max_used: u32,
    /// Released tags below `max_used`.
    free: BTreeSet<u32>,
}

impl InvokeIdPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lowest available tag.
    pub fn get(&self) -> InvokeId {
        let mut inner = self.inner.lock();
        if let Some(id) = inner.free.pop_first() {
            return InvokeId::new(id);
        }
        inner.max_used += 1;
        InvokeId::new(inner.max_used)
    }

    /// Return a tag to the pool.
    ///
    /// # Panics
    ///
    /// Releasing a tag that was never issued (zero, or above the high-water
    /// mark) or releasing the same tag twice is a programmer error.
    pub fn release(&self, id: InvokeId) {
        let raw = id.raw();
        let mut inner = self.inner.lock();
        assert!(
            raw != 0 && raw <= inner.max_used,
            "released invoke id {raw} was never issued"
        );

        if raw == inner.max_used {
            inner.max_used -= 1;
            loop {
                let top = inner.max_used;
                if top == 0 || !inner.free.remove(&top) {
                    break;
                }
                inner.max_used -= 1;
            }
        } else {
            assert!(inner.free.insert(raw), "invoke id {raw} released twice");
        }
    }

    #[cfg(test)]
    fn snapshot(&self) -> (u32, Vec<u32>) {
        let inner = self.inner.lock();
        (inner.max_used, inner.free.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_get_issues_one() {
        let pool = InvokeIdPool::new();
        assert_eq!(pool.get(), InvokeId::new(1));
        assert_eq!(pool.snapshot(), (1, vec![]));
    }

    #[test]
    fn second_get_extends_the_prefix() {
        let pool = InvokeIdPool::new();
        pool.get();
        assert_eq!(pool.get(), InvokeId::new(2));
        assert_eq!(pool.snapshot(), (2, vec![]));
    }

    #[test]
    fn release_below_high_water_goes_to_free_set() {
        let pool = InvokeIdPool::new();
        let first = pool.get();
        pool.get();
        pool.release(first);
        assert_eq!(pool.snapshot(), (2, vec![1]));
    }

    #[test]
    fn release_of_only_tag_resets_high_water() {
        let pool = InvokeIdPool::new();
        let first = pool.get();
        pool.release(first);
        assert_eq!(pool.snapshot(), (0, vec![]));
    }

    #[test]
    fn release_of_top_tag_shrinks_high_water() {
        let pool = InvokeIdPool::new();
        pool.get();
        let second = pool.get();
        pool.release(second);
        assert_eq!(pool.snapshot(), (1, vec![]));
    }

    #[test]
    fn release_of_top_tag_walks_down_through_freed_tags() {
        let pool = InvokeIdPool::new();
        let first = pool.get();
        let second = pool.get();
        let third = pool.get();
        pool.release(second);
        pool.release(first);
        assert_eq!(pool.snapshot(), (3, vec![1, 2]));

        // Releasing the top collapses the whole freed run.
        pool.release(third);
        assert_eq!(pool.snapshot(), (0, vec![]));
    }

    #[test]
    fn get_prefers_lowest_freed_tag() {
        let pool = InvokeIdPool::new();
        let first = pool.get();
        pool.get();
        pool.release(first);
        assert_eq!(pool.get(), InvokeId::new(1));
        assert_eq!(pool.snapshot(), (2, vec![]));
    }

    #[test]
    #[should_panic(expected = "never issued")]
    fn release_of_zero_panics() {
        let pool = InvokeIdPool::new();
        pool.get();
        pool.release(InvokeId::new(0));
    }

    #[test]
    #[should_panic(expected = "never issued")]
    fn release_above_high_water_panics() {
        let pool = InvokeIdPool::new();
        pool.get();
        pool.release(InvokeId::new(5));
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn double_release_panics() {
        let pool = InvokeIdPool::new();
        let first = pool.get();
        pool.get();
        pool.release(first);
        pool.release(first);
    }

    #[test]
    fn contended_gets_stay_unique() {
        use std::sync::Arc;

        let pool = Arc::new(InvokeIdPool::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || (0..100).map(|_| pool.get()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = std::collections::HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "invoke id {id} issued twice");
            }
        }
        assert_eq!(pool.snapshot().0, 800);
    }
}
