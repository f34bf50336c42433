use crate::coordinates::{Coordinate, CoordinateKey};
use crate::store::SampleStore;
use std::collections::HashMap;

/// Where a seen coordinate was learned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeenVia {
    ThisRun,
    Store,
}

/// Two-tier "already sampled?" index.
///
/// The in-memory cache is the fast path for the current run and is never
/// evicted. On a miss the store is asked whether a row with the same rounded
/// coordinate exists; a hit is cached. If the store cannot answer, the point
/// is skipped for now but not cached, so a later tick asks again.
#[derive(Debug, Default)]
pub struct DedupeIndex {
    cache: HashMap<CoordinateKey, SeenVia>,
    check_store: bool,
}

impl DedupeIndex {
    pub fn new(check_store: bool) -> Self {
        Self {
            cache: HashMap::new(),
            check_store,
        }
    }

    /// Distinct rounded points known to be sampled.
    pub fn seen_count(&self) -> usize {
        self.cache.len()
    }

    pub async fn should_skip<S>(&mut self, store: &S, coordinate: &Coordinate) -> bool
    where
        S: SampleStore + ?Sized,
    {
        let key = coordinate.key();
        if let Some(via) = self.cache.get(&key) {
            tracing::debug!(key = %key, via = ?via, "coordinate already sampled");
            return true;
        }
        if !self.check_store {
            return false;
        }

        match store.contains(coordinate).await {
            Ok(true) => {
                tracing::debug!(key = %key, "coordinate already in store; caching");
                self.cache.insert(key, SeenVia::Store);
                true
            }
            Ok(false) => false,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "store existence check failed; skipping coordinate this tick");
                true
            }
        }
    }

    /// Records a coordinate fetched in this run.
    pub fn mark_seen(&mut self, coordinate: &Coordinate) {
        self.cache.entry(coordinate.key()).or_insert(SeenVia::ThisRun);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;

    fn via(index: &DedupeIndex, coordinate: &Coordinate) -> Option<SeenVia> {
        index.cache.get(&coordinate.key()).copied()
    }

    #[tokio::test]
    async fn skip_after_mark_seen_in_same_run() {
        let store = MemoryStore::default();
        let mut index = DedupeIndex::new(true);
        let point = Coordinate::new(12.345_671, 98.765_431);

        assert!(!index.should_skip(&store, &point).await);
        index.mark_seen(&point);

        let same_key = Coordinate::new(12.345_674, 98.765_428);
        assert!(index.should_skip(&store, &same_key).await);
        assert_eq!(via(&index, &point), Some(SeenVia::ThisRun));
    }

    #[tokio::test]
    async fn stored_points_are_skipped_and_cached() {
        let point = Coordinate::new(1.5, 2.5);
        let store = MemoryStore::with_keys([point.key()]);
        let mut index = DedupeIndex::new(true);

        assert!(index.should_skip(&store, &point).await);
        assert_eq!(store.contains_calls(), 1);
        assert_eq!(via(&index, &point), Some(SeenVia::Store));

        // Cached now: no second round trip.
        assert!(index.should_skip(&store, &point).await);
        assert_eq!(store.contains_calls(), 1);
    }

    #[tokio::test]
    async fn stored_half_step_points_are_recognised() {
        // Stored by an earlier run as 1.234565, which rounds up to 1.23457.
        let stored = Coordinate::new(1.234_565, 0.000_015);
        let store = MemoryStore::with_keys([stored.key()]);
        let mut index = DedupeIndex::new(true);

        assert!(index.should_skip(&store, &stored).await);
        assert!(
            index
                .should_skip(&store, &Coordinate::new(1.234_57, 0.000_02))
                .await
        );
    }

    #[tokio::test]
    async fn stored_points_are_skipped_regardless_of_cache_state() {
        let point = Coordinate::new(-33.868_82, 151.209_29);
        let store = MemoryStore::with_keys([point.key()]);

        let mut fresh = DedupeIndex::new(true);
        assert!(fresh.should_skip(&store, &point).await);

        let mut other = DedupeIndex::new(true);
        other.mark_seen(&Coordinate::new(0.0, 0.0));
        assert!(other.should_skip(&store, &point).await);
    }

    #[tokio::test]
    async fn store_errors_skip_without_caching() {
        let point = Coordinate::new(3.0, 4.0);
        let store = MemoryStore::default();
        store.fail_contains(true);
        let mut index = DedupeIndex::new(true);

        assert!(index.should_skip(&store, &point).await);
        assert_eq!(index.seen_count(), 0);

        store.fail_contains(false);
        assert!(!index.should_skip(&store, &point).await);
    }

    #[tokio::test]
    async fn run_only_mode_never_queries_the_store() {
        let point = Coordinate::new(5.0, 6.0);
        let store = MemoryStore::with_keys([point.key()]);
        let mut index = DedupeIndex::new(false);

        assert!(!index.should_skip(&store, &point).await);
        assert_eq!(store.contains_calls(), 0);
    }

    #[test]
    fn mark_seen_is_idempotent_per_rounded_key() {
        let mut index = DedupeIndex::new(true);
        index.mark_seen(&Coordinate::new(7.0, 8.0));
        index.mark_seen(&Coordinate::new(7.000_001, 8.000_002));
        assert_eq!(index.seen_count(), 1);
    }
}
