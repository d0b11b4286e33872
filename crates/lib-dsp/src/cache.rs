//! Per-order artifact cache.
//!
//! The MLS and its tags depend only on the order, and building tags costs
//! O(P·N). Measurements at the same order share one immutable copy through
//! `Arc`.

use crate::deconvolution::Deconvolver;
use crate::error::DspResult;
use crate::mls::{MaximumLengthSequence, MlsOrder};
use crate::tags::PermutationTags;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Immutable, order-derived data: the sequence, its excitation, and tags.
#[derive(Debug)]
pub struct OrderArtifacts {
    pub sequence: MaximumLengthSequence,
    pub excitation: Vec<f64>,
    pub tags: Arc<PermutationTags>,
}

impl OrderArtifacts {
    /// Generate the sequence and build its tags.
    pub fn build(order: MlsOrder) -> Self {
        let sequence = MaximumLengthSequence::generate(order);
        let excitation = sequence.excitation();
        let tags = Arc::new(PermutationTags::build(&sequence));
        Self {
            sequence,
            excitation,
            tags,
        }
    }

    pub fn order(&self) -> MlsOrder {
        self.sequence.order()
    }

    /// A deconvolver sharing these tags.
    pub fn deconvolver(&self) -> Deconvolver {
        Deconvolver::new(Arc::clone(&self.tags))
    }
}

/// Thread-safe cache of [`OrderArtifacts`] keyed by order.
#[derive(Debug, Default)]
pub struct ArtifactCache {
    entries: Mutex<HashMap<MlsOrder, Arc<OrderArtifacts>>>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the artifacts for `order`, building them on first use.
    pub fn get_or_build(&self, order: MlsOrder) -> Arc<OrderArtifacts> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(entries.entry(order).or_insert_with(|| {
            tracing::debug!(order = order.get(), "building order artifacts");
            Arc::new(OrderArtifacts::build(order))
        }))
    }

    /// Same as [`get_or_build`](Self::get_or_build) for a raw order.
    pub fn get(&self, order: u32) -> DspResult<Arc<OrderArtifacts>> {
        Ok(self.get_or_build(MlsOrder::new(order)?))
    }

    /// Number of cached orders.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DspError;

    #[test]
    fn test_artifacts_are_shared() {
        let cache = ArtifactCache::new();
        let a = cache.get(8).unwrap();
        let b = cache.get(8).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!(a.excitation.len(), 255);
        assert_eq!(a.tags.len(), 255);
    }

    #[test]
    fn test_distinct_orders() {
        let cache = ArtifactCache::new();
        cache.get(4).unwrap();
        cache.get(5).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(17).unwrap_err(), DspError::InvalidOrder(17));
    }

    #[test]
    fn test_shared_across_threads() {
        let cache = Arc::new(ArtifactCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get(10).unwrap())
            })
            .collect();

        let first = cache.get(10).unwrap();
        for handle in handles {
            assert!(Arc::ptr_eq(&first, &handle.join().unwrap()));
        }
    }

    #[test]
    fn test_poisoned_lock_keeps_entries() {
        let cache = Arc::new(ArtifactCache::new());
        cache.get(4).unwrap();
        cache.get(6).unwrap();

        let poisoner = Arc::clone(&cache);
        let result = std::thread::spawn(move || {
            let _guard = poisoner.entries.lock().unwrap();
            panic!("panic while holding the cache lock");
        })
        .join();

        assert!(result.is_err());
        assert!(cache.entries.is_poisoned());
        assert_eq!(cache.len(), 2);
        assert!(!cache.is_empty());
        assert_eq!(cache.get(4).unwrap().excitation.len(), 15);
    }
}
