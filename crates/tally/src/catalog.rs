//! Box reference-data lookup with memoization.

use std::collections::HashMap;
use std::sync::Arc;

use tally_core::error::Result;
use tally_core::traits::BoxStore;
use tally_core::types::BoxInfo;

/// Memoizing cache over [`BoxStore`] lookups.
///
/// Owned by the pipeline and passed where needed, not ambient state.
/// Misses are cached too, so a box absent from the store costs one
/// lookup, not one per event. When a capacity limit is configured the
/// catalog stops caching once full and falls through to the store.
pub struct BoxCatalog {
    store: Option<Arc<dyn BoxStore>>,
    cache: HashMap<String, Option<Arc<BoxInfo>>>,
    limit: Option<usize>,
}

impl BoxCatalog {
    pub fn new(store: Option<Arc<dyn BoxStore>>, limit: Option<usize>) -> Self {
        Self {
            store,
            cache: HashMap::new(),
            limit,
        }
    }

    /// Resolve a box id, consulting the cache first.
    pub async fn resolve(&mut self, box_id: &str) -> Result<Option<Arc<BoxInfo>>> {
        let Some(store) = &self.store else {
            return Ok(None);
        };

        if let Some(cached) = self.cache.get(box_id) {
            return Ok(cached.clone());
        }

        let fetched = store.get(box_id).await?.map(Arc::new);
        if self.limit.map_or(true, |limit| self.cache.len() < limit) {
            self.cache.insert(box_id.to_string(), fetched.clone());
        }
        Ok(fetched)
    }

    /// Number of cached entries (hits and misses both count).
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_memstore::MemoryBoxStore;

    fn seeded_store() -> Arc<MemoryBoxStore> {
        let store = Arc::new(MemoryBoxStore::new());
        store.insert(BoxInfo {
            id: "b1".into(),
            name: "Chroma".into(),
            price: 2.5,
        });
        store
    }

    #[tokio::test]
    async fn test_resolve_memoizes() {
        let store = seeded_store();
        let mut catalog = BoxCatalog::new(Some(store.clone()), None);

        let first = catalog.resolve("b1").await.unwrap().unwrap();
        let second = catalog.resolve("b1").await.unwrap().unwrap();
        assert_eq!(first.price, 2.5);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn test_misses_are_cached() {
        let store = seeded_store();
        let mut catalog = BoxCatalog::new(Some(store.clone()), None);

        assert!(catalog.resolve("unknown").await.unwrap().is_none());
        assert!(catalog.resolve("unknown").await.unwrap().is_none());
        assert_eq!(store.lookups(), 1);
    }

    #[tokio::test]
    async fn test_limit_stops_caching_not_resolving() {
        let store = seeded_store();
        store.insert(BoxInfo {
            id: "b2".into(),
            name: "Spectrum".into(),
            price: 3.0,
        });
        let mut catalog = BoxCatalog::new(Some(store.clone()), Some(1));

        catalog.resolve("b1").await.unwrap();
        // Cache is full; b2 still resolves, every time from the store.
        assert!(catalog.resolve("b2").await.unwrap().is_some());
        assert!(catalog.resolve("b2").await.unwrap().is_some());
        assert_eq!(catalog.len(), 1);
        assert_eq!(store.lookups(), 3);
    }

    #[tokio::test]
    async fn test_no_store_resolves_nothing() {
        let mut catalog = BoxCatalog::new(None, None);
        assert!(catalog.resolve("b1").await.unwrap().is_none());
        assert!(catalog.is_empty());
    }
}
