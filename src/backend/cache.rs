//! Per-workspace response cache keyed by entity kind, with a configurable
//! TTL, per spec §5. Writes through the adapter are the only public
//! mutators and must invalidate the matching kind's entry before returning.

use crate::types::EntityKind;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry<T> {
    fetched_at: Instant,
    values: Vec<T>,
}

/// A TTL cache holding one entry per [`EntityKind`]'s list, where `T` is a
/// type-erased holder via `serde_json::Value` so the cache can be generic
/// over all four entity kinds without four separate structs.
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<EntityKind, CacheEntry<serde_json::Value>>>,
}

impl ResponseCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_seconds),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached list for `kind` if present and not expired.
    pub fn get(&self, kind: EntityKind) -> Option<Vec<serde_json::Value>> {
        let entries = self.entries.lock().expect("response cache lock poisoned");
        entries.get(&kind).and_then(|entry| {
            if entry.fetched_at.elapsed() <= self.ttl {
                Some(entry.values.clone())
            } else {
                None
            }
        })
    }

    pub fn put(&self, kind: EntityKind, values: Vec<serde_json::Value>) {
        let mut entries = self.entries.lock().expect("response cache lock poisoned");
        entries.insert(
            kind,
            CacheEntry {
                fetched_at: Instant::now(),
                values,
            },
        );
    }

    /// Invalidate the cached entry for one kind (called by create/delete).
    pub fn invalidate(&self, kind: EntityKind) {
        let mut entries = self.entries.lock().expect("response cache lock poisoned");
        entries.remove(&kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_none_before_any_put() {
        let cache = ResponseCache::new(60);
        assert!(cache.get(EntityKind::Tag).is_none());
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = ResponseCache::new(60);
        cache.put(EntityKind::Tag, vec![serde_json::json!({"tagId": "1"})]);
        let values = cache.get(EntityKind::Tag).unwrap();
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn invalidate_clears_the_kind_only() {
        let cache = ResponseCache::new(60);
        cache.put(EntityKind::Tag, vec![serde_json::json!({})]);
        cache.put(EntityKind::Trigger, vec![serde_json::json!({})]);
        cache.invalidate(EntityKind::Tag);
        assert!(cache.get(EntityKind::Tag).is_none());
        assert!(cache.get(EntityKind::Trigger).is_some());
    }

    #[test]
    fn expired_entry_is_not_returned() {
        let cache = ResponseCache::new(0);
        cache.put(EntityKind::Tag, vec![serde_json::json!({})]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(EntityKind::Tag).is_none());
    }
}
