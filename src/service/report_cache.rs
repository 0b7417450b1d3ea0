use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::LedgerError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: String,
    kind: &'static str,
    params: String,
}

struct CacheEntry {
    value: Arc<Value>,
    inserted: Instant,
}

/// Upper bound on cached payloads; past it, fresh reports are served uncached.
const MAX_ENTRIES: usize = 10_000;

/// Memoized report payloads per user, dropped on any write for that user.
///
/// Each user carries a generation bumped by every invalidation. A report computed
/// across an invalidation is returned but never stored.
pub struct ReportCache {
    entries: DashMap<CacheKey, CacheEntry>,
    generations: DashMap<String, u64>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheAnalysis {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
    pub entries_by_kind: BTreeMap<String, usize>,
    pub users: usize,
    pub oldest_entry_age_secs: Option<u64>,
}

impl ReportCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            generations: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Return the cached payload or compute, store and return it.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        user_id: &str,
        kind: &'static str,
        params: String,
        compute: F,
    ) -> Result<Arc<Value>, LedgerError>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let key = CacheKey {
            user_id: user_id.to_string(),
            kind,
            params,
        };
        if let Some(entry) = self.entries.get(&key)
            && entry.inserted.elapsed() < self.ttl
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.value.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let generation = self.generation(user_id);
        let value = Arc::new(serde_json::to_value(compute().await?)?);

        self.evict_expired();
        // hold the generation shard so an invalidation cannot slip between check and insert
        let current = self.generations.entry(user_id.to_string()).or_insert(0);
        if *current == generation && self.entries.len() < MAX_ENTRIES {
            self.entries.insert(
                key,
                CacheEntry {
                    value: value.clone(),
                    inserted: Instant::now(),
                },
            );
        } else {
            debug!(user_id, kind, "report served without caching");
        }
        Ok(value)
    }

    fn generation(&self, user_id: &str) -> u64 {
        self.generations.get(user_id).map(|g| *g).unwrap_or(0)
    }

    /// Drop every entry older than the TTL.
    pub fn evict_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| entry.inserted.elapsed() < ttl);
    }

    pub fn invalidate_user(&self, user_id: &str) {
        *self.generations.entry(user_id.to_string()).or_insert(0) += 1;
        let before = self.entries.len();
        self.entries.retain(|k, _| k.user_id != user_id);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.invalidations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(user_id, removed, "report cache invalidated");
        }
    }

    pub fn analysis(&self) -> CacheAnalysis {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let mut entries_by_kind = BTreeMap::new();
        let mut users = std::collections::HashSet::new();
        let mut oldest: Option<Duration> = None;
        for item in self.entries.iter() {
            *entries_by_kind.entry(item.key().kind.to_string()).or_insert(0) += 1;
            users.insert(item.key().user_id.clone());
            let age = item.value().inserted.elapsed();
            oldest = Some(oldest.map_or(age, |o| o.max(age)));
        }
        CacheAnalysis {
            entries: self.entries.len(),
            hits,
            misses,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            ttl_secs: self.ttl.as_secs(),
            entries_by_kind,
            users: users.len(),
            oldest_entry_age_secs: oldest.map(|d| d.as_secs()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_lookup_hits() {
        let cache = ReportCache::new(Duration::from_secs(60));
        let a = cache
            .get_or_compute("u1", "cash-flow", "m".into(), || async { Ok(1) })
            .await
            .unwrap();
        let b = cache
            .get_or_compute("u1", "cash-flow", "m".into(), || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(a, b);
        let stats = cache.analysis();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.entries_by_kind["cash-flow"], 1);
    }

    #[tokio::test]
    async fn invalidation_is_per_user() {
        let cache = ReportCache::new(Duration::from_secs(60));
        for user in ["u1", "u2"] {
            cache
                .get_or_compute(user, "balance-sheet", String::new(), || async { Ok(0) })
                .await
                .unwrap();
        }
        cache.invalidate_user("u1");
        let stats = cache.analysis();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.invalidations, 1);
    }

    #[tokio::test]
    async fn expired_entries_are_recomputed() {
        let cache = ReportCache::new(Duration::ZERO);
        cache
            .get_or_compute("u1", "k", String::new(), || async { Ok(1) })
            .await
            .unwrap();
        let v = cache
            .get_or_compute("u1", "k", String::new(), || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(*v, serde_json::json!(2));
    }

    #[tokio::test]
    async fn report_computed_across_an_invalidation_is_not_stored() {
        let cache = ReportCache::new(Duration::from_secs(60));
        let v = cache
            .get_or_compute("u1", "balance-sheet", String::new(), || async {
                cache.invalidate_user("u1");
                Ok(1)
            })
            .await
            .unwrap();
        assert_eq!(*v, serde_json::json!(1));
        assert_eq!(cache.analysis().entries, 0);

        // the next computation starts from the new generation and is kept
        cache
            .get_or_compute("u1", "balance-sheet", String::new(), || async { Ok(2) })
            .await
            .unwrap();
        assert_eq!(cache.analysis().entries, 1);
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_insert() {
        let cache = ReportCache::new(Duration::ZERO);
        for params in ["2026-01-31", "2026-02-28", "2026-03-31"] {
            cache
                .get_or_compute("u1", "balance-sheet", params.into(), || async { Ok(0) })
                .await
                .unwrap();
        }
        assert_eq!(cache.analysis().entries, 1);
        cache.evict_expired();
        assert_eq!(cache.analysis().entries, 0);
    }
}
