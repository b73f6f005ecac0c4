//! Content-addressed response cache.
//!
//! Maps a request fingerprint to a validated prior result. Bounded by an
//! LRU entry count and by TTL, whichever fires first; failed results use a
//! short negative TTL so a failing call is not hammered but later retries
//! are not poisoned.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use ao_core::types::{AnalysisResult, Fingerprint};
use chrono::{DateTime, Utc};
use config::CacheConfig;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::debug;

use crate::telemetry::EngineTelemetry;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: AnalysisResult,
    pub created_at: DateTime<Utc>,
    pub hit_count: u64,
    ttl: Duration
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.num_milliseconds() >= self.ttl.as_millis() as i64
    }
}

pub struct ResponseCache {
    entries: RwLock<LruCache<Fingerprint, CacheEntry>>,
    config: CacheConfig,
    telemetry: Arc<EngineTelemetry>
}

impl ResponseCache {
    pub fn new(config: CacheConfig, telemetry: Arc<EngineTelemetry>) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries.max(1))
            .unwrap_or_else(|| NonZeroUsize::new(1).unwrap());
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            config,
            telemetry
        }
    }

    /// Looks up a non-expired entry, bumping recency and hit count.
    /// Expired entries are removed on the way (lazy expiry) and count as
    /// misses. Failed results are returned as long as their negative TTL
    /// holds; the orchestrator decides what a failed hit means.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<AnalysisResult> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        match entries.get_mut(fingerprint) {
            Some(entry) if !entry.is_expired(now) => {
                entry.hit_count += 1;
                self.telemetry.record_cache_hit();
                Some(entry.result.clone())
            }
            Some(_) => {
                entries.pop(fingerprint);
                self.telemetry.record_cache_miss();
                None
            }
            None => {
                self.telemetry.record_cache_miss();
                None
            }
        }
    }

    /// Stores a result under its fingerprint. Failed results get the
    /// negative TTL, everything else the standard TTL.
    pub async fn put(&self, fingerprint: Fingerprint, result: AnalysisResult) {
        let ttl = if result.is_failed() {
            Duration::from_secs(self.config.negative_ttl_seconds)
        } else {
            Duration::from_secs(self.config.ttl_seconds)
        };

        let mut entries = self.entries.write().await;
        entries.put(
            fingerprint,
            CacheEntry {
                result,
                created_at: Utc::now(),
                hit_count: 0,
                ttl
            }
        );
        self.telemetry.record_cache_size(entries.len());
    }

    /// Removes every expired entry; returns how many were dropped.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        let expired: Vec<Fingerprint> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(fp, _)| fp.clone())
            .collect();
        for fp in &expired {
            entries.pop(fp);
        }

        if !expired.is_empty() {
            debug!(removed = expired.len(), "Cache sweep removed expired entries");
        }
        self.telemetry.record_cache_size(entries.len());
        expired.len()
    }

    /// Spawns the periodic expiry sweep.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        let interval = Duration::from_secs(self.config.sweep_interval_seconds);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(max_entries: usize, ttl_seconds: u64, negative_ttl_seconds: u64) -> ResponseCache {
        ResponseCache::new(
            CacheConfig {
                max_entries,
                ttl_seconds,
                negative_ttl_seconds,
                sweep_interval_seconds: 60
            },
            Arc::new(EngineTelemetry::new())
        )
    }

    fn fp(tag: &str) -> Fingerprint {
        Fingerprint::compute(tag, &serde_json::Map::new(), "ctx")
    }

    #[tokio::test]
    async fn stores_and_returns_results() {
        let cache = cache(8, 60, 5);
        let result = AnalysisResult::success(json!({"summary": "s"}), None);

        cache.put(fp("a"), result).await;
        let hit = cache.get(&fp("a")).await.unwrap();
        assert_eq!(hit.payload["summary"], "s");
        assert!(cache.get(&fp("b")).await.is_none());
    }

    #[tokio::test]
    async fn lru_bound_evicts_oldest() {
        let cache = cache(2, 60, 5);
        cache.put(fp("a"), AnalysisResult::success(json!(1), None)).await;
        cache.put(fp("b"), AnalysisResult::success(json!(2), None)).await;
        // Touch "a" so "b" becomes the eviction candidate
        assert!(cache.get(&fp("a")).await.is_some());
        cache.put(fp("c"), AnalysisResult::success(json!(3), None)).await;

        assert!(cache.get(&fp("a")).await.is_some());
        assert!(cache.get(&fp("b")).await.is_none());
        assert!(cache.get(&fp("c")).await.is_some());
    }

    #[tokio::test]
    async fn expired_entries_are_removed_on_read() {
        // TTL of zero expires entries immediately; the read must both miss
        // and physically drop the entry.
        let cache = cache(8, 0, 0);
        cache.put(fp("a"), AnalysisResult::success(json!(1), None)).await;

        assert_eq!(cache.len().await, 1);
        assert!(cache.get(&fp("a")).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn failed_results_use_negative_ttl() {
        let cache = cache(8, 3600, 0);
        cache.put(fp("bad"), AnalysisResult::failed("boom")).await;

        // Zero-second negative TTL: expired immediately
        assert!(cache.get(&fp("bad")).await.is_none());

        cache.put(fp("good"), AnalysisResult::success(json!(1), None)).await;
        assert!(cache.get(&fp("good")).await.is_some());
    }

    #[tokio::test]
    async fn sweep_drops_expired_entries() {
        let cache = cache(8, 3600, 0);
        cache.put(fp("bad"), AnalysisResult::failed("boom")).await;
        cache.put(fp("good"), AnalysisResult::success(json!(1), None)).await;

        let removed = cache.sweep().await;
        assert_eq!(removed, 1);
        assert_eq!(cache.len().await, 1);
    }
}
