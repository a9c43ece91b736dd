//! Per-network answer cache.
//!
//! Entries are keyed by `(vantage address, domain)` so the same domain can
//! hold a different answer on every network the host visits. Only override
//! answers are stored. Entries never expire and are never evicted.

use std::future::Future;
use std::net::Ipv4Addr;

use hickory_proto::rr::Name;
use moka::future::Cache;

use crate::dns::AnswerRecord;

/// Trait for answer caching.
///
/// This trait abstracts the caching mechanism, allowing for different
/// implementations (production Moka cache, test mocks, etc.).
pub trait AnswerCache: Send + Sync + Clone + 'static {
    /// Get the cached answer for `domain` as seen from `vantage`.
    fn get(&self, vantage: Ipv4Addr, domain: &Name)
    -> impl Future<Output = Option<AnswerRecord>> + Send;

    /// Insert or overwrite the answer for `(vantage, domain)`.
    fn put(
        &self,
        vantage: Ipv4Addr,
        domain: Name,
        record: AnswerRecord,
    ) -> impl Future<Output = ()> + Send;

    /// Returns the number of entries in the cache.
    fn entry_count(&self) -> u64;
}

/// Production cache implementation using Moka.
///
/// Built without a TTL or a capacity bound, so it only grows. Moka
/// handles concurrent readers and writers internally.
#[derive(Clone)]
pub struct MokaCache {
    inner: Cache<(Ipv4Addr, Name), AnswerRecord>,
}

impl MokaCache {
    pub fn new() -> Self {
        Self {
            inner: Cache::builder().build(),
        }
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerCache for MokaCache {
    async fn get(&self, vantage: Ipv4Addr, domain: &Name) -> Option<AnswerRecord> {
        self.inner.get(&(vantage, domain.clone())).await
    }

    async fn put(&self, vantage: Ipv4Addr, domain: Name, record: AnswerRecord) {
        self.inner.insert((vantage, domain), record).await;
    }

    fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::IpAddr;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::RwLock;

    /// Mock cache for testing.
    #[derive(Clone, Default)]
    pub struct MockCache {
        pub entries: Arc<RwLock<HashMap<(Ipv4Addr, Name), AnswerRecord>>>,
        pub get_count: Arc<AtomicU64>,
        pub put_count: Arc<AtomicU64>,
    }

    impl MockCache {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_call_count(&self) -> u64 {
            self.get_count.load(Ordering::SeqCst)
        }

        pub fn put_call_count(&self) -> u64 {
            self.put_count.load(Ordering::SeqCst)
        }
    }

    impl AnswerCache for MockCache {
        async fn get(&self, vantage: Ipv4Addr, domain: &Name) -> Option<AnswerRecord> {
            self.get_count.fetch_add(1, Ordering::SeqCst);
            self.entries
                .read()
                .await
                .get(&(vantage, domain.clone()))
                .cloned()
        }

        async fn put(&self, vantage: Ipv4Addr, domain: Name, record: AnswerRecord) {
            self.put_count.fetch_add(1, Ordering::SeqCst);
            self.entries.write().await.insert((vantage, domain), record);
        }

        fn entry_count(&self) -> u64 {
            self.entries.try_read().map_or(0, |entries| entries.len() as u64)
        }
    }

    fn name(s: &str) -> Name {
        Name::from_str(s).unwrap()
    }

    fn record(domain: &str, ip: &str) -> AnswerRecord {
        AnswerRecord::new(name(domain), ip.parse::<IpAddr>().unwrap(), 3600)
    }

    #[tokio::test]
    async fn should_insert_and_retrieve_cached_entries() {
        let cache = MokaCache::new();
        let vantage = Ipv4Addr::new(10, 0, 0, 5);
        let domain = name("internal.example.com.");

        assert!(cache.get(vantage, &domain).await.is_none());

        let answer = record("internal.example.com.", "10.0.0.99");
        cache.put(vantage, domain.clone(), answer.clone()).await;
        assert_eq!(cache.get(vantage, &domain).await, Some(answer));
    }

    #[tokio::test]
    async fn should_keep_entries_separate_per_vantage() {
        let cache = MokaCache::new();
        let home = Ipv4Addr::new(192, 168, 1, 5);
        let office = Ipv4Addr::new(10, 0, 0, 5);
        let domain = name("printer.");

        cache
            .put(home, domain.clone(), record("printer.", "192.168.1.20"))
            .await;
        cache
            .put(office, domain.clone(), record("printer.", "10.0.0.20"))
            .await;

        assert_eq!(
            cache.get(home, &domain).await.map(|r| r.address),
            Some("192.168.1.20".parse().unwrap())
        );
        assert_eq!(
            cache.get(office, &domain).await.map(|r| r.address),
            Some("10.0.0.20".parse().unwrap())
        );
        assert!(cache.get(Ipv4Addr::new(172, 16, 0, 1), &domain).await.is_none());
    }

    #[tokio::test]
    async fn should_overwrite_on_repeated_put() {
        let cache = MokaCache::new();
        let vantage = Ipv4Addr::new(10, 0, 0, 5);
        let domain = name("h.");

        cache.put(vantage, domain.clone(), record("h.", "1.1.1.1")).await;
        cache.put(vantage, domain.clone(), record("h.", "1.1.1.1")).await;
        cache.inner.run_pending_tasks().await;

        assert_eq!(cache.entry_count(), 1);
    }

    #[tokio::test]
    async fn should_survive_concurrent_writers() {
        let cache = MokaCache::new();
        let vantage = Ipv4Addr::new(10, 0, 0, 5);

        let tasks: Vec<_> = (0..32u8)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let domain = name(&format!("host{}.", i % 8));
                    let answer = AnswerRecord::new(
                        domain.clone(),
                        IpAddr::V4(Ipv4Addr::new(10, 0, 1, i % 8)),
                        3600,
                    );
                    cache.put(vantage, domain, answer).await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        for i in 0..8u8 {
            let cached = cache.get(vantage, &name(&format!("host{i}."))).await.unwrap();
            assert_eq!(cached.address, IpAddr::V4(Ipv4Addr::new(10, 0, 1, i)));
        }
    }

    #[tokio::test]
    async fn should_track_get_and_put_call_counts() {
        let cache = MockCache::new();
        let vantage = Ipv4Addr::new(10, 0, 0, 5);
        let domain = name("example.com.");

        assert_eq!(cache.get_call_count(), 0);
        assert_eq!(cache.put_call_count(), 0);

        cache.get(vantage, &domain).await;
        assert_eq!(cache.get_call_count(), 1);

        cache
            .put(vantage, domain.clone(), record("example.com.", "10.0.0.1"))
            .await;
        assert_eq!(cache.put_call_count(), 1);
        assert_eq!(cache.entry_count(), 1);

        cache.get(vantage, &domain).await;
        assert_eq!(cache.get_call_count(), 2);
    }
}
