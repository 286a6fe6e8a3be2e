//! Bounded TTL cache with pluggable eviction.
//!
//! The cache is a plain value: callers construct it, decide how to share it
//! (the evaluator wraps it in an async mutex) and drive expiry through
//! [`TtlCache::purge_expired`] or [`spawn_purge_task`]. Invalidation messages
//! arrive over a broadcast channel so several caches can be fanned out to.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Picks which key to drop when the cache is full.
pub trait EvictionPolicy<K>: Send {
    fn on_insert(&mut self, key: &K);
    fn on_access(&mut self, key: &K);
    fn on_remove(&mut self, key: &K);
    fn victim(&mut self) -> Option<K>;
}

/// Least recently used.
#[derive(Debug)]
pub struct Lru<K> {
    order: VecDeque<K>,
}

impl<K> Default for Lru<K> {
    fn default() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }
}

impl<K: Clone + Eq + Send> EvictionPolicy<K> for Lru<K> {
    fn on_insert(&mut self, key: &K) {
        self.on_remove(key);
        self.order.push_back(key.clone());
    }

    fn on_access(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn on_remove(&mut self, key: &K) {
        self.order.retain(|k| k != key);
    }

    fn victim(&mut self) -> Option<K> {
        self.order.front().cloned()
    }
}

/// First in, first out; reads do not refresh position.
#[derive(Debug)]
pub struct Fifo<K> {
    order: VecDeque<K>,
}

impl<K> Default for Fifo<K> {
    fn default() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }
}

impl<K: Clone + Eq + Send> EvictionPolicy<K> for Fifo<K> {
    fn on_insert(&mut self, key: &K) {
        if !self.order.contains(key) {
            self.order.push_back(key.clone());
        }
    }

    fn on_access(&mut self, _key: &K) {}

    fn on_remove(&mut self, key: &K) {
        self.order.retain(|k| k != key);
    }

    fn victim(&mut self) -> Option<K> {
        self.order.front().cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionKind {
    Lru,
    Fifo,
}

impl std::str::FromStr for EvictionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionKind::Lru),
            "fifo" => Ok(EvictionKind::Fifo),
            other => Err(format!("unknown eviction policy '{other}'")),
        }
    }
}

impl EvictionKind {
    pub fn policy<K: Clone + Eq + Send + 'static>(self) -> Box<dyn EvictionPolicy<K>> {
        match self {
            EvictionKind::Lru => Box::new(Lru::default()),
            EvictionKind::Fifo => Box::new(Fifo::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    policy: Box<dyn EvictionPolicy<K>>,
    capacity: usize,
    ttl: Duration,
    stats: CacheStats,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration, policy: Box<dyn EvictionPolicy<K>>) -> Self {
        Self {
            entries: HashMap::new(),
            policy,
            capacity: capacity.max(1),
            ttl,
            stats: CacheStats::default(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &K, now: Instant) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.expires_at <= now,
            None => {
                self.stats.misses += 1;
                return None;
            }
        };

        if expired {
            self.remove_entry(key);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.policy.on_access(key);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&mut self, key: K, value: V, now: Instant) {
        if !self.entries.contains_key(&key) {
            while self.entries.len() >= self.capacity {
                let Some(victim) = self.policy.victim() else {
                    break;
                };
                self.remove_entry(&victim);
                self.stats.evictions += 1;
            }
        }

        self.policy.on_insert(&key);
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn invalidate(&mut self, key: &K) -> bool {
        self.remove_entry(key)
    }

    pub fn clear(&mut self) {
        let keys: Vec<K> = self.entries.keys().cloned().collect();
        for key in keys {
            self.remove_entry(&key);
        }
    }

    /// Drops expired entries and returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&mut self, now: Instant) -> usize {
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove_entry(key);
        }
        self.stats.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }

    fn remove_entry(&mut self, key: &K) -> bool {
        self.policy.on_remove(key);
        self.entries.remove(key).is_some()
    }
}

/// Message broadcast to every cache that should drop a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheInvalidation<K> {
    Key(K),
    All,
}

/// Sweeps expired entries every `every` (at least 1ms) until aborted.
pub fn spawn_purge_task<K, V>(cache: Arc<Mutex<TtlCache<K, V>>>, every: Duration) -> JoinHandle<()>
where
    K: Clone + Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    let every = every.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = cache.lock().await.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "purged expired cache entries");
            }
        }
    })
}

/// Applies invalidations until the sending side closes.
pub fn spawn_invalidation_listener<K, V>(
    cache: Arc<Mutex<TtlCache<K, V>>>,
    mut receiver: broadcast::Receiver<CacheInvalidation<K>>,
) -> JoinHandle<()>
where
    K: Clone + Eq + Hash + Send + std::fmt::Debug + 'static,
    V: Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(CacheInvalidation::Key(key)) => {
                    tracing::debug!(?key, "invalidating cache entry");
                    cache.lock().await.invalidate(&key);
                }
                Ok(CacheInvalidation::All) => {
                    tracing::debug!("clearing cache");
                    cache.lock().await.clear();
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "invalidation listener lagged, clearing cache");
                    cache.lock().await.clear();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(capacity: usize, kind: EvictionKind) -> TtlCache<String, i32> {
        TtlCache::new(capacity, Duration::from_secs(60), kind.policy())
    }

    #[test]
    fn counts_hits_and_misses() {
        let mut cache = cache(4, EvictionKind::Lru);
        cache.insert("a".to_string(), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"b".to_string()), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = cache(4, EvictionKind::Lru);
        let start = Instant::now();
        cache.insert_at("a".to_string(), 1, start);

        assert_eq!(cache.get_at(&"a".to_string(), start + Duration::from_secs(59)), Some(1));
        assert_eq!(cache.get_at(&"a".to_string(), start + Duration::from_secs(60)), None);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn lru_evicts_least_recently_read() {
        let mut cache = cache(2, EvictionKind::Lru);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.get(&"a".to_string());
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.get(&"b".to_string()), None);
        assert_eq!(cache.get(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"c".to_string()), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn fifo_ignores_reads() {
        let mut cache = cache(2, EvictionKind::Fifo);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.get(&"a".to_string());
        cache.insert("c".to_string(), 3);

        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(2));
    }

    #[test]
    fn overwriting_a_key_does_not_evict() {
        let mut cache = cache(2, EvictionKind::Lru);
        cache.insert("a".to_string(), 1);
        cache.insert("b".to_string(), 2);
        cache.insert("a".to_string(), 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(10));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn purge_removes_only_expired() {
        let mut cache = cache(4, EvictionKind::Lru);
        let start = Instant::now();
        cache.insert_at("old".to_string(), 1, start);
        cache.insert_at("new".to_string(), 2, start + Duration::from_secs(30));

        assert_eq!(cache.purge_expired_at(start + Duration::from_secs(61)), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn listener_applies_invalidations() {
        let shared = Arc::new(Mutex::new(cache(4, EvictionKind::Lru)));
        shared.lock().await.insert("a".to_string(), 1);
        shared.lock().await.insert("b".to_string(), 2);

        let (sender, receiver) = broadcast::channel(8);
        let handle = spawn_invalidation_listener(Arc::clone(&shared), receiver);

        sender
            .send(CacheInvalidation::Key("a".to_string()))
            .expect("listener subscribed");
        drop(sender);
        handle.await.expect("listener exits when sender closes");

        let mut guard = shared.lock().await;
        assert_eq!(guard.get(&"a".to_string()), None);
        assert_eq!(guard.get(&"b".to_string()), Some(2));
    }

    #[tokio::test]
    async fn purge_task_sweeps_expired_entries() {
        let shared = Arc::new(Mutex::new(TtlCache::<String, i32>::new(
            4,
            Duration::from_millis(20),
            EvictionKind::Lru.policy(),
        )));
        shared.lock().await.insert("a".to_string(), 1);

        let handle = spawn_purge_task(Arc::clone(&shared), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        let stats = shared.lock().await.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn purge_task_accepts_zero_interval() {
        let shared = Arc::new(Mutex::new(cache(4, EvictionKind::Fifo)));
        let handle = spawn_purge_task(Arc::clone(&shared), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        handle.abort();
    }
}
