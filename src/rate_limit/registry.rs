// ============================================================================
// Bucket Registry
// ============================================================================
//
// Process-wide map from (client identity, sensitivity class) to a token
// bucket. Constructed once at startup and handed to the admission middleware
// through the gateway state.
//
// Concurrency:
// - get-or-create goes through `DashMap::entry`, so concurrent first requests
//   for one key always end up sharing a single bucket
// - each bucket has its own mutex; the map shard lock is released before the
//   bucket lock is taken, so distinct keys never wait on each other
//
// ============================================================================

use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use super::bucket::{BucketLimit, TokenBucket};
use crate::config::RateLimitConfig;

pub type SharedBucket = Arc<Mutex<TokenBucket>>;

/// Coarse route category selecting which limit applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensitivityClass {
    General,
    /// Authentication routes (login, registration): much tighter limit.
    Sensitive,
}

impl SensitivityClass {
    /// Any path with an `auth` segment is sensitive.
    pub fn classify(path: &str) -> Self {
        if path.split('/').any(|segment| segment == "auth") {
            Self::Sensitive
        } else {
            Self::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Sensitive => "sensitive",
        }
    }
}

impl fmt::Display for SensitivityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub identity: String,
    pub class: SensitivityClass,
}

impl ClientKey {
    pub fn new(identity: impl Into<String>, class: SensitivityClass) -> Self {
        Self {
            identity: identity.into(),
            class,
        }
    }
}

/// Outcome of one admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Capacity of the class the request was charged against.
    pub limit: u64,
}

pub struct BucketRegistry {
    buckets: DashMap<ClientKey, SharedBucket>,
    general: BucketLimit,
    sensitive: BucketLimit,
}

impl BucketRegistry {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            general: config.general,
            sensitive: config.sensitive,
        }
    }

    pub fn limit_for(&self, class: SensitivityClass) -> BucketLimit {
        match class {
            SensitivityClass::General => self.general,
            SensitivityClass::Sensitive => self.sensitive,
        }
    }

    /// Returns the bucket for `key`, creating a full one on first sight.
    pub fn resolve(&self, key: &ClientKey, now: Instant) -> SharedBucket {
        if let Some(existing) = self.buckets.get(key) {
            return existing.value().clone();
        }

        let limit = self.limit_for(key.class);
        self.buckets
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(limit, now))))
            .value()
            .clone()
    }

    /// Charges one token against `key`'s bucket.
    pub fn try_acquire(&self, key: &ClientKey, now: Instant) -> Admission {
        loop {
            let shared = self.resolve(key, now);
            let mut bucket = shared.lock();
            // Evicted between lookup and lock: the next resolve sees the
            // replacement (or creates it).
            if bucket.is_retired() {
                continue;
            }
            return Admission {
                allowed: bucket.try_consume(1, now),
                limit: bucket.limit().capacity,
            };
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drops buckets untouched for at least `idle_for` that would be full
    /// again by now. Such a bucket is indistinguishable from a freshly
    /// created one, so eviction never changes an admission decision.
    ///
    /// Returns the number of evicted buckets.
    pub fn evict_idle(&self, now: Instant, idle_for: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            let mut bucket = bucket.lock();
            let idle = now.saturating_duration_since(bucket.last_seen_at()) >= idle_for;
            if idle && bucket.is_full_at(now) {
                bucket.retire();
                false
            } else {
                true
            }
        });
        before.saturating_sub(self.buckets.len())
    }

    /// Runs `evict_idle` every `every` until the returned task is aborted.
    pub fn spawn_idle_sweeper(
        registry: Arc<Self>,
        every: Duration,
        idle_for: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = registry.evict_idle(Instant::now(), idle_for);
                if evicted > 0 {
                    tracing::debug!(
                        evicted = evicted,
                        remaining = registry.len(),
                        "Evicted idle rate-limit buckets"
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> BucketRegistry {
        BucketRegistry::new(&RateLimitConfig::default())
    }

    #[test]
    fn test_classify() {
        assert_eq!(SensitivityClass::classify("/api/auth/login"), SensitivityClass::Sensitive);
        assert_eq!(SensitivityClass::classify("/auth/register"), SensitivityClass::Sensitive);
        assert_eq!(SensitivityClass::classify("/api/auth"), SensitivityClass::Sensitive);
        assert_eq!(SensitivityClass::classify("/api/products/7"), SensitivityClass::General);
        assert_eq!(SensitivityClass::classify("/api/authors"), SensitivityClass::General);
        assert_eq!(SensitivityClass::classify("/"), SensitivityClass::General);
    }

    #[test]
    fn test_resolve_returns_same_instance() {
        let registry = registry();
        let now = Instant::now();
        let key = ClientKey::new("10.0.0.1", SensitivityClass::General);

        let a = registry.resolve(&key, now);
        let b = registry.resolve(&key, now);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_classes_are_configured_independently() {
        let registry = registry();
        let now = Instant::now();

        let general = registry.resolve(&ClientKey::new("ip", SensitivityClass::General), now);
        let sensitive = registry.resolve(&ClientKey::new("ip", SensitivityClass::Sensitive), now);

        assert_eq!(general.lock().limit().capacity, 100);
        assert_eq!(sensitive.lock().limit().capacity, 10);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_first_access_creates_one_bucket() {
        let registry = registry();
        let now = Instant::now();
        let key = ClientKey::new("203.0.113.5", SensitivityClass::Sensitive);
        let barrier = Barrier::new(16);
        let (registry_ref, key_ref, barrier_ref) = (&registry, &key, &barrier);

        let buckets: Vec<SharedBucket> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(move || {
                        barrier_ref.wait();
                        registry_ref.resolve(key_ref, now)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(registry.len(), 1);
        assert!(buckets.iter().all(|b| Arc::ptr_eq(b, &buckets[0])));
    }

    #[test]
    fn test_concurrent_consumers_never_double_spend() {
        let registry = registry();
        let now = Instant::now();
        let key = ClientKey::new("10.0.0.1", SensitivityClass::Sensitive);
        let admitted = AtomicUsize::new(0);
        let barrier = Barrier::new(32);

        std::thread::scope(|s| {
            for _ in 0..32 {
                s.spawn(|| {
                    barrier.wait();
                    for _ in 0..4 {
                        if registry.try_acquire(&key, now).allowed {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_last_token_goes_to_exactly_one_caller() {
        let registry = registry();
        let now = Instant::now();
        let key = ClientKey::new("10.0.0.9", SensitivityClass::Sensitive);
        for _ in 0..9 {
            assert!(registry.try_acquire(&key, now).allowed);
        }

        let barrier = Barrier::new(2);
        let (registry_ref, key_ref, barrier_ref) = (&registry, &key, &barrier);
        let results: Vec<bool> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(move || {
                        barrier_ref.wait();
                        registry_ref.try_acquire(key_ref, now).allowed
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|allowed| **allowed).count(), 1);
    }

    #[test]
    fn test_evict_idle_keeps_recent_and_partial_buckets() {
        let registry = registry();
        let start = Instant::now();
        let idle = ClientKey::new("idle", SensitivityClass::General);
        let drained = ClientKey::new("drained", SensitivityClass::Sensitive);
        let busy = ClientKey::new("busy", SensitivityClass::General);

        registry.try_acquire(&idle, start);
        for _ in 0..10 {
            registry.try_acquire(&drained, start);
        }
        registry.try_acquire(&busy, start + Duration::from_secs(110));

        // 2 minutes later `idle` and `drained` are quiet and refilled, while
        // `busy` was seen 10s ago.
        let now = start + Duration::from_secs(120);
        let evicted = registry.evict_idle(now, Duration::from_secs(60));

        assert_eq!(evicted, 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.buckets.contains_key(&busy));
    }

    #[test]
    fn test_evict_idle_skips_buckets_still_refilling() {
        let registry = registry();
        let start = Instant::now();
        let key = ClientKey::new("10.1.1.1", SensitivityClass::Sensitive);
        for _ in 0..10 {
            registry.try_acquire(&key, start);
        }

        let evicted = registry.evict_idle(start + Duration::from_secs(30), Duration::from_secs(10));
        assert_eq!(evicted, 0);
        assert_eq!(registry.len(), 1);
    }
}
