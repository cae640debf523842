//! Per-client token bucket registry.
//!
//! One [`governor`] direct limiter per client identifier, held in a map behind
//! a single mutex. The mutex covers map access only: callers get an
//! `Arc` to the client's bucket and consume from it after the lock is
//! released. Governor's GCRA state is updated with a compare-and-swap, so
//! concurrent requests from the same client can neither lose an update nor
//! both claim the last token.
//!
//! Entries remember when they were last touched; [`ClientRegistry::evict_idle`]
//! drops the ones idle for longer than a threshold and is driven by the
//! background sweeper in [`crate::state`].

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{debug, trace};

use crate::config::LimiterConfig;

/// Token bucket for one client.
pub type ClientBucket = DefaultDirectRateLimiter;

struct ClientEntry {
    bucket: Arc<ClientBucket>,
    quota: Quota,
    last_seen: Instant,
}

/// Concurrent map from client identifier to its token bucket.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, ClientEntry>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the bucket for `client_id`, creating it with `quota` if absent.
    ///
    /// An existing bucket built from a different quota is replaced, so a
    /// configuration change takes effect on the client's next request.
    pub fn get_or_create(&self, client_id: &str, quota: Quota) -> Arc<ClientBucket> {
        let now = Instant::now();
        let mut clients = self.lock();

        if let Some(entry) = clients.get_mut(client_id) {
            entry.last_seen = now;
            if entry.quota == quota {
                return entry.bucket.clone();
            }
            debug!(client_id, "Limiter quota changed, rebuilding client bucket");
            entry.quota = quota;
            entry.bucket = Arc::new(RateLimiter::direct(quota));
            return entry.bucket.clone();
        }

        trace!(client_id, "Tracking new client");
        let bucket = Arc::new(RateLimiter::direct(quota));
        clients.insert(
            client_id.to_string(),
            ClientEntry {
                bucket: bucket.clone(),
                quota,
                last_seen: now,
            },
        );
        bucket
    }

    /// Remove clients not seen for longer than `idle_for`.
    ///
    /// Returns the number of evicted entries.
    pub fn evict_idle(&self, idle_for: Duration) -> usize {
        let now = Instant::now();
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= idle_for);
        before - clients.len()
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave a half-written entry, so
    // poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientEntry>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build the bucket quota for a limiter configuration.
///
/// `burst` tokens of capacity, refilled continuously at `rps` tokens per
/// second. Returns `None` for values no bucket can be built from.
pub fn quota_for(config: &LimiterConfig) -> Option<Quota> {
    if !config.rps.is_finite() || config.rps <= 0.0 {
        return None;
    }
    let period = Duration::try_from_secs_f64(1.0 / config.rps).ok()?;
    let burst = NonZeroU32::new(config.burst)?;
    Some(Quota::with_period(period)?.allow_burst(burst))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quota(rps: f64, burst: u32) -> Quota {
        quota_for(&LimiterConfig {
            rps,
            burst,
            enabled: true,
        })
        .unwrap()
    }

    #[test]
    fn test_same_client_shares_bucket() {
        let registry = ClientRegistry::new();
        let a = registry.get_or_create("10.0.0.1", quota(1.0, 1));
        let b = registry.get_or_create("10.0.0.1", quota(1.0, 1));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_clients_have_independent_buckets() {
        let registry = ClientRegistry::new();
        let q = quota(1.0, 1);

        assert!(registry.get_or_create("10.0.0.1", q).check().is_ok());
        assert!(registry.get_or_create("10.0.0.1", q).check().is_err());
        assert!(registry.get_or_create("10.0.0.2", q).check().is_ok());
    }

    #[test]
    fn test_quota_change_rebuilds_bucket() {
        let registry = ClientRegistry::new();
        let first = registry.get_or_create("10.0.0.1", quota(1.0, 1));
        assert!(first.check().is_ok());
        assert!(first.check().is_err());

        let second = registry.get_or_create("10.0.0.1", quota(1.0, 5));
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.check().is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_burst_then_deny_within_same_instant() {
        let registry = ClientRegistry::new();
        let bucket = registry.get_or_create("client", quota(0.001, 3));

        for _ in 0..3 {
            assert!(bucket.check().is_ok());
        }
        assert!(bucket.check().is_err());
        assert!(bucket.check().is_err());
    }

    #[test]
    fn test_evict_idle_removes_stale_entries() {
        let registry = ClientRegistry::new();
        registry.get_or_create("stale", quota(1.0, 1));
        std::thread::sleep(Duration::from_millis(30));
        registry.get_or_create("fresh", quota(1.0, 1));

        let evicted = registry.evict_idle(Duration::from_millis(15));

        assert_eq!(evicted, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_evict_idle_keeps_recent_entries() {
        let registry = ClientRegistry::new();
        registry.get_or_create("a", quota(1.0, 1));
        registry.get_or_create("b", quota(1.0, 1));

        assert_eq!(registry.evict_idle(Duration::from_secs(180)), 0);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_burst() {
        let registry = Arc::new(ClientRegistry::new());
        let admitted = Arc::new(AtomicUsize::new(0));
        let q = quota(0.001, 10);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        if registry.get_or_create("shared", q).check().is_ok() {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_quota_for_rejects_unusable_values() {
        let base = LimiterConfig::default();
        assert!(quota_for(&LimiterConfig { rps: 0.0, ..base }).is_none());
        assert!(quota_for(&LimiterConfig { rps: f64::NAN, ..base }).is_none());
        assert!(quota_for(&LimiterConfig { burst: 0, ..base }).is_none());
        assert!(quota_for(&LimiterConfig { rps: 0.5, ..base }).is_some());
    }
}
