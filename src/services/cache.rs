use dashmap::DashMap;
use serde::Serialize;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::CacheConfig;
use crate::models::{ApiKey, IpRule, Policy, PolicyRule, Tenant};

/// One cached value with its lifetimes. `idle_deadline` only applies to
/// caches configured with an idle TTL (API keys); it slides forward on
/// every hit.
struct Entry<V> {
    value: V,
    expires_at: Instant,
    idle_deadline: Option<Instant>,
}

/// Hit/miss/eviction counters, exposed for observability.
#[derive(Debug, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

/// TTL + size bounded in-process cache. Entries carry `(value, expires_at)`;
/// readers never block each other and a writer only contends on its own
/// shard. Negative results must not be inserted — callers cache hits only.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    max_size: usize,
    ttl: Duration,
    idle_ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_size,
            ttl,
            idle_ttl: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Cache with both a write TTL and a sliding idle TTL; an entry dies at
    /// whichever deadline comes first.
    pub fn with_idle(max_size: usize, ttl: Duration, idle_ttl: Duration) -> Self {
        let mut cache = Self::new(max_size, ttl);
        cache.idle_ttl = Some(idle_ttl);
        cache
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();

        if let Some(mut entry) = self.entries.get_mut(key) {
            let idle_expired = entry.idle_deadline.is_some_and(|d| now >= d);
            if now < entry.expires_at && !idle_expired {
                if let Some(idle) = self.idle_ttl {
                    entry.idle_deadline = Some(now + idle);
                }
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }

        // Expired entries are removed on the read that discovers them.
        if self.entries.remove(key).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        let now = Instant::now();
        if self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            self.evict_one(now);
        }
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
                idle_deadline: self.idle_ttl.map(|idle| now + idle),
            },
        );
    }

    pub fn remove(&self, key: &K) {
        if self.entries.remove(key).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop everything. Used by the full-invalidation caches (policy names,
    /// IP resolutions, rule lists) on any write to their backing table.
    pub fn clear(&self) {
        let dropped = self.entries.len() as u64;
        self.entries.clear();
        self.evictions.fetch_add(dropped, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            size: self.entries.len(),
        }
    }

    /// Make room for one insert: prefer an already-expired entry, otherwise
    /// drop the entry closest to expiry.
    fn evict_one(&self, now: Instant) {
        let mut victim: Option<(K, Instant)> = None;
        for entry in self.entries.iter() {
            if now >= entry.expires_at {
                victim = Some((entry.key().clone(), entry.expires_at));
                break;
            }
            match &victim {
                Some((_, soonest)) if *soonest <= entry.expires_at => {}
                _ => victim = Some((entry.key().clone(), entry.expires_at)),
            }
        }
        if let Some((key, _)) = victim {
            self.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// The config-store caches, one per entity family. Sizes and TTLs differ
/// because mutation rates and read volumes differ — IP rules get a short
/// TTL for security posture, tenants barely change.
pub struct ConfigCaches {
    /// Policies by id — write-through on create/update.
    pub policies: TtlCache<Uuid, Policy>,
    /// Policy by `(name, tenant)` composite key — fully evicted on any
    /// policy write.
    pub policies_by_name: TtlCache<String, Policy>,
    pub tenants: TtlCache<Uuid, Tenant>,
    pub ip_rules: TtlCache<Uuid, IpRule>,
    /// IP→policy resolution (`"{ip}"` or `"{ip}:{tenant}"` key) — fully
    /// evicted on any IP-rule write.
    pub ip_resolutions: TtlCache<String, Uuid>,
    pub api_keys: TtlCache<Uuid, ApiKey>,
    /// The whole enabled-rule list in resolution order, cached as one unit
    /// and invalidated on any rule mutation.
    pub rule_lists: TtlCache<&'static str, Arc<Vec<PolicyRule>>>,
}

pub const RULE_LIST_KEY: &str = "enabled";

impl ConfigCaches {
    pub fn new(cfg: &CacheConfig) -> Self {
        Self {
            policies: TtlCache::new(cfg.policy_max_size, Duration::from_secs(cfg.policy_ttl_secs)),
            policies_by_name: TtlCache::new(
                cfg.policy_max_size,
                Duration::from_secs(cfg.policy_ttl_secs),
            ),
            tenants: TtlCache::new(cfg.tenant_max_size, Duration::from_secs(cfg.tenant_ttl_secs)),
            ip_rules: TtlCache::new(
                cfg.ip_rule_max_size,
                Duration::from_secs(cfg.ip_rule_ttl_secs),
            ),
            ip_resolutions: TtlCache::new(
                cfg.ip_resolution_max_size,
                Duration::from_secs(cfg.ip_rule_ttl_secs),
            ),
            api_keys: TtlCache::with_idle(
                cfg.api_key_max_size,
                Duration::from_secs(cfg.api_key_ttl_secs),
                Duration::from_secs(cfg.api_key_idle_ttl_secs),
            ),
            rule_lists: TtlCache::new(1, Duration::from_secs(cfg.policy_ttl_secs)),
        }
    }

    pub fn policy_name_key(name: &str, tenant_id: Option<Uuid>) -> String {
        match tenant_id {
            Some(id) => format!("{}:{}", name, id),
            None => format!("{}:", name),
        }
    }

    pub fn ip_resolution_key(ip: &str, tenant_id: Option<Uuid>) -> String {
        match tenant_id {
            Some(id) => format!("{}:{}", ip, id),
            None => ip.to_string(),
        }
    }

    /// Every policy write invalidates the name lookup cache wholesale; the
    /// by-id cache is maintained write-through by the policy service.
    pub fn invalidate_policy_lookups(&self) {
        self.policies_by_name.clear();
    }

    /// Any IP-rule write flushes the resolution cache.
    pub fn invalidate_ip_resolutions(&self) {
        self.ip_resolutions.clear();
    }

    pub fn invalidate_rule_lists(&self) {
        self.rule_lists.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_through_read_sees_new_value() {
        let cache: TtlCache<u32, String> = TtlCache::new(10, Duration::from_secs(60));
        cache.insert(1, "a".into());
        assert_eq!(cache.get(&1), Some("a".into()));

        cache.insert(1, "b".into());
        assert_eq!(cache.get(&1), Some("b".into()));

        cache.remove(&1);
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache: TtlCache<u32, u32> = TtlCache::new(10, Duration::from_millis(10));
        cache.insert(1, 42);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&1), None);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn size_bound_evicts_on_insert() {
        let cache: TtlCache<u32, u32> = TtlCache::new(2, Duration::from_secs(60));
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.insert(3, 3);
        assert_eq!(cache.stats().size, 2);
        assert_eq!(cache.get(&3), Some(3));
    }

    #[test]
    fn idle_ttl_expires_untouched_entries() {
        let cache: TtlCache<u32, u32> =
            TtlCache::with_idle(10, Duration::from_secs(60), Duration::from_millis(10));
        cache.insert(1, 1);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn hits_and_misses_are_counted() {
        let cache: TtlCache<u32, u32> = TtlCache::new(10, Duration::from_secs(60));
        cache.insert(1, 1);
        let _ = cache.get(&1);
        let _ = cache.get(&2);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn clear_drops_everything() {
        let cache: TtlCache<u32, u32> = TtlCache::new(10, Duration::from_secs(60));
        cache.insert(1, 1);
        cache.insert(2, 2);
        cache.clear();
        assert_eq!(cache.stats().size, 0);
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn composite_keys() {
        let tenant = Uuid::new_v4();
        assert_eq!(
            ConfigCaches::policy_name_key("default", None),
            "default:".to_string()
        );
        assert!(ConfigCaches::policy_name_key("default", Some(tenant)).contains(&tenant.to_string()));
        assert_eq!(ConfigCaches::ip_resolution_key("10.0.0.1", None), "10.0.0.1");
    }
}
