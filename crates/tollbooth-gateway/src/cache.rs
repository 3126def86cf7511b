//! Read-through cache of endpoint configs.
//!
//! Configs change rarely, so the gateway caches lookups with a short TTL
//! instead of hitting SQLite on every call. The cache is an explicit object
//! with an invalidation hook; nothing else in the process holds derived
//! config state.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::error::GatewayError;
use crate::store::{EndpointRecord, EndpointStore};

/// Default entry lifetime. Operations that mutate an endpoint should call
/// [`EndpointCache::invalidate`] rather than waiting the TTL out.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

struct CacheEntry {
    /// None caches a miss (unknown/inactive provider).
    record: Option<EndpointRecord>,
    inserted_at: Instant,
}

pub struct EndpointCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl EndpointCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Look up an endpoint, consulting the store on a miss or expired entry.
    pub fn get(
        &self,
        store: &EndpointStore,
        provider_id: &str,
    ) -> Result<Option<EndpointRecord>, GatewayError> {
        if let Some(entry) = self.entries.get(provider_id) {
            if entry.inserted_at.elapsed() < self.ttl {
                return Ok(entry.record.clone());
            }
        }

        let record = store.get_endpoint(provider_id)?;
        self.entries.insert(
            provider_id.to_string(),
            CacheEntry {
                record: record.clone(),
                inserted_at: Instant::now(),
            },
        );
        Ok(record)
    }

    /// Drop the cached entry for a provider. Called after registration
    /// changes so the next request observes fresh config.
    pub fn invalidate(&self, provider_id: &str) {
        self.entries.remove(provider_id);
    }

    /// Drop all cached entries.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AuthMethod, NewEndpoint};
    use std::collections::HashMap;

    fn seeded_store() -> EndpointStore {
        let store = EndpointStore::new(":memory:").unwrap();
        store
            .create_endpoint(NewEndpoint {
                provider_id: "cached".to_string(),
                origin_endpoint: "https://api.example.com".to_string(),
                http_method: "GET".to_string(),
                request_body: None,
                price_usd: "0.01".to_string(),
                payout_address: "0x1234567890123456789012345678901234567890".to_string(),
                auth_method: AuthMethod::None,
                auth_header_name: None,
                query_param_name: None,
                encrypted_credential: None,
                custom_headers: HashMap::new(),
                max_timeout_seconds: 30,
                settlement_mode: None,
            })
            .unwrap();
        store
    }

    #[test]
    fn test_serves_from_cache_within_ttl() {
        let store = seeded_store();
        let cache = EndpointCache::new(Duration::from_secs(60));

        assert!(cache.get(&store, "cached").unwrap().is_some());

        // Deactivate behind the cache's back; cached copy still served
        store.deactivate_endpoint("cached").unwrap();
        assert!(cache.get(&store, "cached").unwrap().is_some());
    }

    #[test]
    fn test_invalidate_forces_fresh_read() {
        let store = seeded_store();
        let cache = EndpointCache::new(Duration::from_secs(60));

        assert!(cache.get(&store, "cached").unwrap().is_some());
        store.deactivate_endpoint("cached").unwrap();
        cache.invalidate("cached");
        assert!(cache.get(&store, "cached").unwrap().is_none());
    }

    #[test]
    fn test_expired_entry_rereads() {
        let store = seeded_store();
        let cache = EndpointCache::new(Duration::ZERO);

        assert!(cache.get(&store, "cached").unwrap().is_some());
        store.deactivate_endpoint("cached").unwrap();
        assert!(cache.get(&store, "cached").unwrap().is_none());
    }

    #[test]
    fn test_misses_are_cached() {
        let store = seeded_store();
        let cache = EndpointCache::new(Duration::from_secs(60));
        assert!(cache.get(&store, "nope").unwrap().is_none());
        assert!(cache.entries.contains_key("nope"));
    }
}
