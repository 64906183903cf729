//! Fingerprint-keyed result store.
//!
//! Values are immutable once written: the fingerprinter guarantees that the
//! same key always carries the same bytes, so concurrent writers racing on a
//! key are safe and last-write-wins needs no coordination.

use std::{collections::HashMap, fmt::Debug, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use chainhouse_types::fingerprint::CacheKey;

use crate::time::TimeProvider;

/// Prefix applied to every persisted entry, so cached results are
/// recognizable when inspecting the backend directly.
pub(crate) const STORAGE_KEY_PREFIX: &str = "result";

/// The storage backend is unreachable.
///
/// A miss is NOT an error; callers treat this as miss-with-logged-warning
/// and degrade to recomputation.
#[derive(Debug, Clone, Error)]
#[error("result store unavailable: {0}")]
pub struct StoreError(Arc<str>);

impl StoreError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into().into())
    }
}

/// Key-value store for serialized analytic results, with expiration.
#[async_trait]
pub trait ResultStore: Debug + Send + Sync + 'static {
    /// Look up a cached result. `Ok(None)` is a plain miss.
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError>;

    /// Store a result, overwriting any existing entry.
    async fn put(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), StoreError>;

    /// Explicit invalidation, for operational cache-busting.
    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError>;
}

pub(crate) fn storage_key(key: &CacheKey) -> String {
    format!("{STORAGE_KEY_PREFIX}:{key}")
}

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// In-memory [`ResultStore`] with TTL expiry.
///
/// Expired entries are evicted lazily on access.
#[derive(Debug)]
pub struct MemoryResultStore {
    time_provider: Arc<dyn TimeProvider>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryResultStore {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            time_provider,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live (non-expired) entries.
    pub fn len(&self) -> usize {
        let now = self.time_provider.now();
        self.entries
            .lock()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError> {
        let storage_key = storage_key(key);
        let now = self.time_provider.now();
        let mut entries = self.entries.lock();

        match entries.get(&storage_key) {
            Some(entry) if entry.expires_at <= now => {
                entries.remove(&storage_key);
                Ok(None)
            }
            Some(entry) => {
                debug!(
                    %key,
                    age_secs = (now - entry.created_at).num_seconds(),
                    "cache hit"
                );
                Ok(Some(entry.value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let now = self.time_provider.now();
        let ttl = TimeDelta::from_std(ttl).map_err(|e| StoreError::new(e.to_string()))?;
        let entry = Entry {
            value,
            created_at: now,
            expires_at: now + ttl,
        };
        self.entries.lock().insert(storage_key(key), entry);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.entries.lock().remove(&storage_key(key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::time::MockProvider;
    use chainhouse_types::{
        canonical::normalize,
        http::{AnalyticsRequest, ContractEntry},
    };

    const TTL: Duration = Duration::from_secs(86_400);

    fn key(adapter: &str) -> CacheKey {
        let raw = AnalyticsRequest {
            contracts: vec![ContractEntry {
                chain: "ethereum".to_string(),
                address: "0xabc".to_string(),
            }],
            start_timestamp: 1800,
            end_timestamp: 3600,
        };
        CacheKey::new(adapter, &normalize(&raw, 1800))
    }

    fn store() -> (Arc<MockProvider>, MemoryResultStore) {
        let time_provider = Arc::new(MockProvider::new(Utc::now()));
        let store = MemoryResultStore::new(Arc::clone(&time_provider) as _);
        (time_provider, store)
    }

    #[tokio::test]
    async fn round_trip_is_byte_exact() {
        let (_, store) = store();
        let key = key("contracts:total-txs");
        let payload = Bytes::from_static(br#"{"chain":"ethereum","value":42.0}"#);

        store.put(&key, payload.clone(), TTL).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn miss_is_not_an_error() {
        let (_, store) = store();
        assert_eq!(store.get(&key("contracts:total-txs")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let (time_provider, store) = store();
        let key = key("contracts:gas-usage");
        store
            .put(&key, Bytes::from_static(b"v"), TTL)
            .await
            .unwrap();

        time_provider.inc(TTL / 2);
        assert!(store.get(&key).await.unwrap().is_some());

        time_provider.inc(TTL);
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn put_overwrites_and_refreshes_ttl() {
        let (time_provider, store) = store();
        let key = key("contracts:gas-usage");
        store
            .put(&key, Bytes::from_static(b"a"), TTL)
            .await
            .unwrap();

        time_provider.inc(TTL / 2);
        store
            .put(&key, Bytes::from_static(b"b"), TTL)
            .await
            .unwrap();

        // the rewrite pushed expiry out past the original deadline
        time_provider.inc(TTL / 2 + Duration::from_secs(1));
        assert_eq!(
            store.get(&key).await.unwrap(),
            Some(Bytes::from_static(b"b"))
        );
    }

    #[tokio::test]
    async fn delete_invalidates() {
        let (_, store) = store();
        let key = key("contracts:total-unique-users");
        store
            .put(&key, Bytes::from_static(b"v"), TTL)
            .await
            .unwrap();
        store.delete(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);

        // deleting a missing key is fine
        store.delete(&key).await.unwrap();
    }

    #[test]
    fn storage_keys_carry_the_result_prefix() {
        let key = key("contracts:total-txs");
        let storage_key = storage_key(&key);
        assert!(storage_key.starts_with("result:contracts:total-txs:"));
    }
}
