//! The cache store boundary and the built-in in-memory adapter.
//!
//! The storage engine is an external collaborator: anything that can get, set
//! with a TTL, delete, and commit can back the cache. The trait uses the same
//! boxed-future shape as the middleware chain, so implementations stay object
//! safe and the crate needs no extra async machinery.
//!
//! Stores are trusted to enforce per-key atomicity; the cache layer itself
//! holds no cross-request state. TTLs are passed down on `set` so the store
//! reaps entries independently of the logical `expires_at` check.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::{Response, StatusCode};

/// Errors surfaced by a [`CacheStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store backend failure: {message}")]
    Backend { message: String },

    #[error("cache entry serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A snapshot of the handler chain's accumulated result.
///
/// Status, headers, and body are captured from the outgoing [`Response`] and
/// can be rehydrated into an equivalent response later. Serializable so
/// external stores can persist entries across processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CachedResponse {
    /// Captures the response as it stands, including any headers the write
    /// path has already stamped on it.
    pub fn snapshot(response: &Response) -> Self {
        Self {
            status: response.status().as_u16(),
            headers: response
                .headers()
                .iter()
                .map(|(name, value)| (name.to_owned(), value.to_owned()))
                .collect(),
            body: response.body_data().to_vec(),
        }
    }

    /// Rehydrates the snapshot into a fresh [`Response`].
    pub fn to_response(&self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::Ok);
        let mut response = Response::new(status).body_bytes(self.body.clone());
        for (name, value) in &self.headers {
            response.add_header(name.clone(), value.clone());
        }
        response
    }
}

/// The persisted unit: an optional absolute expiry plus the payload.
///
/// At most one live entry exists per cache key; a write overwrites any prior
/// entry for the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Absolute UTC expiry; `None` means the entry never expires by time.
    pub expires_at: Option<DateTime<Utc>>,
    /// Snapshot of the handler chain result.
    pub payload: CachedResponse,
}

impl CacheEntry {
    /// Returns `true` once `now` has reached the entry's expiry timestamp.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// TTL-aware key/value persistence consumed by the cache paths.
///
/// `get`/`set`/`delete`/`commit` are the only operations that may block or be
/// awaited anywhere in the cache layer; everything else is pure computation.
pub trait CacheStore: Send + Sync {
    /// Fetches the entry at `key`, or `None` on a miss.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CacheEntry>>;

    /// Stores `entry` at `key`, overwriting any prior entry. When `ttl` is
    /// given the store reaps the entry on its own after that duration.
    fn set<'a>(
        &'a self,
        key: &'a str,
        entry: CacheEntry,
        ttl: Option<Duration>,
    ) -> StoreFuture<'a, ()>;

    /// Deletes the entry at `key`, returning the number of entries removed.
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, u64>;

    /// Flushes deferred writes. No-op for stores without deferred commits.
    fn commit<'a>(&'a self) -> StoreFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }
}

// What the memory store keeps per key: the entry plus the monotonic deadline
// implementing the store-side TTL.
struct Slot {
    entry: CacheEntry,
    deadline: Option<Instant>,
}

/// In-memory [`CacheStore`] adapter.
///
/// Backs the demo and the test suite; production deployments are expected to
/// plug in a process-external store behind the same trait. Expired slots are
/// reaped lazily on read.
#[derive(Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live slots, counting not-yet-reaped expired ones.
    pub fn len(&self) -> usize {
        self.slots.read().map(|slots| slots.len()).unwrap_or(0)
    }

    /// Returns `true` when no slots are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend {
        message: "memory store lock poisoned".to_owned(),
    }
}

impl CacheStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CacheEntry>> {
        Box::pin(async move {
            {
                let slots = self.slots.read().map_err(|_| poisoned())?;
                match slots.get(key) {
                    None => return Ok(None),
                    Some(slot) => {
                        let expired = slot.deadline.is_some_and(|d| d <= Instant::now());
                        if !expired {
                            return Ok(Some(slot.entry.clone()));
                        }
                    }
                }
            }

            // Slot hit its store-side deadline; reap it under the write lock.
            let mut slots = self.slots.write().map_err(|_| poisoned())?;
            slots.remove(key);
            Ok(None)
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        entry: CacheEntry,
        ttl: Option<Duration>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut slots = self.slots.write().map_err(|_| poisoned())?;
            slots.insert(
                key.to_owned(),
                Slot {
                    entry,
                    deadline: ttl.map(|t| Instant::now() + t),
                },
            );
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let mut slots = self.slots.write().map_err(|_| poisoned())?;
            Ok(u64::from(slots.remove(key).is_some()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(body: &str) -> CacheEntry {
        let response = Response::new(StatusCode::Ok).body(body);
        CacheEntry {
            expires_at: None,
            payload: CachedResponse::snapshot(&response),
        }
    }

    // ── Snapshot / rehydration ────────────────────────────────────────────────

    #[test]
    fn snapshot_preserves_status_headers_and_body() {
        let original = Response::new(StatusCode::Created)
            .header("Content-Type", "application/json")
            .body(r#"{"id":42}"#);

        let rehydrated = CachedResponse::snapshot(&original).to_response();

        assert_eq!(rehydrated.status(), StatusCode::Created);
        assert_eq!(
            rehydrated.headers().get("content-type"),
            Some("application/json")
        );
        assert_eq!(rehydrated.body_data(), original.body_data());
    }

    #[test]
    fn entry_expiry_boundary() {
        let now = Utc::now();
        let live = CacheEntry {
            expires_at: Some(now + chrono::Duration::seconds(60)),
            ..entry("x")
        };
        let stale = CacheEntry {
            expires_at: Some(now - chrono::Duration::seconds(1)),
            ..entry("x")
        };
        let eternal = entry("x");

        assert!(!live.is_expired(now));
        assert!(stale.is_expired(now));
        assert!(!eternal.is_expired(now));
    }

    // ── MemoryStore ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MemoryStore::new();
        store.set("k", entry("hello"), None).await.unwrap();
        let fetched = store.get("k").await.unwrap().unwrap();
        assert_eq!(fetched, entry("hello"));
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_is_last_write_wins() {
        let store = MemoryStore::new();
        store.set("k", entry("first"), None).await.unwrap();
        store.set("k", entry("second"), None).await.unwrap();
        let fetched = store.get("k").await.unwrap().unwrap();
        assert_eq!(fetched, entry("second"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_removed_count() {
        let store = MemoryStore::new();
        store.set("k", entry("x"), None).await.unwrap();
        assert_eq!(store.delete("k").await.unwrap(), 1);
        assert_eq!(store.delete("k").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn store_side_ttl_reaps_on_read() {
        let store = MemoryStore::new();
        store
            .set("k", entry("x"), Some(Duration::from_millis(10)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(25)).await;

        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn commit_defaults_to_noop() {
        let store = MemoryStore::new();
        store.commit().await.unwrap();
    }
}
