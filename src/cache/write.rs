//! The write path.
//!
//! Runs after the route's handler chain has produced a successful response.
//! The writer stamps the outgoing response with an `Expires` header when the
//! route has a TTL, snapshots the response as the cache payload, and persists
//! it under the same key the read path probes. Caching is best effort: the
//! caller logs and swallows [`CacheWriteError`] so the client-visible
//! response is never affected by store trouble.

use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{Request, Response};

use super::route::RouteBinding;
use super::store::{CacheEntry, CacheStore, CachedResponse, StoreError};

/// Failure to persist a handler result.
///
/// Recovered locally by the pipeline glue — never propagated to the client.
#[derive(Debug, Error)]
pub enum CacheWriteError {
    #[error("cache write failed: {0}")]
    Store(#[from] StoreError),
}

/// Persists handler results after successful dispatch.
///
/// Callers invoke the writer only once the chain has completed successfully;
/// [`CacheMiddleware`](super::middleware::CacheMiddleware) gates on a 2xx
/// status before calling in.
#[derive(Clone)]
pub struct CacheWriter {
    store: Arc<dyn CacheStore>,
}

impl CacheWriter {
    /// Creates a writer over the given store.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Derives the route's cache key for `request` and persists `response`.
    ///
    /// Key derivation is identical to the read path's — both go through
    /// [`RouteBinding::cache_key`].
    pub async fn persist(
        &self,
        binding: &RouteBinding,
        request: &Request,
        response: &mut Response,
    ) -> Result<(), CacheWriteError> {
        if !binding.config().enabled() {
            return Ok(());
        }
        let key = binding.cache_key(request);
        self.persist_keyed(binding, &key, response).await
    }

    /// Persists `response` under a pre-derived key.
    ///
    /// When the route has a TTL, the response is annotated with an `Expires`
    /// header at `now + ttl` *before* the snapshot is taken, so served hits
    /// carry the entry's original absolute expiry. The TTL is also handed to
    /// the store so it reaps the entry independently of the logical
    /// `expires_at` check. The write is committed before returning; it has no
    /// dependency on the client connection.
    pub async fn persist_keyed(
        &self,
        binding: &RouteBinding,
        key: &str,
        response: &mut Response,
    ) -> Result<(), CacheWriteError> {
        if !binding.config().enabled() {
            return Ok(());
        }

        let ttl = binding.config().ttl();
        let expires_at = ttl.map(|t| DateTime::<Utc>::from(SystemTime::now() + t));

        if let Some(at) = expires_at {
            response.add_header("Expires", http_date(at));
        }

        let entry = CacheEntry {
            expires_at,
            payload: CachedResponse::snapshot(response),
        };

        self.store.set(key, entry, ttl).await?;
        self.store.commit().await?;

        debug!(route = %binding.identity(), key = %key, ttl = ?ttl, "cached handler result");
        Ok(())
    }
}

/// Formats a timestamp as an RFC 7231 HTTP-date, e.g.
/// `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::CacheConfig;
    use crate::cache::read::{CacheReader, ReadOutcome};
    use crate::cache::store::{MemoryStore, StoreFuture};
    use crate::{Method, StatusCode};
    use chrono::TimeZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn request(raw: &[u8]) -> Request {
        let (req, _) = Request::parse(raw).unwrap();
        req
    }

    fn binding(config: serde_json::Value) -> RouteBinding {
        let config = CacheConfig::from_value(config).unwrap();
        RouteBinding::bind(Method::Get, "/widgets/:id", config).unwrap()
    }

    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        sets: AtomicUsize,
    }

    impl CacheStore for CountingStore {
        fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CacheEntry>> {
            self.inner.get(key)
        }

        fn set<'a>(
            &'a self,
            key: &'a str,
            entry: CacheEntry,
            ttl: Option<Duration>,
        ) -> StoreFuture<'a, ()> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, entry, ttl)
        }

        fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, u64> {
            self.inner.delete(key)
        }
    }

    struct RejectingStore;

    impl CacheStore for RejectingStore {
        fn get<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, Option<CacheEntry>> {
            Box::pin(async { Ok(None) })
        }

        fn set<'a>(
            &'a self,
            _key: &'a str,
            _entry: CacheEntry,
            _ttl: Option<Duration>,
        ) -> StoreFuture<'a, ()> {
            Box::pin(async {
                Err(StoreError::Backend {
                    message: "disk full".to_owned(),
                })
            })
        }

        fn delete<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, u64> {
            Box::pin(async { Ok(0) })
        }
    }

    #[tokio::test]
    async fn disabled_route_is_a_noop() {
        let store = Arc::new(CountingStore::default());
        let writer = CacheWriter::new(store.clone());
        let binding = binding(json!({ "enabled": false }));
        let req = request(b"GET /widgets/1 HTTP/1.1\r\nHost: x\r\n\r\n");
        let mut response = Response::new(StatusCode::Ok).body("fresh");

        writer.persist(&binding, &req, &mut response).await.unwrap();

        assert_eq!(store.sets.load(Ordering::SeqCst), 0);
        assert!(!response.headers().contains("expires"));
    }

    #[tokio::test]
    async fn ttl_annotates_response_and_entry() {
        let store = Arc::new(MemoryStore::new());
        let writer = CacheWriter::new(store.clone());
        let binding = binding(json!({ "expiresAt": "60 seconds" }));
        let req = request(b"GET /widgets/1 HTTP/1.1\r\nHost: x\r\n\r\n");
        let key = binding.cache_key(&req);
        let mut response = Response::new(StatusCode::Ok).body("fresh");

        let before = Utc::now();
        writer.persist(&binding, &req, &mut response).await.unwrap();
        let after = Utc::now();

        assert!(response.headers().contains("expires"));

        let entry = store.get(&key).await.unwrap().unwrap();
        let expires_at = entry.expires_at.unwrap();
        assert!(expires_at >= before + chrono::Duration::seconds(60));
        assert!(expires_at <= after + chrono::Duration::seconds(60));
    }

    #[tokio::test]
    async fn no_ttl_means_no_expiry() {
        let store = Arc::new(MemoryStore::new());
        let writer = CacheWriter::new(store.clone());
        let binding = binding(json!({}));
        let req = request(b"GET /widgets/1 HTTP/1.1\r\nHost: x\r\n\r\n");
        let key = binding.cache_key(&req);
        let mut response = Response::new(StatusCode::Ok).body("fresh");

        writer.persist(&binding, &req, &mut response).await.unwrap();

        assert!(!response.headers().contains("expires"));
        let entry = store.get(&key).await.unwrap().unwrap();
        assert_eq!(entry.expires_at, None);
    }

    #[tokio::test]
    async fn written_entry_round_trips_through_the_reader() {
        let store = Arc::new(MemoryStore::new());
        let writer = CacheWriter::new(store.clone());
        let reader = CacheReader::new(store.clone());
        let binding = binding(json!({ "expiresAt": "1 hour" }));
        let req = request(b"GET /widgets/1 HTTP/1.1\r\nHost: x\r\n\r\n");
        let mut response = Response::new(StatusCode::Ok)
            .header("Content-Type", "application/json")
            .body(r#"{"id":1}"#);

        writer.persist(&binding, &req, &mut response).await.unwrap();

        match reader.probe(&binding, &req).await {
            ReadOutcome::Hit(cached) => {
                assert_eq!(cached.status(), StatusCode::Ok);
                assert_eq!(cached.body_data(), response.body_data());
                assert_eq!(
                    cached.headers().get("content-type"),
                    Some("application/json")
                );
                // The snapshot was taken after annotation, so the hit carries
                // the entry's original absolute expiry.
                assert!(cached.headers().contains("expires"));
            }
            ReadOutcome::Miss => panic!("expected a hit"),
        }
    }

    #[tokio::test]
    async fn store_rejection_surfaces_as_write_error() {
        let writer = CacheWriter::new(Arc::new(RejectingStore));
        let binding = binding(json!({}));
        let req = request(b"GET /widgets/1 HTTP/1.1\r\nHost: x\r\n\r\n");
        let mut response = Response::new(StatusCode::Ok).body("fresh");

        let err = writer.persist(&binding, &req, &mut response).await.unwrap_err();
        assert!(matches!(err, CacheWriteError::Store(_)));
    }

    #[test]
    fn http_date_format() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(http_date(epoch), "Thu, 01 Jan 1970 00:00:00 GMT");
    }
}
