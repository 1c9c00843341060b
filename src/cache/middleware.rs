//! The pipeline adapter composing the read and write paths.
//!
//! [`CacheMiddleware`] is how the cache plugs into the middleware chain: the
//! pre-handler stage probes the store and short-circuits on a live hit, the
//! post-handler stage persists successful responses. The cache key is derived
//! exactly once per request and shared between the two stages, so the central
//! invariant — both paths deriving the same key for the same request — holds
//! by construction.

use std::pin::Pin;
use std::sync::Arc;

use crate::{
    Response,
    context::Context,
    middleware::{Middleware, Next},
};

use super::read::{CacheReader, ReadOutcome};
use super::route::RouteBinding;
use super::store::CacheStore;
use super::write::CacheWriter;

/// Per-route caching middleware.
///
/// Wraps the rest of the chain for one bound route. Responses served from
/// cache carry `X-Cache: hit`; freshly dispatched ones carry `X-Cache: miss`.
/// Only successful (2xx) responses are persisted, and persistence is best
/// effort — a failing store degrades the route to uncached operation without
/// affecting clients.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use cachet::cache::{CacheConfig, CacheMiddleware, MemoryStore, RouteBinding};
/// use cachet::middleware::from_middleware;
/// use cachet::Method;
/// use serde_json::json;
///
/// let config = CacheConfig::from_value(json!({ "expiresAt": "1 hour" })).unwrap();
/// let binding = Arc::new(RouteBinding::bind(Method::Get, "/widgets/:id", config).unwrap());
/// let store = Arc::new(MemoryStore::new());
///
/// let handler = from_middleware(Arc::new(CacheMiddleware::new(binding, store)));
/// ```
pub struct CacheMiddleware {
    binding: Arc<RouteBinding>,
    reader: CacheReader,
    writer: CacheWriter,
}

impl CacheMiddleware {
    /// Creates the middleware for one bound route over the given store.
    pub fn new(binding: Arc<RouteBinding>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            binding,
            reader: CacheReader::new(Arc::clone(&store)),
            writer: CacheWriter::new(store),
        }
    }
}

impl Middleware for CacheMiddleware {
    /// Serve from cache when possible, otherwise dispatch and persist.
    ///
    /// The write completes before the response is returned to the transport;
    /// it does not depend on the client connection staying open.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let binding = Arc::clone(&self.binding);
        let reader = self.reader.clone();
        let writer = self.writer.clone();

        Box::pin(async move {
            if !binding.config().enabled() {
                return next.run(ctx).await;
            }

            let key = binding.cache_key(ctx.request());

            if let ReadOutcome::Hit(mut cached) = reader.probe_keyed(&binding, &key).await {
                cached.add_header("X-Cache", "hit");
                return cached;
            }

            let mut response = next.run(ctx).await;

            if response.status().is_success() {
                if let Err(error) = writer.persist_keyed(&binding, &key, &mut response).await {
                    tracing::warn!(route = %binding.identity(), key = %key, error = %error,
                        "failed to cache handler result");
                }
            }

            response.add_header("X-Cache", "miss");
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::CacheConfig;
    use crate::cache::store::{CacheEntry, MemoryStore, StoreFuture};
    use crate::middleware::{MiddlewareHandler, from_middleware};
    use crate::{Method, Request, StatusCode};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn make_ctx(raw: &[u8]) -> Context {
        let (req, _) = Request::parse(raw).unwrap();
        Context::new(req)
    }

    fn make_request(raw: &[u8]) -> Request {
        let (req, _) = Request::parse(raw).unwrap();
        req
    }

    fn binding(config: serde_json::Value) -> Arc<RouteBinding> {
        let config = CacheConfig::from_value(config).unwrap();
        Arc::new(RouteBinding::bind(Method::Get, "/widgets/:id", config).unwrap())
    }

    // A terminal handler that counts invocations.
    fn counting_handler(hits: Arc<AtomicUsize>, status: StatusCode) -> MiddlewareHandler {
        Arc::new(move |_ctx: Context, _next: Next| {
            let hits = Arc::clone(&hits);
            Box::pin(async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Response::new(status).body("handler output")
            })
        })
    }

    async fn dispatch(cache: &MiddlewareHandler, handler: &MiddlewareHandler) -> Response {
        let chain = Next::new(vec![cache.clone(), handler.clone()]);
        chain
            .run(make_ctx(b"GET /widgets/42 HTTP/1.1\r\nHost: x\r\n\r\n"))
            .await
    }

    #[tokio::test]
    async fn second_request_is_served_without_reexecuting_the_handler() {
        let store = Arc::new(MemoryStore::new());
        let binding = binding(json!({ "expiresAt": "60 seconds" }));
        let cache = from_middleware(Arc::new(CacheMiddleware::new(binding, store)));

        let executions = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&executions), StatusCode::Ok);

        let first = dispatch(&cache, &handler).await;
        assert_eq!(first.headers().get("x-cache"), Some("miss"));
        assert!(first.headers().contains("expires"));
        assert_eq!(executions.load(Ordering::SeqCst), 1);

        let second = dispatch(&cache, &handler).await;
        assert_eq!(second.headers().get("x-cache"), Some("hit"));
        assert_eq!(second.body_data(), b"handler output");
        assert!(second.headers().contains("expires"));
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_causes_redispatch_and_overwrite() {
        let store = Arc::new(MemoryStore::new());
        let binding = binding(json!({ "expiresAt": "60 seconds" }));
        let cache = from_middleware(Arc::new(CacheMiddleware::new(
            Arc::clone(&binding),
            store.clone(),
        )));

        let executions = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&executions), StatusCode::Ok);

        dispatch(&cache, &handler).await;
        assert_eq!(executions.load(Ordering::SeqCst), 1);

        // Age the stored entry past its logical expiry.
        let req = make_request(b"GET /widgets/42 HTTP/1.1\r\nHost: x\r\n\r\n");
        let key = binding.cache_key(&req);
        let mut entry = store.get(&key).await.unwrap().unwrap();
        entry.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        store.set(&key, entry, None).await.unwrap();

        let third = dispatch(&cache, &handler).await;
        assert_eq!(third.headers().get("x-cache"), Some("miss"));
        assert_eq!(executions.load(Ordering::SeqCst), 2);

        // The re-dispatch overwrote the entry with a fresh expiry.
        let refreshed = store.get(&key).await.unwrap().unwrap();
        assert!(refreshed.expires_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn handler_failures_are_not_cached() {
        let store = Arc::new(MemoryStore::new());
        let binding = binding(json!({}));
        let cache = from_middleware(Arc::new(CacheMiddleware::new(binding, store.clone())));

        let executions = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&executions), StatusCode::InternalServerError);

        let first = dispatch(&cache, &handler).await;
        assert_eq!(first.status(), StatusCode::InternalServerError);
        assert!(store.is_empty());

        dispatch(&cache, &handler).await;
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_route_never_touches_the_store() {
        #[derive(Default)]
        struct TouchCounter {
            touches: AtomicUsize,
        }

        impl CacheStore for TouchCounter {
            fn get<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, Option<CacheEntry>> {
                self.touches.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(None) })
            }

            fn set<'a>(
                &'a self,
                _key: &'a str,
                _entry: CacheEntry,
                _ttl: Option<Duration>,
            ) -> StoreFuture<'a, ()> {
                self.touches.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(()) })
            }

            fn delete<'a>(&'a self, _key: &'a str) -> StoreFuture<'a, u64> {
                self.touches.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(0) })
            }
        }

        let store = Arc::new(TouchCounter::default());
        let binding = binding(json!({ "enabled": false }));
        let cache = from_middleware(Arc::new(CacheMiddleware::new(binding, store.clone())));

        let executions = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&executions), StatusCode::Ok);

        dispatch(&cache, &handler).await;
        dispatch(&cache, &handler).await;

        assert_eq!(executions.load(Ordering::SeqCst), 2);
        assert_eq!(store.touches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn hit_does_not_accumulate_cache_status_headers() {
        let store = Arc::new(MemoryStore::new());
        let binding = binding(json!({}));
        let cache = from_middleware(Arc::new(CacheMiddleware::new(binding, store)));

        let executions = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&executions), StatusCode::Ok);

        dispatch(&cache, &handler).await;
        let hit = dispatch(&cache, &handler).await;

        let statuses: Vec<_> = hit.headers().get_all("x-cache").collect();
        assert_eq!(statuses, vec!["hit"]);
    }
}
