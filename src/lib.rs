//! # cachet
//!
//! Per-route response caching middleware for async HTTP pipelines.
//!
//! cachet sits between the transport and the route handler chain. Before the
//! chain runs, [`cache::CacheReader`] probes the configured store and serves a
//! live cached response directly, short-circuiting the handlers. After a
//! successful dispatch, [`cache::CacheWriter`] snapshots the outgoing response,
//! stamps it with an `Expires` header, and persists it under a deterministic
//! per-route cache key. Administrative purging is guarded by
//! [`cache::PurgeAuthority`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cachet::cache::{CacheConfig, CacheMiddleware, MemoryStore, RouteBinding};
//! use cachet::middleware::{MiddlewareHandler, Next, from_middleware};
//! use cachet::{Context, Method, Request, Response, StatusCode};
//! use serde_json::json;
//!
//! # async fn example(request: Request) {
//! let config = CacheConfig::from_value(json!({ "expiresAt": "1 minute" })).unwrap();
//! let binding = Arc::new(RouteBinding::bind(Method::Get, "/widgets/:id", config).unwrap());
//! let store = Arc::new(MemoryStore::new());
//!
//! let cache = from_middleware(Arc::new(CacheMiddleware::new(binding, store)));
//! let handler: MiddlewareHandler = Arc::new(|_ctx: Context, _next: Next| {
//!     Box::pin(async move { Response::new(StatusCode::Ok).body("fresh") })
//! });
//!
//! let chain = Next::new(vec![cache, handler]);
//! let response = chain.run(Context::new(request)).await;
//! assert_eq!(response.headers().get("x-cache"), Some("miss"));
//! # }
//! ```

// ── Pipeline boundary types ───────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;

// ── The caching core ──────────────────────────────────────────────────────────
pub mod cache;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use context::Context;
pub use http::{Headers, Method, Request, Response, StatusCode};
