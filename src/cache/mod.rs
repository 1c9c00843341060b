//! Per-route response caching.
//!
//! The layer splits into small, separately testable pieces:
//!
//! | Piece                | Role                                              |
//! |----------------------|---------------------------------------------------|
//! | [`CacheConfig`]      | immutable per-route policy, built from a mapping  |
//! | [`CacheKeyGenerator`]| deterministic key derivation, pluggable strategies|
//! | [`RouteBinding`]     | route identity + validated config, built eagerly  |
//! | [`CacheStore`]       | TTL-aware key/value boundary (external engine)    |
//! | [`CacheReader`]      | pre-dispatch probe, short-circuits on live hits   |
//! | [`CacheWriter`]      | post-dispatch persistence + `Expires` annotation  |
//! | [`PurgeAuthority`]   | secret-gated administrative deletion              |
//! | [`CacheMiddleware`]  | chain adapter composing reader and writer         |
//!
//! Failures on the request-serving path are contained: a broken store turns
//! the route into an uncached one, never into an error for the client. Only
//! the purge control path fails loudly.

pub mod config;
pub mod key;
pub mod middleware;
pub mod purge;
pub mod read;
pub mod route;
pub mod store;
pub mod write;

pub use config::{CacheConfig, ConfigError};
pub use key::{CacheKeyGenerator, KeyGenerationError, KeyStrategy};
pub use middleware::CacheMiddleware;
pub use purge::{PurgeAuthority, PurgeError};
pub use read::{CacheReader, ReadOutcome};
pub use route::{RouteBinding, RouteIdentity};
pub use store::{CacheEntry, CacheStore, CachedResponse, MemoryStore, StoreError, StoreFuture};
pub use write::{CacheWriteError, CacheWriter};
