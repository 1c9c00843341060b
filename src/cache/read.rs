//! The read/short-circuit path.
//!
//! Runs before the route's handler chain. On a live hit the cached payload is
//! rehydrated into a response and the chain never executes; on a miss (or any
//! store trouble) the request proceeds as if the cache did not exist. Nothing
//! on this path is allowed to degrade the client-visible response.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::{Request, Response};

use super::route::RouteBinding;
use super::store::CacheStore;

/// Outcome of a cache probe.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A live entry was found; serve this response and skip the handler chain.
    Hit(Response),
    /// No usable entry; continue to the handler chain.
    Miss,
}

impl ReadOutcome {
    /// Returns `true` for [`ReadOutcome::Hit`].
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Probes the store ahead of dispatch and serves live hits.
#[derive(Clone)]
pub struct CacheReader {
    store: Arc<dyn CacheStore>,
}

impl CacheReader {
    /// Creates a reader over the given store.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Probes the cache for `request` on the bound route.
    ///
    /// Disabled routes return [`ReadOutcome::Miss`] without touching the
    /// store. Otherwise exactly one store read happens, plus at most one
    /// best-effort delete when a logically expired entry is found.
    pub async fn probe(&self, binding: &RouteBinding, request: &Request) -> ReadOutcome {
        if !binding.config().enabled() {
            return ReadOutcome::Miss;
        }
        let key = binding.cache_key(request);
        self.probe_keyed(binding, &key).await
    }

    /// Probes with a pre-derived key.
    ///
    /// The middleware derives the key once per request and shares it between
    /// this probe and the write path, so both paths agree by construction.
    pub async fn probe_keyed(&self, binding: &RouteBinding, key: &str) -> ReadOutcome {
        if !binding.config().enabled() {
            return ReadOutcome::Miss;
        }

        let entry = match self.store.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(route = %binding.identity(), key = %key, "cache miss");
                return ReadOutcome::Miss;
            }
            Err(error) => {
                // A flaky store must not break request serving.
                warn!(route = %binding.identity(), key = %key, error = %error,
                    "cache read failed; treating as miss");
                return ReadOutcome::Miss;
            }
        };

        if entry.is_expired(Utc::now()) {
            debug!(route = %binding.identity(), key = %key, "cache entry expired");
            if let Err(error) = self.store.delete(key).await {
                warn!(key = %key, error = %error, "failed to evict expired entry");
            }
            return ReadOutcome::Miss;
        }

        debug!(route = %binding.identity(), key = %key, "cache hit");
        ReadOutcome::Hit(entry.payload.to_response())
    }
}
