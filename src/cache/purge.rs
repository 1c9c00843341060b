//! Administrative purging.
//!
//! Purge is an out-of-band control path: it never runs as part of request
//! serving and, unlike the two cache paths, it is allowed to fail loudly.
//! Authorization is checked in full before anything is deleted — a purge
//! either applies or leaves the store untouched.

use std::sync::Arc;

use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::info;

use crate::Request;

use super::route::RouteBinding;
use super::store::{CacheStore, StoreError};

/// Policy violations and failures on the purge control path.
#[derive(Debug, Error)]
pub enum PurgeError {
    /// The route's configuration forbids purging, regardless of secret.
    #[error("route {route:?} does not allow purging")]
    Forbidden { route: String },

    /// No secret is configured, or the presented secret does not match.
    #[error("purge secret rejected for route {route:?}")]
    Unauthorized { route: String },

    /// The store failed while deleting; surfaced to the purge caller.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validates purge requests and deletes matching entries.
pub struct PurgeAuthority {
    store: Arc<dyn CacheStore>,
}

impl PurgeAuthority {
    /// Creates a purge authority over the given store.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Purges the entry at `key` for the bound route.
    ///
    /// Returns the number of entries removed (zero for an absent key — purging
    /// a key that holds nothing is not an error).
    ///
    /// # Errors
    ///
    /// - [`PurgeError::Forbidden`] — the route is not purgeable.
    /// - [`PurgeError::Unauthorized`] — no configured secret, or the presented
    ///   secret fails the constant-time comparison.
    /// - [`PurgeError::Store`] — the store rejected the deletion.
    pub async fn purge(
        &self,
        binding: &RouteBinding,
        key: &str,
        presented: &str,
    ) -> Result<u64, PurgeError> {
        self.authorize(binding, presented)?;

        let removed = self.store.delete(key).await?;
        info!(route = %binding.identity(), key = %key, removed, "cache purge");
        Ok(removed)
    }

    /// Purges the entry a given request would map to, deriving the key through
    /// the binding's generator — the same derivation the cache paths use.
    pub async fn purge_request(
        &self,
        binding: &RouteBinding,
        request: &Request,
        presented: &str,
    ) -> Result<u64, PurgeError> {
        let key = binding.cache_key(request);
        self.purge(binding, &key, presented).await
    }

    // The whole authorization decision, taken before any store access.
    fn authorize(&self, binding: &RouteBinding, presented: &str) -> Result<(), PurgeError> {
        let route = || binding.identity().to_string();

        if !binding.config().purgeable() {
            return Err(PurgeError::Forbidden { route: route() });
        }

        let Some(secret) = binding.config().secret() else {
            return Err(PurgeError::Unauthorized { route: route() });
        };

        if bool::from(secret.as_bytes().ct_eq(presented.as_bytes())) {
            Ok(())
        } else {
            Err(PurgeError::Unauthorized { route: route() })
        }
    }
}
