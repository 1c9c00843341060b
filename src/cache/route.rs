//! Route registration artifacts.
//!
//! The cache layer never matches paths itself — routing is an external
//! collaborator. What it needs from a route is a stable identity to fold
//! into cache keys, and a validated pairing of that identity with the
//! route's [`CacheConfig`]. [`RouteBinding::bind`] performs that pairing at
//! registration time and fails fast, so configuration mistakes (unknown key
//! strategies, signed keys without a secret) never reach request time.

use std::fmt;

use crate::{Method, Request};

use super::config::CacheConfig;
use super::key::{CacheKeyGenerator, KeyGenerationError};

/// Stable identity of a registered route: its method and path pattern.
///
/// The pattern is treated as an opaque label (`"/widgets/:id"` stays
/// `"/widgets/:id"` regardless of what a concrete request path looks like);
/// it anchors every cache key derived for the route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteIdentity {
    method: Method,
    pattern: String,
}

impl RouteIdentity {
    /// Creates an identity from a method and pattern string.
    pub fn new(method: Method, pattern: impl Into<String>) -> Self {
        Self {
            method,
            pattern: pattern.into(),
        }
    }

    /// Returns the HTTP method the route is registered under.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the route's path pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns a store-friendly slug, e.g. `get.widgets.id` for
    /// `GET /widgets/:id`. Used as the cache key prefix so operators can
    /// attribute entries to routes.
    pub fn slug(&self) -> String {
        let mut slug = self.method.as_str().to_ascii_lowercase();
        for segment in self.pattern.split('/').filter(|s| !s.is_empty()) {
            slug.push('.');
            slug.push_str(segment.trim_start_matches(':'));
        }
        slug
    }
}

impl fmt::Display for RouteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}

/// A route identity bound to its validated cache configuration.
///
/// Built once at route registration; both cache paths and the purge
/// authority work through the same binding, which is what guarantees they
/// agree on key derivation and policy.
#[derive(Debug, Clone)]
pub struct RouteBinding {
    identity: RouteIdentity,
    config: CacheConfig,
    keygen: CacheKeyGenerator,
}

impl RouteBinding {
    /// Pairs a route identity with `config`, resolving the key strategy.
    ///
    /// # Errors
    ///
    /// [`KeyGenerationError`] when the configured strategy is unknown,
    /// misparameterized, or signed without a secret — registration fails and
    /// the route never serves.
    pub fn bind(
        method: Method,
        pattern: impl Into<String>,
        config: CacheConfig,
    ) -> Result<Self, KeyGenerationError> {
        let keygen = CacheKeyGenerator::from_config(&config)?;
        Ok(Self {
            identity: RouteIdentity::new(method, pattern),
            config,
            keygen,
        })
    }

    /// Returns the route's stable identity.
    pub fn identity(&self) -> &RouteIdentity {
        &self.identity
    }

    /// Returns the route's cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Derives the cache key for `request` using the bound strategy.
    ///
    /// Read path, write path, and purge-by-request all call through here, so
    /// a single derivation rule governs entry placement for the route.
    pub fn cache_key(&self, request: &Request) -> String {
        self.keygen.generate(&self.identity, request)
    }
}
