//! Cache key derivation.
//!
//! A cache key is an opaque string derived deterministically from the route
//! identity, the request, and the route's configuration. Two requests that
//! produce the same key are treated as interchangeable by the cache; the
//! selected [`KeyStrategy`] is the sole authority for that equivalence.
//!
//! Strategies are resolved by identifier at route-registration time, so an
//! unknown `keyGenerator` value is a registration failure, never a request-time
//! surprise. Derivation itself is a pure function of its inputs — no random
//! salt — so keys are stable across process restarts and redeployments.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::Request;

use super::config::CacheConfig;
use super::route::RouteIdentity;

/// Errors raised while resolving or applying a key strategy.
///
/// All variants are registration-time failures: a route that cannot derive
/// keys never starts serving.
#[derive(Debug, Error)]
pub enum KeyGenerationError {
    #[error("unknown key generator {name:?}")]
    UnknownStrategy { name: String },

    #[error("key generator {name:?} requires option {option:?}")]
    MissingOption {
        name: &'static str,
        option: &'static str,
    },

    #[error("the signed key generator requires a configured secret")]
    SecretRequired,
}

/// A named key-derivation strategy.
///
/// | Identifier            | Derives the key from                                  |
/// |-----------------------|-------------------------------------------------------|
/// | `path-query`          | route identity, method, path, raw query (default)     |
/// | `path-query-headers`  | the above plus selected request headers               |
/// | `signed`              | the above, keyed with the route's configured secret   |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Hash of the route identity, method, path, and raw query string.
    PathQuery,
    /// `PathQuery` plus the values of the named request headers.
    PathQueryHeaders { headers: Vec<String> },
    /// `PathQuery` keyed with the route secret, for tamper-resistant keys.
    Signed,
}

impl KeyStrategy {
    /// Resolves a strategy identifier and its options.
    ///
    /// `None` selects the default [`KeyStrategy::PathQuery`].
    ///
    /// # Errors
    ///
    /// - [`KeyGenerationError::UnknownStrategy`] — unrecognized identifier.
    /// - [`KeyGenerationError::MissingOption`] — `path-query-headers` without
    ///   a non-empty `headers` list in `keyGeneratorOptions`.
    pub fn resolve(
        name: Option<&str>,
        options: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Self, KeyGenerationError> {
        match name {
            None | Some("path-query") => Ok(Self::PathQuery),
            Some("signed") => Ok(Self::Signed),
            Some("path-query-headers") => {
                let mut headers: Vec<String> = options
                    .and_then(|opts| opts.get("headers"))
                    .and_then(|value| value.as_array())
                    .map(|values| {
                        values
                            .iter()
                            .filter_map(|v| v.as_str())
                            .map(|s| s.to_ascii_lowercase())
                            .collect()
                    })
                    .unwrap_or_default();

                if headers.is_empty() {
                    return Err(KeyGenerationError::MissingOption {
                        name: "path-query-headers",
                        option: "headers",
                    });
                }

                // Sorted and deduplicated so option ordering never changes the key.
                headers.sort();
                headers.dedup();
                Ok(Self::PathQueryHeaders { headers })
            }
            Some(other) => Err(KeyGenerationError::UnknownStrategy {
                name: other.to_owned(),
            }),
        }
    }
}

/// Derives cache keys for one route using its resolved strategy.
///
/// Built once per route by [`CacheKeyGenerator::from_config`]; both the read
/// and write paths derive keys through the same generator instance, which is
/// what makes the two paths agree on entry placement.
#[derive(Debug, Clone)]
pub struct CacheKeyGenerator {
    strategy: KeyStrategy,
    secret: Option<String>,
}

impl CacheKeyGenerator {
    /// Resolves the strategy selected by `config` and validates its inputs.
    ///
    /// # Errors
    ///
    /// Everything [`KeyStrategy::resolve`] raises, plus
    /// [`KeyGenerationError::SecretRequired`] when the `signed` strategy is
    /// selected on a route without a configured secret.
    pub fn from_config(config: &CacheConfig) -> Result<Self, KeyGenerationError> {
        let strategy = KeyStrategy::resolve(config.key_generator(), config.key_generator_options())?;

        if strategy == KeyStrategy::Signed && config.secret().is_none() {
            return Err(KeyGenerationError::SecretRequired);
        }

        Ok(Self {
            strategy,
            secret: config.secret().map(str::to_owned),
        })
    }

    /// Returns the resolved strategy.
    pub fn strategy(&self) -> &KeyStrategy {
        &self.strategy
    }

    /// Derives the cache key for `request` on `route`.
    ///
    /// Pure and non-blocking. The result is `<route-slug>:<hex digest>` so
    /// operators can attribute store entries to routes at a glance while the
    /// digest keeps the key deterministic and collision-resistant.
    pub fn generate(&self, route: &RouteIdentity, request: &Request) -> String {
        let mut hasher = Sha256::new();

        if self.strategy == KeyStrategy::Signed {
            if let Some(secret) = &self.secret {
                hasher.update(secret.as_bytes());
                hasher.update([0u8]);
            }
        }

        hasher.update(route.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(request.method().as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(request.path().as_bytes());
        hasher.update([0u8]);
        hasher.update(request.query_string().unwrap_or("").as_bytes());

        if let KeyStrategy::PathQueryHeaders { headers } = &self.strategy {
            for name in headers {
                hasher.update([0u8]);
                hasher.update(name.as_bytes());
                hasher.update([b'=']);
                hasher.update(request.headers().get(name).unwrap_or("").as_bytes());
            }
        }

        format!("{}:{}", route.slug(), hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use serde_json::json;

    fn request(raw: &[u8]) -> Request {
        let (req, _) = Request::parse(raw).unwrap();
        req
    }

    fn route() -> RouteIdentity {
        RouteIdentity::new(Method::Get, "/widgets/:id")
    }

    fn generator(config: serde_json::Value) -> CacheKeyGenerator {
        let config = CacheConfig::from_value(config).unwrap();
        CacheKeyGenerator::from_config(&config).unwrap()
    }

    // ── Resolution ────────────────────────────────────────────────────────────

    #[test]
    fn default_strategy_is_path_query() {
        let keygen = generator(json!({}));
        assert_eq!(keygen.strategy(), &KeyStrategy::PathQuery);
    }

    #[test]
    fn unknown_identifier_fails_at_resolution() {
        let config = CacheConfig::from_value(json!({ "keyGenerator": "bogus" })).unwrap();
        let err = CacheKeyGenerator::from_config(&config).unwrap_err();
        assert!(matches!(err, KeyGenerationError::UnknownStrategy { name } if name == "bogus"));
    }

    #[test]
    fn signed_without_secret_fails_at_resolution() {
        let config = CacheConfig::from_value(json!({ "keyGenerator": "signed" })).unwrap();
        let err = CacheKeyGenerator::from_config(&config).unwrap_err();
        assert!(matches!(err, KeyGenerationError::SecretRequired));
    }

    #[test]
    fn header_strategy_requires_headers_option() {
        let config =
            CacheConfig::from_value(json!({ "keyGenerator": "path-query-headers" })).unwrap();
        let err = CacheKeyGenerator::from_config(&config).unwrap_err();
        assert!(matches!(err, KeyGenerationError::MissingOption { .. }));
    }

    // ── Derivation ────────────────────────────────────────────────────────────

    #[test]
    fn equivalent_requests_share_a_key() {
        let keygen = generator(json!({}));
        let a = keygen.generate(&route(), &request(b"GET /widgets/42 HTTP/1.1\r\nHost: a\r\n\r\n"));
        let b = keygen.generate(&route(), &request(b"GET /widgets/42 HTTP/1.1\r\nHost: b\r\n\r\n"));
        assert_eq!(a, b);
    }

    #[test]
    fn query_distinguishes_keys() {
        let keygen = generator(json!({}));
        let plain = keygen.generate(&route(), &request(b"GET /widgets/42 HTTP/1.1\r\nHost: a\r\n\r\n"));
        let filtered =
            keygen.generate(&route(), &request(b"GET /widgets/42?fields=name HTTP/1.1\r\nHost: a\r\n\r\n"));
        assert_ne!(plain, filtered);
    }

    #[test]
    fn key_carries_route_slug_prefix() {
        let keygen = generator(json!({}));
        let key = keygen.generate(&route(), &request(b"GET /widgets/42 HTTP/1.1\r\nHost: a\r\n\r\n"));
        assert!(key.starts_with(&format!("{}:", route().slug())));
    }

    #[test]
    fn selected_headers_distinguish_keys() {
        let keygen = generator(json!({
            "keyGenerator": "path-query-headers",
            "keyGeneratorOptions": { "headers": ["Accept"] },
        }));
        let json_req = request(b"GET /widgets/42 HTTP/1.1\r\nAccept: application/json\r\n\r\n");
        let xml_req = request(b"GET /widgets/42 HTTP/1.1\r\nAccept: application/xml\r\n\r\n");
        assert_ne!(
            keygen.generate(&route(), &json_req),
            keygen.generate(&route(), &xml_req)
        );
    }

    #[test]
    fn unselected_headers_do_not_affect_keys() {
        let keygen = generator(json!({
            "keyGenerator": "path-query-headers",
            "keyGeneratorOptions": { "headers": ["Accept"] },
        }));
        let a = request(b"GET /widgets/42 HTTP/1.1\r\nAccept: text/html\r\nUser-Agent: curl\r\n\r\n");
        let b = request(b"GET /widgets/42 HTTP/1.1\r\nAccept: text/html\r\nUser-Agent: wget\r\n\r\n");
        assert_eq!(keygen.generate(&route(), &a), keygen.generate(&route(), &b));
    }

    #[test]
    fn header_option_order_is_irrelevant() {
        let forward = generator(json!({
            "keyGenerator": "path-query-headers",
            "keyGeneratorOptions": { "headers": ["Accept", "Accept-Language"] },
        }));
        let reversed = generator(json!({
            "keyGenerator": "path-query-headers",
            "keyGeneratorOptions": { "headers": ["Accept-Language", "Accept"] },
        }));
        let req = request(b"GET /widgets/42 HTTP/1.1\r\nAccept: a\r\nAccept-Language: b\r\n\r\n");
        assert_eq!(
            forward.generate(&route(), &req),
            reversed.generate(&route(), &req)
        );
    }

    #[test]
    fn signed_keys_differ_from_unsigned_and_per_secret() {
        let unsigned = generator(json!({}));
        let signed_a = generator(json!({ "keyGenerator": "signed", "secretKey": "alpha" }));
        let signed_b = generator(json!({ "keyGenerator": "signed", "secretKey": "beta" }));
        let req = request(b"GET /widgets/42 HTTP/1.1\r\nHost: a\r\n\r\n");

        let base = unsigned.generate(&route(), &req);
        let with_a = signed_a.generate(&route(), &req);
        let with_b = signed_b.generate(&route(), &req);

        assert_ne!(base, with_a);
        assert_ne!(with_a, with_b);
    }

    #[test]
    fn plain_strategy_ignores_configured_secret() {
        // Purge secrets and key seeding are independent behaviors: a secret on
        // the route only reaches the key under the signed strategy.
        let with_secret = generator(json!({ "secretKey": "alpha" }));
        let without = generator(json!({}));
        let req = request(b"GET /widgets/42 HTTP/1.1\r\nHost: a\r\n\r\n");
        assert_eq!(
            with_secret.generate(&route(), &req),
            without.generate(&route(), &req)
        );
    }
}
