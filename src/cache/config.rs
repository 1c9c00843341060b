//! Per-route cache configuration.
//!
//! A [`CacheConfig`] is built once at route-registration time from a JSON
//! mapping merged field-by-field over the documented defaults, and is never
//! mutated afterward — changing a route's caching behavior means rebuilding
//! the config and re-binding the route.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while building a [`CacheConfig`] from a mapping.
///
/// Configuration problems are fatal at registration time: a route with a
/// malformed cache config never starts serving.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed cache configuration: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unparsable duration string {value:?}")]
    InvalidTtl { value: String },
}

// Raw deserialization target. `#[serde(default)]` gives the field-by-field
// merge over defaults: absent keys fall back, present keys override.
#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawConfig {
    enabled: bool,
    purgeable: bool,
    expires_at: Option<String>,
    secret_key: Option<String>,
    key_generator: Option<String>,
    key_generator_options: Option<serde_json::Map<String, Value>>,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            purgeable: false,
            expires_at: None,
            secret_key: None,
            key_generator: None,
            key_generator_options: None,
        }
    }
}

/// Immutable per-route cache configuration.
///
/// | Key (mapping)         | Default | Meaning                                      |
/// |-----------------------|---------|----------------------------------------------|
/// | `enabled`             | `true`  | `false` disables both cache paths entirely   |
/// | `purgeable`           | `false` | `false` rejects every purge for the route    |
/// | `expiresAt`           | none    | TTL as a duration string, e.g. `"1 hour"`    |
/// | `secretKey`           | none    | shared secret for purge auth / signed keys   |
/// | `keyGenerator`        | none    | key strategy identifier (none = default)     |
/// | `keyGeneratorOptions` | none    | strategy parameters                          |
///
/// # Examples
///
/// ```
/// use cachet::cache::CacheConfig;
/// use serde_json::json;
///
/// let config = CacheConfig::from_value(json!({
///     "purgeable": true,
///     "expiresAt": "1 hour",
///     "secretKey": "s3cret",
/// })).unwrap();
///
/// assert!(config.enabled());
/// assert_eq!(config.ttl(), Some(std::time::Duration::from_secs(3600)));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    enabled: bool,
    purgeable: bool,
    ttl: Option<Duration>,
    secret: Option<String>,
    key_generator: Option<String>,
    key_generator_options: Option<serde_json::Map<String, Value>>,
}

impl Default for CacheConfig {
    /// The documented defaults: enabled, not purgeable, no TTL, no secret,
    /// default key strategy.
    fn default() -> Self {
        Self {
            enabled: true,
            purgeable: false,
            ttl: None,
            secret: None,
            key_generator: None,
            key_generator_options: None,
        }
    }
}

impl CacheConfig {
    /// Builds a config from a JSON mapping merged over the defaults.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::Malformed`] — a key is present with an incompatible
    ///   type (e.g. `enabled` as a string).
    /// - [`ConfigError::InvalidTtl`] — `expiresAt` is present but cannot be
    ///   parsed as a duration.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_value(value)?;
        let ttl = raw.expires_at.as_deref().map(parse_duration).transpose()?;

        Ok(Self {
            enabled: raw.enabled,
            purgeable: raw.purgeable,
            ttl,
            secret: raw.secret_key,
            key_generator: raw.key_generator,
            key_generator_options: raw.key_generator_options,
        })
    }

    /// `false` means the route is never read from or written to cache.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// `false` means purge requests for this route always fail.
    pub fn purgeable(&self) -> bool {
        self.purgeable
    }

    /// Entry lifetime; `None` means entries never expire by time.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Shared secret for purge authorization and signed key derivation.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    /// Selected key strategy identifier; `None` selects the default strategy.
    pub fn key_generator(&self) -> Option<&str> {
        self.key_generator.as_deref()
    }

    /// Parameters for the selected key strategy.
    pub fn key_generator_options(&self) -> Option<&serde_json::Map<String, Value>> {
        self.key_generator_options.as_ref()
    }
}

/// Parses a human duration string into a [`Duration`].
///
/// Accepts a bare integer (seconds), `"30s"`-style suffixes, and spelled-out
/// units: `second(s)`, `minute(s)`, `hour(s)`, `day(s)`.
fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidTtl {
        value: input.to_owned(),
    };

    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let count: u64 = digits.parse().map_err(|_| invalid())?;

    let seconds_per_unit = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hour" | "hours" => 3_600,
        "d" | "day" | "days" => 86_400,
        _ => return Err(invalid()),
    };

    count
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}
