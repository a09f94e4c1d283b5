//! Cache key normalization
//!
//! Builds a deterministic key from method, endpoint and parameters so that
//! semantically identical requests map to the same cache entry regardless of
//! field ordering or cosmetic cache-buster parameters.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use crate::config::NormalizerConfig;
use crate::types::ApiRequest;

/// Parameter names excluded from cache keys by default
static DEFAULT_IGNORED_PARAMS: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["_", "t", "ts", "timestamp", "nonce", "cache_bust", "cb"]);

/// Default ignored parameter names as owned strings, for configuration
pub fn default_ignored_params() -> Vec<String> {
    DEFAULT_IGNORED_PARAMS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Builds deterministic cache keys for requests
#[derive(Debug, Clone)]
pub struct RequestNormalizer {
    /// Parameter names excluded from key construction
    ignored_params: HashSet<String>,

    /// Endpoints whose responses are assumed parameter-invariant
    immutable_endpoints: HashSet<String>,

    /// Minimum TTL applied to immutable endpoints
    immutable_min_ttl: Duration,
}

impl RequestNormalizer {
    /// Create a normalizer from configuration
    pub fn new(config: &NormalizerConfig) -> Self {
        Self {
            ignored_params: config.ignored_params.iter().cloned().collect(),
            immutable_endpoints: config.immutable_endpoints.iter().cloned().collect(),
            immutable_min_ttl: config.immutable_min_ttl(),
        }
    }

    /// Build the cache key for a request.
    ///
    /// Immutable endpoints are keyed by bare path. Everything else is keyed
    /// by method + endpoint + canonically serialized params and body, with
    /// object keys sorted and ignored parameters removed.
    pub fn cache_key(&self, request: &ApiRequest) -> String {
        if self.immutable_endpoints.contains(&request.endpoint) {
            return request.endpoint.clone();
        }

        let mut key = format!("{} {}", request.method, request.endpoint);

        if let Some(params) = &request.params {
            let filtered: BTreeMap<&String, &Value> = params
                .iter()
                .filter(|(name, _)| !self.ignored_params.contains(name.as_str()))
                .collect();
            if !filtered.is_empty() {
                key.push('?');
                let mut first = true;
                for (name, value) in filtered {
                    if !first {
                        key.push('&');
                    }
                    first = false;
                    key.push_str(name);
                    key.push('=');
                    key.push_str(&canonical_json(value));
                }
            }
        }

        if let Some(body) = &request.body {
            key.push('#');
            key.push_str(&self.canonical_body(body));
        }

        key
    }

    /// Effective TTL for a cacheable request, honoring per-request overrides
    /// and the immutable-endpoint floor
    pub fn effective_ttl(&self, request: &ApiRequest, default_ttl: Duration) -> Duration {
        let ttl = request.cache_ttl.unwrap_or(default_ttl);
        if self.immutable_endpoints.contains(&request.endpoint) {
            ttl.max(self.immutable_min_ttl)
        } else {
            ttl
        }
    }

    /// Check if an endpoint is configured as immutable
    pub fn is_immutable(&self, endpoint: &str) -> bool {
        self.immutable_endpoints.contains(endpoint)
    }

    /// Canonicalize a body value, dropping ignored top-level keys
    fn canonical_body(&self, body: &Value) -> String {
        match body {
            Value::Object(map) => {
                let filtered: BTreeMap<&String, &Value> = map
                    .iter()
                    .filter(|(name, _)| !self.ignored_params.contains(name.as_str()))
                    .collect();
                let mut out = String::from("{");
                let mut first = true;
                for (name, value) in filtered {
                    if !first {
                        out.push(',');
                    }
                    first = false;
                    out.push_str(&format!("\"{}\":{}", name, canonical_json(value)));
                }
                out.push('}');
                out
            }
            other => canonical_json(other),
        }
    }
}

/// Serialize a JSON value with recursively sorted object keys
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let mut out = String::from("{");
            let mut first = true;
            for (name, value) in sorted {
                if !first {
                    out.push(',');
                }
                first = false;
                out.push_str(&format!("\"{}\":{}", name, canonical_json(value)));
            }
            out.push('}');
            out
        }
        Value::Array(items) => {
            let mut out = String::from("[");
            let mut first = true;
            for item in items {
                if !first {
                    out.push(',');
                }
                first = false;
                out.push_str(&canonical_json(item));
            }
            out.push(']');
            out
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpMethod;
    use proptest::prelude::*;
    use serde_json::json;

    fn normalizer() -> RequestNormalizer {
        RequestNormalizer::new(&NormalizerConfig::default())
    }

    #[test]
    fn test_key_stable_under_param_order() {
        let a = ApiRequest::get("/api/users")
            .with_param("page", 2)
            .with_param("limit", 50);
        let b = ApiRequest::get("/api/users")
            .with_param("limit", 50)
            .with_param("page", 2);

        let normalizer = normalizer();
        assert_eq!(normalizer.cache_key(&a), normalizer.cache_key(&b));
    }

    #[test]
    fn test_ignored_params_excluded() {
        let plain = ApiRequest::get("/api/users").with_param("page", 1);
        let busted = ApiRequest::get("/api/users")
            .with_param("page", 1)
            .with_param("timestamp", 1699999999)
            .with_param("_", "cachebust");

        let normalizer = normalizer();
        assert_eq!(normalizer.cache_key(&plain), normalizer.cache_key(&busted));
    }

    #[test]
    fn test_method_distinguishes_keys() {
        let get = ApiRequest::get("/api/users");
        let delete = ApiRequest::delete("/api/users");

        let normalizer = normalizer();
        assert_ne!(normalizer.cache_key(&get), normalizer.cache_key(&delete));
    }

    #[test]
    fn test_immutable_endpoint_uses_bare_path() {
        let config = NormalizerConfig {
            immutable_endpoints: vec!["/api/config".to_string()],
            ..NormalizerConfig::default()
        };
        let normalizer = RequestNormalizer::new(&config);

        let request = ApiRequest::get("/api/config").with_param("v", 3);
        assert_eq!(normalizer.cache_key(&request), "/api/config");
        assert!(normalizer.is_immutable("/api/config"));
    }

    #[test]
    fn test_immutable_ttl_floor() {
        let config = NormalizerConfig {
            immutable_endpoints: vec!["/api/config".to_string()],
            immutable_min_ttl_ms: 600_000,
            ..NormalizerConfig::default()
        };
        let normalizer = RequestNormalizer::new(&config);

        let immutable = ApiRequest::get("/api/config");
        let regular = ApiRequest::get("/api/users");
        let default_ttl = Duration::from_millis(60_000);

        assert_eq!(
            normalizer.effective_ttl(&immutable, default_ttl),
            Duration::from_millis(600_000)
        );
        assert_eq!(normalizer.effective_ttl(&regular, default_ttl), default_ttl);
    }

    #[test]
    fn test_nested_body_keys_sorted() {
        let a = ApiRequest::post("/api/items", json!({"b": {"y": 1, "x": 2}, "a": 1}));
        let b = ApiRequest::post("/api/items", json!({"a": 1, "b": {"x": 2, "y": 1}}));

        let normalizer = normalizer();
        let key_a = normalizer.cache_key(&a.with_id("r1"));
        let key_b = normalizer.cache_key(&b.with_id("r2"));
        assert_eq!(key_a, key_b);
    }

    proptest! {
        #[test]
        fn prop_key_independent_of_insertion_order(
            entries in proptest::collection::hash_map("[a-z]{1,8}", 0i64..1000, 1..8)
        ) {
            let forward: Vec<(String, i64)> =
                entries.iter().map(|(name, value)| (name.clone(), *value)).collect();
            let mut reversed = forward.clone();
            reversed.reverse();

            let mut a = ApiRequest::get("/api/things");
            for (name, value) in &forward {
                a = a.with_param(name.clone(), *value);
            }
            let mut b = ApiRequest::get("/api/things");
            for (name, value) in &reversed {
                b = b.with_param(name.clone(), *value);
            }

            let normalizer = normalizer();
            prop_assert_eq!(normalizer.cache_key(&a), normalizer.cache_key(&b));
        }
    }
}
