//! Core request and response types for the batch coordinator

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::HttpMethod;

/// One logical API call awaiting dispatch.
///
/// Only `id`, `endpoint`, `method`, `params`, `body` and `headers` go over
/// the wire; the remaining fields steer client-side handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Unique id used to match the batched response element back to the caller
    pub id: String,

    /// API path, e.g. `/api/sessions`
    pub endpoint: String,

    /// HTTP method
    pub method: HttpMethod,

    /// Query parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<HashMap<String, Value>>,

    /// Payload for non-GET methods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Additional headers for this request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,

    /// Per-request timeout override
    #[serde(skip)]
    pub timeout: Option<Duration>,

    /// Resolve with null instead of rejecting when this request fails
    #[serde(skip)]
    pub ignore_errors: bool,

    /// A failure of this request should abort the rest of the batch.
    /// Carried as a flag; enforcement is limited to surfacing the failure.
    #[serde(skip)]
    pub critical: bool,

    /// Per-request cache TTL override
    #[serde(skip)]
    pub cache_ttl: Option<Duration>,
}

impl ApiRequest {
    /// Create a new request with a generated id
    pub fn new<S: Into<String>>(method: HttpMethod, endpoint: S) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            endpoint: endpoint.into(),
            method,
            params: None,
            body: None,
            headers: None,
            timeout: None,
            ignore_errors: false,
            critical: false,
            cache_ttl: None,
        }
    }

    /// Create a new GET request
    pub fn get<S: Into<String>>(endpoint: S) -> Self {
        Self::new(HttpMethod::Get, endpoint)
    }

    /// Create a new POST request with a body
    pub fn post<S: Into<String>>(endpoint: S, body: Value) -> Self {
        let mut request = Self::new(HttpMethod::Post, endpoint);
        request.body = Some(body);
        request
    }

    /// Create a new PUT request with a body
    pub fn put<S: Into<String>>(endpoint: S, body: Value) -> Self {
        let mut request = Self::new(HttpMethod::Put, endpoint);
        request.body = Some(body);
        request
    }

    /// Create a new DELETE request
    pub fn delete<S: Into<String>>(endpoint: S) -> Self {
        Self::new(HttpMethod::Delete, endpoint)
    }

    /// Create a new PATCH request with a body
    pub fn patch<S: Into<String>>(endpoint: S, body: Value) -> Self {
        let mut request = Self::new(HttpMethod::Patch, endpoint);
        request.body = Some(body);
        request
    }

    /// Set a caller-assigned id
    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = id.into();
        self
    }

    /// Set the full query parameter map
    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    /// Add a single query parameter
    pub fn with_param<S: Into<String>, V: Into<Value>>(mut self, key: S, value: V) -> Self {
        self.params
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Add a single header
    pub fn with_header<S: Into<String>>(mut self, key: S, value: S) -> Self {
        self.headers
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Set a per-request timeout override
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set a per-request cache TTL override
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Resolve with null instead of rejecting when this request fails
    pub fn ignoring_errors(mut self) -> Self {
        self.ignore_errors = true;
        self
    }

    /// Mark this request as critical
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// The demultiplexed per-request outcome extracted from a batch response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponseEnvelope {
    /// Matches an `ApiRequest` id
    pub id: String,

    /// Numeric status code
    pub status: u16,

    /// Payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchResponseEnvelope {
    /// Create a successful envelope
    pub fn success<S: Into<String>>(id: S, status: u16, data: Option<Value>) -> Self {
        Self {
            id: id.into(),
            status,
            data,
            error: None,
        }
    }

    /// Create a failed envelope
    pub fn failure<S: Into<String>>(id: S, status: u16, error: S) -> Self {
        Self {
            id: id.into(),
            status,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Check whether this envelope reports success
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
