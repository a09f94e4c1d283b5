//! Single-request fallback transport
//!
//! Performs each request of a batch individually against per-resource REST
//! endpoints and synthesizes an id-keyed response object, so the
//! demultiplexer handles the result exactly like a server-side batch.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::debug;
use url::Url;

use crate::config::EndpointConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::types::ApiRequest;
use crate::HttpMethod;

/// Executes batch members one by one against the REST surface
pub struct SingleFlightDispatcher {
    client: reqwest::Client,
    base_url: Url,
    headers: HashMap<String, String>,
}

impl SingleFlightDispatcher {
    /// Create a new single-request dispatcher
    pub fn new(client: reqwest::Client, endpoint: &EndpointConfig) -> Result<Self> {
        Ok(Self {
            client,
            base_url: Url::parse(&endpoint.base_url)?,
            headers: endpoint.headers.clone(),
        })
    }

    /// Perform one request; transport errors surface as the caller's
    /// per-item failure rather than failing the synthesized batch.
    async fn perform(&self, request: &ApiRequest) -> Result<(u16, Value)> {
        let url = self.base_url.join(&request.endpoint)?;

        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        };

        let mut outbound = self.client.request(method, url);

        for (name, value) in &self.headers {
            outbound = outbound.header(name, value);
        }
        if let Some(headers) = &request.headers {
            for (name, value) in headers {
                outbound = outbound.header(name, value);
            }
        }

        if let Some(params) = &request.params {
            let query: Vec<(String, String)> = params
                .iter()
                .map(|(name, value)| (name.clone(), query_value(value)))
                .collect();
            outbound = outbound.query(&query);
        }

        if let Some(body) = &request.body {
            outbound = outbound.json(body);
        }

        let response = outbound.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let data = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok((status, data))
    }
}

/// Render a parameter value for the query string
fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Dispatcher for SingleFlightDispatcher {
    async fn dispatch(&self, batch: &[ApiRequest]) -> Result<Value> {
        let mut out = Map::new();

        for request in batch {
            match self.perform(request).await {
                Ok((status, data)) => {
                    out.insert(
                        request.id.clone(),
                        json!({ "id": request.id, "status": status, "data": data }),
                    );
                }
                Err(error) => {
                    debug!(
                        id = request.id.as_str(),
                        error = %error,
                        "Single request failed"
                    );
                    out.insert(
                        request.id.clone(),
                        json!({ "id": request.id, "status": 0, "error": error.to_string() }),
                    );
                }
            }
        }

        Ok(Value::Object(out))
    }

    fn name(&self) -> &'static str {
        "single-flight"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_value_rendering() {
        assert_eq!(query_value(&json!("abc")), "abc");
        assert_eq!(query_value(&json!(42)), "42");
        assert_eq!(query_value(&json!(true)), "true");
    }
}
