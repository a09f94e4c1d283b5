//! Batch transport over HTTP

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use url::Url;

use crate::config::EndpointConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::types::ApiRequest;

/// Posts the whole batch to a single endpoint as `{"requests": [...]}`
pub struct HttpBatchDispatcher {
    client: reqwest::Client,
    batch_url: Url,
    headers: HashMap<String, String>,
}

impl HttpBatchDispatcher {
    /// Create a new batch dispatcher
    pub fn new(client: reqwest::Client, endpoint: &EndpointConfig) -> Result<Self> {
        Ok(Self {
            client,
            batch_url: Url::parse(&endpoint.batch_url)?,
            headers: endpoint.headers.clone(),
        })
    }
}

#[async_trait]
impl Dispatcher for HttpBatchDispatcher {
    async fn dispatch(&self, batch: &[ApiRequest]) -> Result<Value> {
        let payload = json!({ "requests": batch });

        let mut request = self.client.post(self.batch_url.clone()).json(&payload);
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        // Non-2xx from the batch endpoint itself is a transport-level
        // failure for the whole batch, not a per-item outcome.
        let response = request.send().await?.error_for_status()?;
        let raw = response.json::<Value>().await?;
        Ok(raw)
    }

    fn name(&self) -> &'static str {
        "http-batch"
    }
}
