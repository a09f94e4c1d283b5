//! # Reqmux Coordinator
//!
//! Client-side request batch coordinator. Accepts many logical API requests,
//! groups them into bounded-size batches on a short timer, dispatches each
//! batch as one network call, demultiplexes the combined response back to the
//! individual callers, and serves repeated GET requests from a time-boxed
//! in-memory cache.

pub mod accumulator;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod demux;
pub mod dispatch;
pub mod error;
pub mod normalizer;
pub mod registry;
pub mod stats;
pub mod types;

pub use config::CoordinatorConfig;
pub use coordinator::BatchCoordinator;
pub use dispatch::Dispatcher;
pub use error::{CoordinatorError, Result};
pub use stats::CoordinatorStats;
pub use types::{ApiRequest, BatchResponseEnvelope};

/// Current version of the coordinator
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Coordinator identifier used in logs
pub const SYSTEM_NAME: &str = "reqmux-coordinator";

/// HTTP methods supported by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// Get the method name as a string
    pub fn name(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    /// Check if successful responses for this method may be cached
    pub fn is_cacheable(&self) -> bool {
        matches!(self, HttpMethod::Get)
    }

    /// Check if this method carries a request body
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            _ => Err(CoordinatorError::InvalidMethod(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("POST".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_method_properties() {
        assert!(HttpMethod::Get.is_cacheable());
        assert!(!HttpMethod::Post.is_cacheable());
        assert!(HttpMethod::Patch.has_body());
        assert!(!HttpMethod::Delete.has_body());
        assert_eq!(HttpMethod::Put.to_string(), "PUT");
    }
}
