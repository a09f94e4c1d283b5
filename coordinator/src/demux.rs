//! Response demultiplexing
//!
//! Batch endpoints have been observed returning results in several different
//! nestings. The demultiplexer inspects the raw response with an ordered list
//! of pure structural detectors, applies the first that matches, and
//! normalizes every element to a per-request envelope. The detector list is
//! the only variability point; nothing here is keyed to a server version.

use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{CoordinatorError, Result};
use crate::types::{ApiRequest, BatchResponseEnvelope};

/// Extraction result of a structural detector
enum Extracted {
    /// A list of response elements carrying their own ids
    List(Vec<Value>),

    /// An object mapping request ids to response elements
    Keyed(Map<String, Value>),
}

type DetectorFn = fn(&Value) -> Option<Extracted>;

/// A named structural check against the raw response
struct ShapeDetector {
    name: &'static str,
    detect: DetectorFn,
}

fn detect_top_level_array(raw: &Value) -> Option<Extracted> {
    raw.as_array().map(|items| Extracted::List(items.clone()))
}

fn detect_responses_property(raw: &Value) -> Option<Extracted> {
    raw.get("responses")?
        .as_array()
        .map(|items| Extracted::List(items.clone()))
}

fn detect_data_array(raw: &Value) -> Option<Extracted> {
    raw.get("data")?
        .as_array()
        .map(|items| Extracted::List(items.clone()))
}

fn detect_data_responses(raw: &Value) -> Option<Extracted> {
    raw.get("data")?
        .get("responses")?
        .as_array()
        .map(|items| Extracted::List(items.clone()))
}

fn detect_id_keyed_object(raw: &Value) -> Option<Extracted> {
    let map = raw.as_object()?;
    // Every value must itself be an object for the map to read as id-keyed;
    // a flat error object ({"status": "error", ...}) must not match.
    if map.values().all(|value| value.is_object()) {
        Some(Extracted::Keyed(map.clone()))
    } else {
        None
    }
}

/// Splits raw batch responses into per-request envelopes
pub struct ResponseDemultiplexer {
    detectors: Vec<ShapeDetector>,
}

impl ResponseDemultiplexer {
    /// Create a demultiplexer with the reference detector order
    pub fn new() -> Self {
        Self {
            detectors: vec![
                ShapeDetector {
                    name: "top-level-array",
                    detect: detect_top_level_array,
                },
                ShapeDetector {
                    name: "responses-property",
                    detect: detect_responses_property,
                },
                ShapeDetector {
                    name: "data-array",
                    detect: detect_data_array,
                },
                ShapeDetector {
                    name: "data-responses",
                    detect: detect_data_responses,
                },
                ShapeDetector {
                    name: "id-keyed-object",
                    detect: detect_id_keyed_object,
                },
            ],
        }
    }

    /// Match the raw response against the detector list and normalize every
    /// element to an envelope. Elements whose id matches no dispatched
    /// request are logged and dropped; deciding what to do about requests
    /// with no matching element is left to the caller.
    pub fn demux(
        &self,
        raw: &Value,
        requests: &[ApiRequest],
    ) -> Result<Vec<BatchResponseEnvelope>> {
        let known_ids: HashSet<&str> = requests.iter().map(|r| r.id.as_str()).collect();

        let mut checked = Vec::with_capacity(self.detectors.len());
        for detector in &self.detectors {
            match (detector.detect)(raw) {
                Some(extracted) => {
                    debug!(shape = detector.name, "Matched batch response shape");
                    return Ok(self.normalize(extracted, &known_ids));
                }
                None => checked.push(detector.name),
            }
        }

        Err(CoordinatorError::UnrecognizedShape {
            checked: checked.join(", "),
            snippet: snippet(raw),
        })
    }

    fn normalize(
        &self,
        extracted: Extracted,
        known_ids: &HashSet<&str>,
    ) -> Vec<BatchResponseEnvelope> {
        let mut envelopes = Vec::new();

        match extracted {
            Extracted::List(items) => {
                for item in items {
                    match normalize_element(&item, None) {
                        Some(envelope) if known_ids.contains(envelope.id.as_str()) => {
                            envelopes.push(envelope)
                        }
                        Some(envelope) => {
                            warn!(id = envelope.id.as_str(), "Dropping unmatched response id")
                        }
                        None => warn!(element = %snippet(&item), "Dropping element without id"),
                    }
                }
            }
            Extracted::Keyed(map) => {
                for (id, item) in map {
                    if !known_ids.contains(id.as_str()) {
                        warn!(id = id.as_str(), "Dropping unmatched response id");
                        continue;
                    }
                    if let Some(envelope) = normalize_element(&item, Some(&id)) {
                        envelopes.push(envelope);
                    }
                }
            }
        }

        envelopes
    }
}

impl Default for ResponseDemultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize one response element to `{id, status, data, error}`.
///
/// `key_id` carries the id for id-keyed shapes and wins over any embedded id.
/// Status is taken from an explicit `status` field, then from a boolean
/// `success` flag, and defaults to 200 for bare payloads.
fn normalize_element(item: &Value, key_id: Option<&str>) -> Option<BatchResponseEnvelope> {
    let obj = item.as_object()?;

    let id = match key_id {
        Some(id) => id.to_string(),
        None => match obj.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return None,
        },
    };

    // Bare payload under an id key: the element is the data itself
    let is_envelope = obj.contains_key("status")
        || obj.contains_key("success")
        || obj.contains_key("data")
        || obj.contains_key("error");
    if key_id.is_some() && !is_envelope {
        return Some(BatchResponseEnvelope {
            id,
            status: 200,
            data: Some(item.clone()),
            error: None,
        });
    }

    let status = match obj.get("status").and_then(Value::as_u64) {
        Some(status) => status as u16,
        None => match obj.get("success").and_then(Value::as_bool) {
            Some(true) => 200,
            Some(false) => 500,
            // No status and no flag: an error message alone means failure
            None => {
                if obj.get("error").map_or(false, |e| !e.is_null()) {
                    500
                } else {
                    200
                }
            }
        },
    };

    let error = obj
        .get("error")
        .or_else(|| obj.get("message"))
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    Some(BatchResponseEnvelope {
        id,
        status,
        data: obj.get("data").cloned(),
        error,
    })
}

/// Truncated rendering of a value for diagnostics
fn snippet(value: &Value) -> String {
    let mut rendered = value.to_string();
    if rendered.len() > 256 {
        rendered.truncate(256);
        rendered.push_str("...");
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiRequest;
    use serde_json::json;

    fn requests(ids: &[&str]) -> Vec<ApiRequest> {
        ids.iter()
            .map(|id| ApiRequest::get("/api/test").with_id(*id))
            .collect()
    }

    fn elements() -> Vec<Value> {
        vec![
            json!({"id": "r1", "status": 200, "data": {"n": 1}}),
            json!({"id": "r2", "status": 404, "error": "not found"}),
        ]
    }

    fn expected() -> Vec<BatchResponseEnvelope> {
        vec![
            BatchResponseEnvelope::success("r1", 200, Some(json!({"n": 1}))),
            BatchResponseEnvelope::failure("r2", 404, "not found"),
        ]
    }

    fn sorted(mut envelopes: Vec<BatchResponseEnvelope>) -> Vec<BatchResponseEnvelope> {
        envelopes.sort_by(|a, b| a.id.cmp(&b.id));
        envelopes
    }

    #[test]
    fn test_all_shapes_normalize_identically() {
        let demux = ResponseDemultiplexer::new();
        let requests = requests(&["r1", "r2"]);

        let shapes = vec![
            json!(elements()),
            json!({"responses": elements()}),
            json!({"data": elements()}),
            json!({"data": {"responses": elements()}}),
            json!({
                "r1": {"status": 200, "data": {"n": 1}},
                "r2": {"status": 404, "error": "not found"},
            }),
        ];

        for shape in shapes {
            let envelopes = sorted(demux.demux(&shape, &requests).unwrap());
            assert_eq!(envelopes, expected(), "shape: {}", shape);
        }
    }

    #[test]
    fn test_unmatched_elements_dropped() {
        let demux = ResponseDemultiplexer::new();
        let requests = requests(&["r1"]);

        let raw = json!([
            {"id": "r1", "status": 200, "data": 1},
            {"id": "stranger", "status": 200, "data": 2},
        ]);

        let envelopes = demux.demux(&raw, &requests).unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].id, "r1");
    }

    #[test]
    fn test_success_flag_fallback() {
        let demux = ResponseDemultiplexer::new();
        let requests = requests(&["r1", "r2"]);

        let raw = json!([
            {"id": "r1", "success": true, "data": 1},
            {"id": "r2", "success": false, "message": "exploded"},
        ]);

        let envelopes = sorted(demux.demux(&raw, &requests).unwrap());
        assert!(envelopes[0].is_success());
        assert!(!envelopes[1].is_success());
        assert_eq!(envelopes[1].error.as_deref(), Some("exploded"));
    }

    #[test]
    fn test_numeric_ids_normalized() {
        let demux = ResponseDemultiplexer::new();
        let requests = requests(&["7"]);

        let raw = json!([{"id": 7, "status": 200, "data": "ok"}]);
        let envelopes = demux.demux(&raw, &requests).unwrap();
        assert_eq!(envelopes[0].id, "7");
    }

    #[test]
    fn test_bare_payload_under_id_key() {
        let demux = ResponseDemultiplexer::new();
        let requests = requests(&["r1"]);

        let raw = json!({"r1": {"name": "session", "count": 3}});
        let envelopes = demux.demux(&raw, &requests).unwrap();
        assert_eq!(envelopes[0].status, 200);
        assert_eq!(
            envelopes[0].data,
            Some(json!({"name": "session", "count": 3}))
        );
    }

    #[test]
    fn test_unrecognized_shape_lists_checks() {
        let demux = ResponseDemultiplexer::new();
        let requests = requests(&["r1"]);

        let raw = json!({"status": "error", "reason": "maintenance"});
        let err = demux.demux(&raw, &requests).unwrap_err();
        match err {
            CoordinatorError::UnrecognizedShape { checked, snippet } => {
                assert!(checked.contains("top-level-array"));
                assert!(checked.contains("id-keyed-object"));
                assert!(snippet.contains("maintenance"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_shape_priority_prefers_responses_over_id_keyed() {
        let demux = ResponseDemultiplexer::new();
        let requests = requests(&["r1"]);

        // An object carrying a `responses` array must be read as shape 2,
        // not as an id-keyed map with a "responses" entry.
        let raw = json!({"responses": [{"id": "r1", "status": 200, "data": 5}]});
        let envelopes = demux.demux(&raw, &requests).unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].data, Some(json!(5)));
    }
}
