//! Canonical response envelope and handler-return normalization.
//!
//! Every response leaving the server, success or failure, is the same JSON
//! shape: `{"status": ..., "code": ..., "data": ..., "message": ...}`.
//! Handlers return an [`Outcome`]; [`normalize`] folds it into an
//! [`Envelope`], and error paths build failure envelopes directly from an
//! [`ApiError`](crate::error::ApiError).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

/// Envelope status discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

/// The canonical wire envelope.
///
/// `data` and `message` serialize as explicit `null` when absent so the wire
/// shape is stable across all responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: Status,
    pub code: u16,
    pub data: Option<Value>,
    pub message: Option<String>,
}

impl Envelope {
    /// A success envelope with the given code and no payload.
    pub fn success(code: u16) -> Self {
        Self { status: Status::Success, code, data: None, message: None }
    }

    /// A failure envelope with the given code and no payload.
    pub fn failure(code: u16) -> Self {
        Self { status: Status::Failure, code, data: None, message: None }
    }

    /// Attach a data payload.
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Attach a human-readable message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Serialize to wire bytes. The envelope is plain data, so this cannot
    /// fail for any value constructed through the public API.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| {
            br#"{"status":"failure","code":500,"data":"Serialization error","message":null}"#
                .to_vec()
        })
    }
}

impl From<&ApiError> for Envelope {
    /// Failure envelopes carry the error detail in the data field; the
    /// message field stays null.
    fn from(err: &ApiError) -> Self {
        Envelope::failure(err.code).with_data(Value::String(err.detail.clone()))
    }
}

/// Capability for values that project themselves onto a JSON value.
///
/// The normalizer dispatches on this explicitly instead of probing for
/// serializability, so domain types opt in by implementing one method.
pub trait ToJson {
    fn to_json(&self) -> Value;
}

/// What a handler hands back to the dispatch loop before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Pass through unchanged.
    Envelope(Envelope),
    /// Any JSON value; becomes success data with code 200.
    Json(Value),
    /// A plain string; becomes a success message (not data) with code 200.
    Text(String),
}

impl Outcome {
    /// Build an outcome from a value with a JSON projection.
    pub fn projected<T: ToJson>(value: &T) -> Self {
        Outcome::Json(value.to_json())
    }
}

impl From<Envelope> for Outcome {
    fn from(e: Envelope) -> Self {
        Outcome::Envelope(e)
    }
}

impl From<Value> for Outcome {
    fn from(v: Value) -> Self {
        Outcome::Json(v)
    }
}

impl From<String> for Outcome {
    fn from(s: String) -> Self {
        Outcome::Text(s)
    }
}

impl From<&str> for Outcome {
    fn from(s: &str) -> Self {
        Outcome::Text(s.to_string())
    }
}

/// Fold a handler outcome into the canonical envelope.
pub fn normalize(outcome: Outcome) -> Envelope {
    match outcome {
        Outcome::Envelope(envelope) => envelope,
        Outcome::Json(value) => Envelope::success(200).with_data(value),
        Outcome::Text(text) => Envelope::success(200).with_message(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_round_trip() {
        let envelope = Envelope::success(200).with_data(json!({"a": 1}));
        let bytes = envelope.to_bytes();
        let parsed: Envelope = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(parsed.status, Status::Success);
        assert_eq!(parsed.code, 200);
        assert_eq!(parsed.data, Some(json!({"a": 1})));
        assert_eq!(parsed.message, None);
    }

    #[test]
    fn test_wire_shape_always_has_four_keys() {
        let bytes = Envelope::success(200).to_bytes();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.len(), 4);
        assert_eq!(obj["data"], Value::Null);
        assert_eq!(obj["message"], Value::Null);
    }

    #[test]
    fn test_normalize_json_value_becomes_data() {
        let envelope = normalize(Outcome::Json(json!([1, 2, 3])));
        assert_eq!(envelope.status, Status::Success);
        assert_eq!(envelope.code, 200);
        assert_eq!(envelope.data, Some(json!([1, 2, 3])));
        assert_eq!(envelope.message, None);
    }

    #[test]
    fn test_normalize_text_becomes_message() {
        let envelope = normalize(Outcome::from("hello"));
        assert_eq!(envelope.data, None);
        assert_eq!(envelope.message, Some("hello".to_string()));
    }

    #[test]
    fn test_normalize_envelope_passes_through() {
        let custom = Envelope::failure(418).with_message("teapot");
        let envelope = normalize(Outcome::Envelope(custom.clone()));
        assert_eq!(envelope, custom);
    }

    #[test]
    fn test_projection_used_as_data() {
        struct Widget {
            id: u32,
        }
        impl ToJson for Widget {
            fn to_json(&self) -> Value {
                json!({"id": self.id})
            }
        }

        let envelope = normalize(Outcome::projected(&Widget { id: 7 }));
        assert_eq!(envelope.data, Some(json!({"id": 7})));
    }

    #[test]
    fn test_failure_from_error_puts_detail_in_data() {
        let err = ApiError::no_route("GET", "/x");
        let envelope = Envelope::from(&err);
        assert_eq!(envelope.status, Status::Failure);
        assert_eq!(envelope.code, 404);
        assert_eq!(envelope.data, Some(json!("No route for GET /x")));
        assert_eq!(envelope.message, None);
    }
}
