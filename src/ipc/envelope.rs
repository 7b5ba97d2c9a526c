use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runner::{MAX_ERROR_CHARS, truncate_message};

/// Uniform wrapper for every request/response result.
///
/// Serialized as `{"success": true, "data": ...}` or
/// `{"success": false, "error": "..."}`. Build through the constructors so
/// `data` and `error` never appear together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    /// Failure envelope. Messages are bounded like runner errors.
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(truncate_message(&message.into(), MAX_ERROR_CHARS)),
        }
    }

    pub fn into_result(self) -> Result<Option<T>, String> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self.error.unwrap_or_default())
        }
    }
}

impl<T, E: Display> From<Result<T, E>> for Envelope<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Envelope::ok(data),
            Err(e) => Envelope::err(e.to_string()),
        }
    }
}

impl Envelope<Value> {
    /// Serialize a typed result into a JSON envelope.
    pub fn from_serialize<T: Serialize, E: Display>(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => match serde_json::to_value(data) {
                Ok(value) => Envelope::ok(value),
                Err(e) => Envelope::err(format!("Failed to encode response: {}", e)),
            },
            Err(e) => Envelope::err(e.to_string()),
        }
    }

    /// Decode `data` into a concrete type.
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> Result<Option<T>, String> {
        match self.into_result()? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| format!("Unexpected response shape: {}", e)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shapes() {
        assert_eq!(
            serde_json::to_value(Envelope::ok(json!({"exists": true}))).unwrap(),
            json!({"success": true, "data": {"exists": true}})
        );
        assert_eq!(
            serde_json::to_value(Envelope::<Value>::ok_empty()).unwrap(),
            json!({"success": true})
        );
        assert_eq!(
            serde_json::to_value(Envelope::<Value>::err("nope")).unwrap(),
            json!({"success": false, "error": "nope"})
        );
    }

    #[test]
    fn test_null_data_is_kept() {
        let envelope = Envelope::from_serialize(Ok::<Option<String>, String>(None));
        assert_eq!(
            serde_json::to_value(envelope).unwrap(),
            json!({"success": true, "data": null})
        );
    }

    #[test]
    fn test_from_result() {
        let ok: Envelope<u32> = Ok::<u32, String>(3).into();
        assert_eq!(ok.into_result(), Ok(Some(3)));

        let err: Envelope<u32> = Err::<u32, _>("bad input").into();
        assert!(!err.success);
        assert_eq!(err.into_result(), Err("bad input".to_string()));
    }

    #[test]
    fn test_error_message_is_bounded() {
        let envelope = Envelope::<Value>::err("x".repeat(2_000));
        assert_eq!(envelope.error.unwrap().chars().count(), MAX_ERROR_CHARS);
    }

    #[test]
    fn test_decode_typed_data() {
        let envelope = Envelope::ok(json!(true));
        assert_eq!(envelope.decode::<bool>(), Ok(Some(true)));

        let envelope = Envelope::ok(json!("text"));
        assert!(envelope.decode::<bool>().is_err());
    }
}
