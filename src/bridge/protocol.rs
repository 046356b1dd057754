//! JSON-line frames exchanged with the host.
//!
//! The host writes one request object per line on stdin:
//! `{"id": 7, "method": "update_settings", "params": {"max_latency": 120}}`.
//! Each request gets exactly one response line on stdout carrying the same
//! `id` and either `result` or `error`. Supervisor events are interleaved
//! on stdout as `{"event": "ping_result", "data": {...}}`.

use crate::supervisor::SettingsUpdate;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced to the host in a response's `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("invalid params for '{method}': {message}")]
    InvalidParams { method: String, message: String },

    #[error("failed to encode result: {0}")]
    Encode(String),
}

/// A decoded control request.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    GetSettings,
    UpdateSettings(SettingsUpdate),
    GetStatus,
    StartMonitoring,
    StopMonitoring,
    /// Run the unload hook and end the session
    Unload,
    /// Run the uninstall hook and end the session
    Uninstall,
}

impl ControlRequest {
    /// Build a request from its method name and params.
    pub fn from_parts(method: &str, params: Value) -> Result<Self, ControlError> {
        match method {
            "get_settings" => Ok(ControlRequest::GetSettings),
            "update_settings" => {
                if params.is_null() {
                    return Err(ControlError::InvalidParams {
                        method: method.to_string(),
                        message: "missing params".to_string(),
                    });
                }
                serde_json::from_value(params)
                    .map(ControlRequest::UpdateSettings)
                    .map_err(|e| ControlError::InvalidParams {
                        method: method.to_string(),
                        message: e.to_string(),
                    })
            }
            "get_status" => Ok(ControlRequest::GetStatus),
            "start_monitoring" => Ok(ControlRequest::StartMonitoring),
            "stop_monitoring" => Ok(ControlRequest::StopMonitoring),
            "unload" => Ok(ControlRequest::Unload),
            "uninstall" => Ok(ControlRequest::Uninstall),
            other => Err(ControlError::UnknownMethod(other.to_string())),
        }
    }
}

/// Decode one request line.
///
/// The `id` is returned even when the request itself is invalid so the
/// error response can still be correlated; it is `null` when the line is not
/// a JSON object.
pub fn decode_request(line: &str) -> (Value, Result<ControlRequest, ControlError>) {
    let mut frame: Value = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(e) => return (Value::Null, Err(ControlError::InvalidRequest(e.to_string()))),
    };
    let Some(object) = frame.as_object_mut() else {
        return (
            Value::Null,
            Err(ControlError::InvalidRequest("expected a JSON object".to_string())),
        );
    };

    let id = object.remove("id").unwrap_or(Value::Null);
    let params = object.remove("params").unwrap_or(Value::Null);
    let request = match object.get("method").and_then(Value::as_str) {
        Some(method) => ControlRequest::from_parts(method, params),
        None => Err(ControlError::InvalidRequest(
            "missing string field 'method'".to_string(),
        )),
    };
    (id, request)
}

/// Response to a single request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFrame {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseFrame {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: &ControlError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error.to_string()),
        }
    }
}
