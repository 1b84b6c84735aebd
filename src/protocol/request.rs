//! Action request and response message types.
//!
//! Defines the frames exchanged for a single action call:
//! an [`ActionRequest`] goes out, an [`ActionResponse`] with the same
//! `echo` comes back.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::Echo;

// ============================================================================
// ActionRequest
// ============================================================================

/// An action request from client to gateway.
///
/// # Format
///
/// ```json
/// {
///   "action": "send_group_msg",
///   "params": { ... },
///   "echo": "uuid"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ActionRequest {
    /// Action name. Never contains `/`.
    pub action: String,

    /// Action parameters (always a JSON object).
    pub params: Value,

    /// Correlation token echoed back in the response.
    pub echo: Echo,
}

impl ActionRequest {
    /// Creates a new request with auto-generated echo.
    ///
    /// Any `/` in `action` is stripped, so `"/get_msg"` and `"get_msg"`
    /// address the same action. `Null` params become `{}`.
    #[must_use]
    pub fn new(action: &str, params: Value) -> Self {
        Self::with_echo(Echo::generate(), action, params)
    }

    /// Creates a new request with a specific echo.
    #[must_use]
    pub fn with_echo(echo: Echo, action: &str, params: Value) -> Self {
        let params = match params {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };

        Self {
            action: action.replace('/', ""),
            params,
            echo,
        }
    }

    /// Serializes the request into a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// ActionResponse
// ============================================================================

/// A response from gateway to client.
///
/// # Format
///
/// ```json
/// {
///   "status": "ok",
///   "retcode": 0,
///   "data": { ... },
///   "message": "",
///   "wording": "",
///   "echo": "uuid"
/// }
/// ```
///
/// Every field is optional on the wire; the shape of `data` depends on the
/// action.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ActionResponse {
    /// `"ok"`, `"async"` or `"failed"`.
    #[serde(default)]
    pub status: String,

    /// Gateway return code (0 on success).
    #[serde(default)]
    pub retcode: i64,

    /// Action-specific payload.
    #[serde(default)]
    pub data: Value,

    /// Error message (if failed).
    #[serde(default)]
    pub message: String,

    /// Human-readable error message (if failed).
    #[serde(default)]
    pub wording: String,

    /// Correlation token of the originating request.
    #[serde(default)]
    pub echo: Option<Echo>,
}

impl ActionResponse {
    /// Returns `true` if the gateway reported `status: "ok"`.
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Extracts the data payload, turning a non-ok response into an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFailed`] naming `action` if the status is not `ok`.
    pub fn into_data(self, action: &str) -> Result<Value> {
        if self.is_ok() {
            return Ok(self.data);
        }

        let message = [self.wording, self.message]
            .into_iter()
            .find(|m| !m.is_empty())
            .unwrap_or(self.status);

        Err(Error::action_failed(action, self.retcode, message))
    }

    /// Gets a string value from the data object.
    ///
    /// Returns empty string if key not found or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// Gets an integer value from the data object.
    ///
    /// Numeric strings are accepted since the gateway is not consistent
    /// about id encoding.
    #[inline]
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(value_as_i64)
    }
}

/// Reads an id that may be encoded as a number or a numeric string.
pub(crate) fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
