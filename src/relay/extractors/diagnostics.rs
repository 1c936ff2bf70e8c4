// API status diagnostics
//
// The listing API wraps every payload in `{"code": <int>, "message": ..., "data": ...}`.
// A non-zero code means the request was refused; the codes below are the ones
// the crawler reacts to.

use serde_json::Value;
use tracing::warn;

use crate::relay::errors::RelayError;

/// Classification of the envelope `code`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    Ok,
    /// Referenced video no longer exists
    NotFound,
    /// Risk control; the body carries a second envelope
    RiskControl,
    /// -412 request blocked, -799 too frequent
    RateLimited,
    AccessDenied,
    Other(i64),
}

impl ApiStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Ok,
            -404 => Self::NotFound,
            -509 => Self::RiskControl,
            -412 | -799 => Self::RateLimited,
            -403 => Self::AccessDenied,
            other => Self::Other(other),
        }
    }

    /// Status of a decoded envelope; a missing code counts as OK
    pub fn of(payload: &Value) -> Self {
        Self::from_code(payload.get("code").and_then(Value::as_i64).unwrap_or(0))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn description(&self) -> String {
        match self {
            Self::Ok => "ok".to_string(),
            Self::NotFound => "resource not found (-404)".to_string(),
            Self::RiskControl => "risk control (-509)".to_string(),
            Self::RateLimited => "rate limited".to_string(),
            Self::AccessDenied => "access denied (-403)".to_string(),
            Self::Other(code) => format!("api code {}", code),
        }
    }
}

/// Decode a page body, recovering from the -509 double-envelope.
///
/// Under risk control the API prepends a `{"code":-509,...}` fragment to the
/// real payload; the body after the first `}` is the payload to use.
pub fn decode_payload(url: &str, body: &str) -> Result<Value, RelayError> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(value),
        Err(first) => {
            if body.contains("\"code\":-509,") {
                if let Some(end) = body.find('}') {
                    warn!(url, "recovering payload after -509 fragment");
                    return serde_json::from_str(&body[end + 1..])
                        .map_err(|e| RelayError::payload(url, e.to_string()));
                }
            }
            Err(RelayError::payload(url, first.to_string()))
        }
    }
}

/// Decode and require a zero envelope code
pub fn decode_ok_payload(url: &str, body: &str) -> Result<Value, RelayError> {
    let payload = decode_payload(url, body)?;
    let status = ApiStatus::of(&payload);
    if !status.is_ok() {
        let message = payload
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(RelayError::payload(
            url,
            format!("{} {}", status.description(), message).trim_end().to_string(),
        ));
    }
    Ok(payload)
}
