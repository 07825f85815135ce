//! Response envelope handling.
//!
//! Server responses may arrive wrapped one level deep as `{"ok": ...}`
//! or `{"err": "..."}`. Exactly one level is unwrapped before the
//! payload is interpreted; a bare payload is accepted as-is. Anything
//! that fails to decode is a protocol error, which callers in polling
//! loops treat as transient.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;

pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| ApiError::Protocol(format!("invalid json: {err}")))?;
    decode_value(value)
}

pub fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    if let Some(object) = value.as_object() {
        if let Some(err) = object.get("err") {
            let message = err
                .as_str()
                .unwrap_or("unspecified server error")
                .to_string();
            return Err(ApiError::Rejected(message));
        }
        if let Some(ok) = object.get("ok") {
            return serde_json::from_value(ok.clone())
                .map_err(|err| ApiError::Protocol(format!("payload shape: {err}")));
        }
    }

    serde_json::from_value(value).map_err(|err| ApiError::Protocol(format!("payload shape: {err}")))
}
