use crate::xhr::details::ResponseType;
use crate::xhr::lifecycle::Stage;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Snapshot of a network operation, passed to every hook and to the final result
///
/// Mirrors the `XMLHttpRequest` instance properties plus the progress counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XhrResponse {
    pub ready_state: u8,
    /// Decoded body; base64 text for `arraybuffer` and `blob`
    #[serde(default)]
    pub response: Value,
    /// `name: value` lines joined by CRLF
    #[serde(default)]
    pub response_headers: String,
    /// Only populated for text response types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(default)]
    pub response_type: ResponseType,
    #[serde(rename = "responseURL", default)]
    pub response_url: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub with_credentials: bool,
    #[serde(default)]
    pub loaded: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub length_computable: bool,
}

impl XhrResponse {
    /// Raw bytes of a binary (`arraybuffer` / `blob`) response
    pub fn bytes(&self) -> Option<Vec<u8>> {
        match self.response_type {
            ResponseType::ArrayBuffer | ResponseType::Blob => {
                BASE64.decode(self.response.as_str()?).ok()
            }
            _ => None,
        }
    }

    /// Deserialize the decoded body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.response.clone())
    }

    /// Reset to the network-error shape used by aborted, errored and timed-out requests
    pub(crate) fn clear_for_failure(&mut self) {
        self.status = 0;
        self.status_text.clear();
        self.response = Value::Null;
        self.response_text = None;
        self.response_headers.clear();
        self.response_url.clear();
    }
}

/// Final result of a network operation as carried by the terminal response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XhrOutcome {
    pub stage: Stage,
    pub response: XhrResponse,
    /// Failure description for `Errored`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Decode a body according to the requested response type.
///
/// Returns `(response, responseText)`.
pub fn decode_body(
    bytes: &[u8],
    response_type: ResponseType,
    override_mime_type: Option<&str>,
) -> (Value, Option<String>) {
    match response_type {
        ResponseType::Default | ResponseType::Text => {
            let text = decode_text(bytes, override_mime_type);
            (Value::String(text.clone()), Some(text))
        }
        // XHR yields null for unparsable JSON
        ResponseType::Json => (serde_json::from_slice(bytes).unwrap_or(Value::Null), None),
        ResponseType::ArrayBuffer | ResponseType::Blob => {
            (Value::String(BASE64.encode(bytes)), None)
        }
        ResponseType::Document => (Value::String(decode_text(bytes, override_mime_type)), None),
    }
}

fn decode_text(bytes: &[u8], override_mime_type: Option<&str>) -> String {
    let user_defined = override_mime_type
        .is_some_and(|m| m.to_ascii_lowercase().contains("charset=x-user-defined"));
    if user_defined {
        bytes.iter().map(|&b| x_user_defined(b)).collect()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// The `x-user-defined` encoding: ASCII as-is, high bytes to U+F780..U+F7FF
fn x_user_defined(byte: u8) -> char {
    if byte < 0x80 {
        byte as char
    } else {
        char::from_u32(0xF780 + u32::from(byte - 0x80)).unwrap_or(char::REPLACEMENT_CHARACTER)
    }
}

/// Format headers the way `getAllResponseHeaders()` does
pub fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| format!("{}: {}\r\n", name.as_str(), v))
        })
        .collect()
}
