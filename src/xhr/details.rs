use crate::xhr::error::{XhrError, XhrResult};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Requested decoding of the response body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// The empty string: same as `text`
    #[default]
    #[serde(rename = "")]
    Default,
    Text,
    Json,
    #[serde(rename = "arraybuffer")]
    ArrayBuffer,
    Blob,
    Document,
}

impl ResponseType {
    /// Text types populate `responseText`
    pub fn is_text(self) -> bool {
        matches!(self, Self::Default | Self::Text)
    }
}

/// Request body representations accepted on the wire
///
/// Plain strings are text. An object whose only key is `base64` carries raw
/// bytes (ArrayBuffer, Blob). Any other string map is sent as form fields, so
/// a form consisting of a single `base64` field has to be sent as an encoded
/// text body instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestBody {
    Text(String),
    Bytes(BinaryBody),
    Form(BTreeMap<String, String>),
}

/// Raw bytes, base64 encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinaryBody {
    pub base64: String,
}

impl RequestBody {
    pub fn bytes(base64: impl Into<String>) -> Self {
        Self::Bytes(BinaryBody {
            base64: base64.into(),
        })
    }
}

/// A request body ready to send, with the content type implied by its representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub bytes: Vec<u8>,
    pub content_type: Option<&'static str>,
}

impl RequestBody {
    /// Encode for sending. `binary` only affects text bodies.
    pub fn encode(&self, binary: bool) -> XhrResult<EncodedBody> {
        match self {
            Self::Text(text) => Ok(EncodedBody {
                bytes: text.as_bytes().to_vec(),
                content_type: Some(if binary {
                    "application/octet-stream"
                } else {
                    "text/plain;charset=UTF-8"
                }),
            }),
            Self::Bytes(BinaryBody { base64 }) => {
                let bytes = BASE64
                    .decode(base64)
                    .map_err(|e| XhrError::InvalidBody(e.to_string()))?;
                Ok(EncodedBody {
                    bytes,
                    content_type: None,
                })
            }
            Self::Form(fields) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter())
                    .finish();
                Ok(EncodedBody {
                    bytes: encoded.into_bytes(),
                    content_type: Some("application/x-www-form-urlencoded;charset=UTF-8"),
                })
            }
        }
    }
}

/// The `details` argument of `GM.xmlHttpRequest`
///
/// Lifecycle hooks are not part of the wire format; the client keeps them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XhrDetails {
    pub url: String,
    /// Defaults to `GET`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RequestBody>,
    /// Send a text `data` as raw bytes
    #[serde(default)]
    pub binary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub response_type: ResponseType,
    /// Milliseconds; `0` or absent means no timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl XhrDetails {
    /// GET request for `url` with default options
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}
