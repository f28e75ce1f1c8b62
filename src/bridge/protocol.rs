//! Messages exchanged between a sandboxed script (client) and the bridge host.
//!
//! Wire format: each message is a single JSON object terminated by `\n`.

use crate::xhr::lifecycle::XhrEventKind;
use crate::xhr::response::XhrResponse;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Message sent from the client to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Invoke a privileged operation
    Call {
        id: u64,
        operation: String,
        #[serde(default)]
        args: Value,
    },

    /// Cancel an in-flight network operation
    Abort { id: u64 },
}

/// Message sent from the host to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostMessage {
    /// Terminal result of a call; exactly one per call id
    Response { id: u64, outcome: Outcome },

    /// Lifecycle notification of a network operation, sent before its response
    Event {
        id: u64,
        event: XhrEventKind,
        response: XhrResponse,
    },
}

/// Result carried by a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// A missing `value` means "no value"; `"value": null` is a stored null
    Success {
        #[serde(
            default,
            deserialize_with = "deserialize_present",
            skip_serializing_if = "Option::is_none"
        )]
        value: Option<Value>,
    },
    Failure { message: String },
}

impl Outcome {
    pub fn success(value: impl Into<Value>) -> Self {
        Self::Success {
            value: Some(value.into()),
        }
    }

    /// Success without a value
    pub fn empty() -> Self {
        Self::Success { value: None }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<Option<Value>> for Outcome {
    fn from(value: Option<Value>) -> Self {
        Self::Success { value }
    }
}

// Any value that is present, including null, is Some
pub(crate) fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Serialize one message as a JSON line
pub fn encode_line<T: Serialize>(message: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Write one message and flush
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = encode_line(message)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

/// Best-effort extraction of the call id from a line that failed to parse
pub fn salvage_id(line: &str) -> Option<u64> {
    serde_json::from_str::<Value>(line)
        .ok()?
        .get("id")?
        .as_u64()
}
