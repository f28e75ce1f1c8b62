//! Script-facing `GM.*` API over a bridge client
//!
//! Every method sends one call and settles on its response. `info` is fetched
//! once when connecting and served locally afterwards.

pub mod xhr;

pub use xhr::{XhrAbortHandle, XhrCallbacks, XhrRequest};

use crate::bridge::{BridgeClient, BridgeError, BridgeResult};
use crate::host::TabInfo;
use crate::script::GmInfo;
use crate::xhr::XhrDetails;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Result of `GM.getValue`: a stored value (possibly `null`) or none
#[derive(Debug, Clone, PartialEq)]
pub enum GmValue {
    Present(Value),
    Absent,
}

impl GmValue {
    pub fn into_option(self) -> Option<Value> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl From<Option<Value>> for GmValue {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::Absent, Self::Present)
    }
}

/// The `GM` object of one script
#[derive(Debug, Clone)]
pub struct Gm {
    client: BridgeClient,
    info: GmInfo,
}

impl Gm {
    /// Wrap a connected client, fetching `GM.info`
    pub async fn connect(client: BridgeClient) -> BridgeResult<Self> {
        let info: GmInfo = decode(client.call("info", Value::Null).await?)?;
        tracing::debug!("Connected as {}", info.script.storage_namespace());
        Ok(Self { client, info })
    }

    pub fn info(&self) -> &GmInfo {
        &self.info
    }

    pub fn client(&self) -> &BridgeClient {
        &self.client
    }

    pub async fn add_style(&self, css: &str) -> BridgeResult<()> {
        self.client.call("addStyle", json!({ "css": css })).await?;
        Ok(())
    }

    pub async fn set_value(&self, key: &str, value: impl Serialize) -> BridgeResult<()> {
        let value = serde_json::to_value(value)?;
        self.client
            .call("setValue", json!({ "key": key, "value": value }))
            .await?;
        Ok(())
    }

    pub async fn get_value(&self, key: &str) -> BridgeResult<GmValue> {
        let value = self.client.call("getValue", json!({ "key": key })).await?;
        Ok(GmValue::from(value))
    }

    /// Stored value, or `default` when the key was never set
    pub async fn get_value_or(&self, key: &str, default: impl Serialize) -> BridgeResult<Value> {
        let default = serde_json::to_value(default)?;
        let value = self
            .client
            .call("getValue", json!({ "key": key, "default": default }))
            .await?;
        Ok(value.unwrap_or(Value::Null))
    }

    pub async fn delete_value(&self, key: &str) -> BridgeResult<()> {
        self.client.call("deleteValue", json!({ "key": key })).await?;
        Ok(())
    }

    pub async fn list_values(&self) -> BridgeResult<Vec<String>> {
        decode(self.client.call("listValues", Value::Null).await?)
    }

    #[deprecated(note = "tab objects are kept for old scripts only")]
    pub async fn get_tab(&self) -> BridgeResult<Value> {
        Ok(self
            .client
            .call("getTab", Value::Null)
            .await?
            .unwrap_or(Value::Null))
    }

    #[deprecated(note = "tab objects are kept for old scripts only")]
    pub async fn save_tab(&self, tab: impl Serialize) -> BridgeResult<()> {
        let tab = serde_json::to_value(tab)?;
        self.client.call("saveTab", json!({ "tab": tab })).await?;
        Ok(())
    }

    pub async fn open_in_tab(&self, url: &str, background: bool) -> BridgeResult<TabInfo> {
        decode(
            self.client
                .call("openInTab", json!({ "url": url, "background": background }))
                .await?,
        )
    }

    /// Close `tab_id`, or the tab this script runs in
    pub async fn close_tab(&self, tab_id: Option<u64>) -> BridgeResult<()> {
        self.client.call("closeTab", json!({ "tabId": tab_id })).await?;
        Ok(())
    }

    #[deprecated(note = "use the async clipboard API of the page")]
    pub async fn set_clipboard(&self, data: &str, mime_type: Option<&str>) -> BridgeResult<bool> {
        let args = json!({ "data": data, "type": mime_type.unwrap_or("text/plain") });
        decode(self.client.call("setClipboard", args).await?)
    }

    /// `GM.xmlHttpRequest`: awaitable and abortable
    pub fn xml_http_request(
        &self,
        details: &XhrDetails,
        callbacks: XhrCallbacks,
    ) -> BridgeResult<XhrRequest> {
        xhr::start(&self.client, serde_json::to_value(details)?, callbacks)
    }

    /// `GM_xmlhttpRequest`: only the abort handle is returned; results arrive through the hooks
    pub fn gm_xmlhttp_request(
        &self,
        details: &XhrDetails,
        callbacks: XhrCallbacks,
    ) -> BridgeResult<XhrAbortHandle> {
        let request = self.xml_http_request(details, callbacks)?;
        Ok(request.abort_handle())
    }
}

fn decode<T: DeserializeOwned>(value: Option<Value>) -> BridgeResult<T> {
    let value = value.ok_or_else(|| BridgeError::Rejected("Missing result value".to_string()))?;
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gm_value_from_option() {
        assert_eq!(GmValue::from(None), GmValue::Absent);
        assert_eq!(GmValue::from(Some(Value::Null)), GmValue::Present(Value::Null));
        assert!(GmValue::Absent.is_absent());
        assert_eq!(GmValue::Present(json!(1)).into_option(), Some(json!(1)));
    }
}
