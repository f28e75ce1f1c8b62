//! Bridge host: performs the privileged side of every `GM.*` operation
//!
//! - storage: namespaced value store
//! - browser: tab, style and clipboard capabilities (`BrowserHost` trait)
//! - tabs: per-tab objects for `getTab` / `saveTab`
//! - error: Error types

pub mod browser;
pub mod error;
pub mod storage;
pub mod tabs;

pub use browser::{BrowserHost, HeadlessBrowser, TabInfo};
pub use error::{HostError, HostResult};
pub use storage::ValueStore;
pub use tabs::TabObjects;

use crate::app::config::Config;
use crate::script::{GmInfo, Userscript};
use crate::xhr::XhrEngine;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Identity of the script a session serves
#[derive(Debug, Clone)]
pub struct ScriptContext {
    pub info: GmInfo,
    /// Value store scope, `<@namespace>/<@name>`
    pub namespace: String,
    /// Tab the script runs in
    pub tab_id: u64,
}

impl ScriptContext {
    pub fn new(script: &Userscript, script_handler: &str, tab_id: u64) -> Self {
        Self {
            info: script.info(script_handler, env!("CARGO_PKG_VERSION")),
            namespace: script.meta.storage_namespace(),
            tab_id,
        }
    }
}

/// Shared state behind every session
pub struct BridgeHost {
    store: Arc<ValueStore>,
    browser: Arc<dyn BrowserHost>,
    tabs: TabObjects,
    xhr: XhrEngine,
    enforce_grants: bool,
}

impl BridgeHost {
    pub fn new(
        config: &Config,
        store: Arc<ValueStore>,
        browser: Arc<dyn BrowserHost>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            store,
            browser,
            tabs: TabObjects::new(),
            xhr: XhrEngine::new(&config.network)?,
            enforce_grants: config.bridge.enforce_grants,
        })
    }

    pub fn enforce_grants(&self) -> bool {
        self.enforce_grants
    }

    pub fn store(&self) -> &ValueStore {
        &self.store
    }

    pub fn xhr(&self) -> &XhrEngine {
        &self.xhr
    }

    pub fn info<'a>(&self, ctx: &'a ScriptContext) -> &'a GmInfo {
        &ctx.info
    }

    pub async fn add_style(&self, ctx: &ScriptContext, css: &str) -> HostResult<()> {
        self.browser.inject_style(ctx.tab_id, css).await
    }

    pub async fn set_value(&self, ctx: &ScriptContext, key: &str, value: Value) -> HostResult<()> {
        self.store.set(&ctx.namespace, key, value).await
    }

    /// Stored value, else `default`, else `None` (the absent marker)
    pub async fn get_value(
        &self,
        ctx: &ScriptContext,
        key: &str,
        default: Option<Value>,
    ) -> HostResult<Option<Value>> {
        Ok(self.store.get(&ctx.namespace, key).await?.or(default))
    }

    pub async fn delete_value(&self, ctx: &ScriptContext, key: &str) -> HostResult<()> {
        self.store.delete(&ctx.namespace, key).await?;
        Ok(())
    }

    pub async fn list_values(&self, ctx: &ScriptContext) -> HostResult<Vec<String>> {
        self.store.list(&ctx.namespace).await
    }

    pub async fn get_tab(&self, ctx: &ScriptContext) -> Value {
        self.tabs.get(ctx.tab_id).await
    }

    pub async fn save_tab(&self, ctx: &ScriptContext, tab: Value) {
        self.tabs.save(ctx.tab_id, tab).await
    }

    pub async fn open_in_tab(
        &self,
        ctx: &ScriptContext,
        url: &str,
        background: bool,
    ) -> HostResult<TabInfo> {
        let parsed = Url::parse(url).map_err(|e| HostError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let tab = self.browser.open_tab(ctx.tab_id, &parsed, background).await?;
        tracing::info!(tab = tab.id, background, "Opened {} for {}", url, ctx.namespace);
        Ok(tab)
    }

    /// Close `tab_id`, or the calling tab when `None`
    pub async fn close_tab(&self, ctx: &ScriptContext, tab_id: Option<u64>) -> HostResult<()> {
        let tab_id = tab_id.unwrap_or(ctx.tab_id);
        self.browser.close_tab(tab_id).await?;
        self.tabs.remove(tab_id).await;
        tracing::info!(tab = tab_id, "Closed tab");
        Ok(())
    }

    pub async fn set_clipboard(&self, data: &str, mime_type: &str) -> HostResult<bool> {
        self.browser.write_clipboard(data, mime_type).await?;
        Ok(true)
    }
}
