use crate::host::error::{HostError, HostResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use url::Url;

/// Descriptor of a host-controlled tab, returned by `GM.openInTab`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: u64,
    pub index: usize,
    pub window_id: u64,
    pub active: bool,
    pub url: String,
    pub status: String,
}

/// Browser capabilities the bridge host relies on
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// Insert a stylesheet into a tab's document
    async fn inject_style(&self, tab_id: u64, css: &str) -> HostResult<()>;

    /// Open a new tab, focused unless `background`
    async fn open_tab(&self, opener: u64, url: &Url, background: bool) -> HostResult<TabInfo>;

    async fn close_tab(&self, tab_id: u64) -> HostResult<()>;

    async fn write_clipboard(&self, data: &str, mime_type: &str) -> HostResult<()>;
}

const HEADLESS_WINDOW: u64 = 1;

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u64,
    tabs: BTreeMap<u64, TabInfo>,
    styles: Vec<(u64, String)>,
    clipboard: Option<(String, String)>,
}

impl HeadlessState {
    fn insert(&mut self, url: &str, active: bool) -> TabInfo {
        self.next_id += 1;
        if active {
            for tab in self.tabs.values_mut() {
                tab.active = false;
            }
        }
        let tab = TabInfo {
            id: self.next_id,
            index: self.tabs.len(),
            window_id: HEADLESS_WINDOW,
            active,
            url: url.to_string(),
            status: "complete".to_string(),
        };
        self.tabs.insert(tab.id, tab.clone());
        tab
    }
}

/// In-memory browser: tabs, injected styles and the clipboard are only recorded
#[derive(Debug, Default)]
pub struct HeadlessBrowser {
    state: Mutex<HeadlessState>,
}

impl HeadlessBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the tab a script runs in
    pub async fn open_initial_tab(&self, url: &str) -> TabInfo {
        self.state.lock().await.insert(url, true)
    }

    pub async fn tabs(&self) -> Vec<TabInfo> {
        self.state.lock().await.tabs.values().cloned().collect()
    }

    pub async fn tab(&self, tab_id: u64) -> Option<TabInfo> {
        self.state.lock().await.tabs.get(&tab_id).cloned()
    }

    /// Stylesheets injected into a tab, in insertion order
    pub async fn styles(&self, tab_id: u64) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .styles
            .iter()
            .filter(|(id, _)| *id == tab_id)
            .map(|(_, css)| css.clone())
            .collect()
    }

    /// Last clipboard write as `(data, mime_type)`
    pub async fn clipboard(&self) -> Option<(String, String)> {
        self.state.lock().await.clipboard.clone()
    }
}

#[async_trait]
impl BrowserHost for HeadlessBrowser {
    async fn inject_style(&self, tab_id: u64, css: &str) -> HostResult<()> {
        let mut state = self.state.lock().await;
        if !state.tabs.contains_key(&tab_id) {
            return Err(HostError::TabNotFound(tab_id));
        }
        state.styles.push((tab_id, css.to_string()));
        Ok(())
    }

    async fn open_tab(&self, opener: u64, url: &Url, background: bool) -> HostResult<TabInfo> {
        let mut state = self.state.lock().await;
        let tab = state.insert(url.as_str(), !background);
        tracing::debug!(opener, tab = tab.id, "Opened tab {}", url);
        Ok(tab)
    }

    async fn close_tab(&self, tab_id: u64) -> HostResult<()> {
        let mut state = self.state.lock().await;
        if state.tabs.remove(&tab_id).is_none() {
            return Err(HostError::TabNotFound(tab_id));
        }
        // Keep indexes contiguous
        for (index, tab) in state.tabs.values_mut().enumerate() {
            tab.index = index;
        }
        Ok(())
    }

    async fn write_clipboard(&self, data: &str, mime_type: &str) -> HostResult<()> {
        self.state.lock().await.clipboard = Some((data.to_string(), mime_type.to_string()));
        Ok(())
    }
}
