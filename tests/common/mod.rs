#![allow(dead_code)]

use gmbridge::app::config::Config;
use gmbridge::host::{BridgeHost, HeadlessBrowser, ScriptContext, ValueStore};
use gmbridge::script::Userscript;
use gmbridge::{Gm, bridge};
use std::path::Path;
use std::sync::Arc;

/// Every operation the bridge knows
pub const ALL_GRANTS: &[&str] = &[
    "GM.addStyle",
    "GM.setValue",
    "GM.getValue",
    "GM.deleteValue",
    "GM.listValues",
    "GM.getTab",
    "GM.saveTab",
    "GM.openInTab",
    "GM.closeTab",
    "GM.setClipboard",
    "GM.xmlHttpRequest",
];

// Initialize logging once for all tests
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Userscript source with the given name and grants
pub fn script_source(name: &str, grants: &[&str]) -> String {
    let mut source = String::from("// ==UserScript==\n");
    source.push_str(&format!("// @name        {}\n", name));
    source.push_str("// @namespace   tests\n");
    source.push_str("// @version     1.0\n");
    source.push_str("// @match       https://example.com/*\n");
    for grant in grants {
        source.push_str(&format!("// @grant       {}\n", grant));
    }
    source.push_str("// ==/UserScript==\n\nconsole.log('hello');\n");
    source
}

pub fn create_test_script(name: &str, grants: &[&str]) -> Userscript {
    Userscript::parse(&script_source(name, grants), "test.user.js").unwrap()
}

/// Config that keeps values in memory
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.storage.persist = false;
    config
}

/// A host with a headless browser and one open tab
pub struct TestHost {
    pub host: Arc<BridgeHost>,
    pub browser: Arc<HeadlessBrowser>,
    pub tab_id: u64,
}

pub async fn create_test_host(store: ValueStore) -> TestHost {
    let browser = Arc::new(HeadlessBrowser::new());
    let tab = browser.open_initial_tab("https://example.com/page").await;
    let host = BridgeHost::new(&create_test_config(), Arc::new(store), browser.clone()).unwrap();
    TestHost {
        host: Arc::new(host),
        browser,
        tab_id: tab.id,
    }
}

impl TestHost {
    pub fn context(&self, script: &Userscript) -> ScriptContext {
        ScriptContext::new(script, "gmbridge", self.tab_id)
    }

    /// Serve `script` in-process and connect its `GM` object
    pub async fn connect(&self, script: &Userscript) -> Gm {
        let client = bridge::connect(self.host.clone(), self.context(script));
        Gm::connect(client).await.unwrap()
    }
}

/// In-memory host plus a connected `GM` for a script with every grant
pub async fn connect_granted(name: &str) -> (TestHost, Gm) {
    let host = create_test_host(ValueStore::in_memory()).await;
    let gm = host.connect(&create_test_script(name, ALL_GRANTS)).await;
    (host, gm)
}

pub fn persistent_store(dir: &Path) -> ValueStore {
    ValueStore::persistent(dir)
}
