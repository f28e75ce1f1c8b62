use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Per-tab objects behind the deprecated `GM.getTab` / `GM.saveTab`
#[derive(Debug, Default)]
pub struct TabObjects {
    objects: RwLock<HashMap<u64, Value>>,
}

impl TabObjects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saved object for a tab, or an empty object
    pub async fn get(&self, tab_id: u64) -> Value {
        self.objects
            .read()
            .await
            .get(&tab_id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    pub async fn save(&self, tab_id: u64, object: Value) {
        self.objects.write().await.insert(tab_id, object);
    }

    /// Drop the object of a closed tab
    pub async fn remove(&self, tab_id: u64) {
        self.objects.write().await.remove(&tab_id);
    }
}
