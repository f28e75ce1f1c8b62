//! Namespaced key-value store backing `GM.setValue` and friends.
//!
//! Every operation is atomic for its single key; there are no cross-key
//! transactions. With persistence enabled each namespace is kept in
//! `<data_dir>/<encoded namespace>.json` and rewritten after every change.

use crate::host::error::{HostError, HostResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub type Namespace = BTreeMap<String, Value>;

#[derive(Debug, Default)]
pub struct ValueStore {
    namespaces: RwLock<HashMap<String, Namespace>>,
    data_dir: Option<PathBuf>,
}

impl ValueStore {
    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store persisted under `data_dir`; namespaces are loaded on first use
    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            data_dir: Some(data_dir.into()),
        }
    }

    /// Stored value, or `None` if the key was never set (or was deleted)
    pub async fn get(&self, namespace: &str, key: &str) -> HostResult<Option<Value>> {
        {
            let namespaces = self.namespaces.read().await;
            if let Some(values) = namespaces.get(namespace) {
                return Ok(values.get(key).cloned());
            }
        }
        let mut namespaces = self.namespaces.write().await;
        let values = self.load(&mut namespaces, namespace).await?;
        Ok(values.get(key).cloned())
    }

    /// Overwrite a key
    pub async fn set(&self, namespace: &str, key: &str, value: Value) -> HostResult<()> {
        let mut namespaces = self.namespaces.write().await;
        let values = self.load(&mut namespaces, namespace).await?;
        let previous = values.insert(key.to_string(), value);
        if let Err(e) = self.flush(namespace, values).await {
            // Not persisted, so not visible either
            match previous {
                Some(previous) => values.insert(key.to_string(), previous),
                None => values.remove(key),
            };
            return Err(e);
        }
        tracing::trace!(namespace, key, "value set");
        Ok(())
    }

    /// Remove a key. Returns whether it existed.
    pub async fn delete(&self, namespace: &str, key: &str) -> HostResult<bool> {
        let mut namespaces = self.namespaces.write().await;
        let values = self.load(&mut namespaces, namespace).await?;
        let Some(previous) = values.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(namespace, values).await {
            values.insert(key.to_string(), previous);
            return Err(e);
        }
        tracing::trace!(namespace, key, "value deleted");
        Ok(true)
    }

    /// Keys of a namespace, sorted
    pub async fn list(&self, namespace: &str) -> HostResult<Vec<String>> {
        Ok(self.snapshot(namespace).await?.into_keys().collect())
    }

    /// Copy of every entry in a namespace
    pub async fn snapshot(&self, namespace: &str) -> HostResult<Namespace> {
        let mut namespaces = self.namespaces.write().await;
        Ok(self.load(&mut namespaces, namespace).await?.clone())
    }

    async fn load<'a>(
        &self,
        namespaces: &'a mut HashMap<String, Namespace>,
        namespace: &str,
    ) -> HostResult<&'a mut Namespace> {
        if !namespaces.contains_key(namespace) {
            let values = match &self.data_dir {
                Some(dir) => read_namespace(&namespace_path(dir, namespace), namespace).await?,
                None => Namespace::new(),
            };
            namespaces.insert(namespace.to_string(), values);
        }
        namespaces
            .get_mut(namespace)
            .ok_or_else(|| HostError::storage(namespace, "namespace not loaded"))
    }

    async fn flush(&self, namespace: &str, values: &Namespace) -> HostResult<()> {
        let Some(dir) = &self.data_dir else {
            return Ok(());
        };
        let path = namespace_path(dir, namespace);
        let content =
            serde_json::to_vec_pretty(values).map_err(|e| HostError::storage(namespace, e))?;

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| HostError::storage(namespace, e))?;

        // Atomic write using temp file + rename
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| HostError::storage(namespace, e))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| HostError::storage(namespace, e))?;

        tracing::debug!("Saved {} values for {} to {:?}", values.len(), namespace, path);
        Ok(())
    }
}

/// File holding one namespace. The namespace is form-encoded to keep it a single path segment.
pub fn namespace_path(data_dir: &Path, namespace: &str) -> PathBuf {
    let encoded: String = url::form_urlencoded::byte_serialize(namespace.as_bytes()).collect();
    data_dir.join(format!("{}.json", encoded))
}

async fn read_namespace(path: &Path, namespace: &str) -> HostResult<Namespace> {
    match tokio::fs::read(path).await {
        Ok(content) => {
            let values: Namespace =
                serde_json::from_slice(&content).map_err(|e| HostError::storage(namespace, e))?;
            tracing::debug!("Loaded {} values for {} from {:?}", values.len(), namespace, path);
            Ok(values)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Namespace::new()),
        Err(e) => Err(HostError::storage(namespace, e)),
    }
}
