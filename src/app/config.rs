use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete configuration (saved to config/settings.toml)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub bridge: BridgeConfig,
    pub storage: StorageConfig,
    pub network: NetworkConfig,
    pub scripts: ScriptConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Reported as `GM.info.scriptHandler`
    pub script_handler: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            script_handler: "gmbridge".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Reject operations the script did not `@grant`
    pub enforce_grants: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enforce_grants: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Write every namespace to `<data_dir>/<namespace>.json`
    pub persist: bool,
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persist: true,
            data_dir: PathBuf::from("values"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub user_agent: String,
    /// Seconds
    pub connect_timeout: u64,
    pub max_redirects: u32,
    pub max_response_bytes: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("gmbridge/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: 30,
            max_redirects: 10,
            max_response_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub directory: PathBuf,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("scripts"),
        }
    }
}

impl Config {
    /// Load settings.toml from the config directory, falling back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let config_path = crate::util::paths::get_app_config_path()?;
        let mut config = Self::load_from(&config_path)?;

        // Relative directories are relative to the config directory
        config.scripts.directory =
            crate::util::paths::resolve_relative_to_config(&config.scripts.directory);
        config.storage.data_dir =
            crate::util::paths::resolve_relative_to_config(&config.storage.data_dir);

        Ok(config)
    }

    /// Save settings.toml to the config directory
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = crate::util::paths::get_app_config_path()?;
        self.save_to(&config_path)?;
        tracing::info!("Saved config to {:?}", config_path);
        Ok(())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("Config not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).context(format!("Failed to read {:?}", path))?;
        toml::from_str(&content).context(format!("Failed to parse {:?}", path))
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;

        // Atomic write using temp file + rename
        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, &content).context("Failed to write temp config file")?;
        std::fs::rename(&temp_path, path).context("Failed to rename temp config file")?;
        Ok(())
    }
}
