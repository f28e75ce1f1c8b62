use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

// Global config directory override (for --config flag and tests)
static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Set config directory override (used by --config flag and tests)
pub fn set_config_dir_override(path: Option<PathBuf>) {
    let mut override_path = CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *override_path = path;
}

/// Get current config directory override
pub fn get_config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Find config directory by searching in priority order:
/// 1. Override from --config flag or set_config_dir_override()
/// 2. Environment variable GMBRIDGE_CONFIG_DIR
/// 3. User config directory (`~/.config/gmbridge/` on Unix, `%APPDATA%\gmbridge\` on Windows)
/// 4. Current working directory (`./config/`)
/// 5. Executable directory (`<exe_dir>/config/`)
///
/// If no config directory is found, creates one in the user config directory.
pub fn find_config_directory() -> Result<PathBuf> {
    if let Some(override_path) = get_config_dir_override() {
        if !override_path.exists() {
            std::fs::create_dir_all(&override_path).with_context(|| {
                format!("Failed to create config directory {:?}", override_path)
            })?;
        }
        tracing::debug!("Using config directory override: {:?}", override_path);
        return Ok(override_path);
    }

    if let Ok(env_path) = std::env::var("GMBRIDGE_CONFIG_DIR") {
        let env_config = PathBuf::from(env_path);
        if env_config.exists() {
            tracing::debug!("Found config directory from GMBRIDGE_CONFIG_DIR: {:?}", env_config);
            return Ok(env_config);
        }
    }

    if let Ok(user_config) = get_user_config_dir() {
        if user_config.exists() {
            tracing::debug!("Found config directory at: {:?}", user_config);
            return Ok(user_config);
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        let cwd_config = cwd.join("config");
        if cwd_config.exists() {
            tracing::debug!("Found config directory at: {:?}", cwd_config);
            return Ok(cwd_config);
        }
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let exe_config = exe_dir.join("config");
            if exe_config.exists() {
                tracing::debug!("Found config directory at: {:?}", exe_config);
                return Ok(exe_config);
            }
        }
    }

    let user_config = get_user_config_dir()?;
    std::fs::create_dir_all(&user_config).context("Failed to create user config directory")?;
    tracing::info!("Created config directory at: {:?}", user_config);
    Ok(user_config)
}

fn get_user_config_dir() -> Result<PathBuf> {
    let base_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine user config directory"))?;
    Ok(base_dir.join("gmbridge"))
}

/// Get absolute path to settings.toml
pub fn get_app_config_path() -> Result<PathBuf> {
    Ok(find_config_directory()?.join("settings.toml"))
}

/// Resolve a relative path against the config directory.
///
/// Absolute paths are returned as-is.
pub fn resolve_relative_to_config(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match find_config_directory() {
        Ok(config_dir) => config_dir.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Get absolute path to the logs directory
pub fn get_logs_dir() -> Result<PathBuf> {
    Ok(find_config_directory()?.join(".logs"))
}
