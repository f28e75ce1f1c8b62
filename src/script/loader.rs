use crate::script::error::{ScriptError, ScriptResult};
use crate::script::metadata::Userscript;
use std::path::{Path, PathBuf};

/// Userscript file loader
///
/// Handles:
/// - Listing `*.user.js` files in a directory, alphabetically
/// - Reading and parsing a script's metablock
pub struct ScriptLoader {
    directory: PathBuf,
}

impl ScriptLoader {
    /// Create new script loader for directory
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Get all userscript files in alphabetical order
    pub fn list_scripts(&self) -> ScriptResult<Vec<PathBuf>> {
        let dir = &self.directory;

        if !dir.exists() {
            tracing::warn!("Script directory does not exist: {:?}, creating it", dir);
            std::fs::create_dir_all(dir)
                .map_err(|_e| ScriptError::InvalidScriptDirectory(dir.clone()))?;
            return Ok(Vec::new());
        }

        if !dir.is_dir() {
            return Err(ScriptError::InvalidScriptDirectory(dir.clone()));
        }

        let entries =
            std::fs::read_dir(dir).map_err(|_e| ScriptError::InvalidScriptDirectory(dir.clone()))?;

        let mut scripts: Vec<PathBuf> = Vec::new();

        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if path.is_dir() {
                continue;
            }

            let is_userscript = path
                .file_name()
                .and_then(|f| f.to_str())
                .is_some_and(|f| f.ends_with(".user.js"));
            if is_userscript {
                scripts.push(path);
            }
        }

        scripts.sort_by(|a, b| {
            let name_a = a.file_name().unwrap_or_default();
            let name_b = b.file_name().unwrap_or_default();
            name_a.cmp(name_b)
        });

        tracing::debug!("Found {} userscripts in {:?}", scripts.len(), dir);
        Ok(scripts)
    }

    /// Read and parse a userscript file
    pub fn load(&self, path: &Path) -> ScriptResult<Userscript> {
        let source = std::fs::read_to_string(path).map_err(|e| ScriptError::FileReadError {
            path: path.to_owned(),
            source: e,
        })?;
        Userscript::parse(&source, &path.display().to_string())
    }

    /// Get the script directory path
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SCRIPT: &str = "// ==UserScript==\n// @name Test\n// ==/UserScript==\n";

    #[test]
    fn test_loader_directory_getter() {
        let loader = ScriptLoader::new("./test_scripts");
        assert_eq!(loader.directory(), Path::new("./test_scripts"));
    }

    #[test]
    fn test_list_scripts_filters_userscripts() {
        let temp_dir = tempfile::tempdir().unwrap();

        fs::write(temp_dir.path().join("a.user.js"), SCRIPT).unwrap();
        fs::write(temp_dir.path().join("helper.js"), "// lib").unwrap();
        fs::write(temp_dir.path().join("readme.txt"), "text").unwrap();

        let loader = ScriptLoader::new(temp_dir.path());
        let scripts = loader.list_scripts().unwrap();

        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].file_name().unwrap(), "a.user.js");
    }

    #[test]
    fn test_list_scripts_alphabetical_order() {
        let temp_dir = tempfile::tempdir().unwrap();

        fs::write(temp_dir.path().join("c_third.user.js"), SCRIPT).unwrap();
        fs::write(temp_dir.path().join("a_first.user.js"), SCRIPT).unwrap();
        fs::write(temp_dir.path().join("b_second.user.js"), SCRIPT).unwrap();

        let loader = ScriptLoader::new(temp_dir.path());
        let names: Vec<_> = loader
            .list_scripts()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["a_first.user.js", "b_second.user.js", "c_third.user.js"]);
    }

    #[test]
    fn test_list_scripts_nonexistent_directory_creates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("scripts");

        let loader = ScriptLoader::new(&missing);
        let scripts = loader.list_scripts().unwrap();

        assert!(missing.exists());
        assert!(scripts.is_empty());
    }

    #[test]
    fn test_load_parses_metablock() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.user.js");
        fs::write(&path, SCRIPT).unwrap();

        let loader = ScriptLoader::new(temp_dir.path());
        let script = loader.load(&path).unwrap();
        assert_eq!(script.meta.name, "Test");
    }

    #[test]
    fn test_load_file_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nonexistent.user.js");

        let loader = ScriptLoader::new(temp_dir.path());
        match loader.load(&path) {
            Err(ScriptError::FileReadError { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected FileReadError, got {:?}", other.map(|s| s.meta.name)),
        }
    }
}
