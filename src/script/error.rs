use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or inspecting userscripts
#[derive(Error, Debug)]
pub enum ScriptError {
    /// Failed to read script file
    #[error("Failed to read script file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// No `// ==UserScript==` block in the source
    #[error("No metablock found in {0}")]
    MissingMetablock(String),

    /// Metablock has no `@name`
    #[error("Metablock in {0} has no @name")]
    MissingName(String),

    /// A `@match`, `@include` or `@exclude` pattern could not be compiled
    #[error("Invalid URL pattern in {script}: {pattern}")]
    InvalidPattern { script: String, pattern: String },

    /// Invalid script directory
    #[error("Invalid script directory: {0}")]
    InvalidScriptDirectory(PathBuf),
}

/// Result type for script operations
pub type ScriptResult<T> = Result<T, ScriptError>;

impl ScriptError {
    /// Create an invalid pattern error
    pub fn invalid_pattern(script: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::InvalidPattern {
            script: script.into(),
            pattern: pattern.into(),
        }
    }
}
