//! Userscript metadata
//!
//! - metadata: metablock parsing and the `GM.info` descriptor
//! - matching: `@match` / `@include` / `@exclude` evaluation
//! - loader: loads `*.user.js` files from the scripts directory
//! - error: Error types

pub mod error;
pub mod loader;
pub mod matching;
pub mod metadata;

pub use error::{ScriptError, ScriptResult};
pub use loader::ScriptLoader;
pub use matching::{ScriptMatcher, UrlPattern};
pub use metadata::{GmInfo, ScriptMeta, Userscript};
