use crate::script::error::{ScriptError, ScriptResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const METABLOCK_START: &str = "==UserScript==";
const METABLOCK_END: &str = "==/UserScript==";

static META_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*//\s*@(\S+)(?:\s+(.*?))?\s*$").expect("metadata line regex")
});

/// Per-script metadata exposed as `GM.info.script`
///
/// Field names follow the metablock keys, including the hyphenated ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptMeta {
    pub description: String,
    #[serde(rename = "exclude-match")]
    pub exclude_match: Vec<String>,
    pub excludes: Vec<String>,
    pub grant: Vec<String>,
    pub includes: Vec<String>,
    #[serde(rename = "inject-into")]
    pub inject_into: String,
    pub matches: Vec<String>,
    pub name: String,
    pub namespace: String,
    pub noframes: bool,
    pub require: Vec<String>,
    /// Parsed but not served; resource fetching is not implemented
    pub resources: Vec<String>,
    #[serde(rename = "run-at")]
    pub run_at: String,
    pub version: String,
}

impl Default for ScriptMeta {
    fn default() -> Self {
        Self {
            description: String::new(),
            exclude_match: Vec::new(),
            excludes: Vec::new(),
            grant: Vec::new(),
            includes: Vec::new(),
            inject_into: "content".to_string(),
            matches: Vec::new(),
            name: String::new(),
            namespace: String::new(),
            noframes: false,
            require: Vec::new(),
            resources: Vec::new(),
            run_at: "document-end".to_string(),
            version: String::new(),
        }
    }
}

impl ScriptMeta {
    /// Storage scope for this script's values: `<namespace>/<name>`
    pub fn storage_namespace(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Check whether an API (e.g. `GM.setValue`) is granted.
    ///
    /// Both the dotted (`GM.setValue`) and underscore (`GM_setValue`) grant
    /// spellings are accepted. `@grant none` grants nothing.
    pub fn is_granted(&self, api: &str) -> bool {
        if self.grant.iter().any(|g| g == "none") {
            return false;
        }
        let member = api
            .strip_prefix("GM.")
            .or_else(|| api.strip_prefix("GM_"))
            .unwrap_or(api);
        self.grant.iter().any(|g| {
            g.strip_prefix("GM.")
                .or_else(|| g.strip_prefix("GM_"))
                .is_some_and(|granted| granted.eq_ignore_ascii_case(member))
        })
    }
}

/// Descriptor of the running script and host, served as `GM.info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmInfo {
    pub script_handler: String,
    pub version: String,
    pub script_meta_str: String,
    pub script: ScriptMeta,
}

/// A parsed userscript: its raw metablock, metadata and full source
#[derive(Debug, Clone)]
pub struct Userscript {
    pub meta: ScriptMeta,
    pub meta_str: String,
    pub source: String,
}

impl Userscript {
    /// Parse a userscript source. `origin` is only used in error messages.
    pub fn parse(source: &str, origin: &str) -> ScriptResult<Self> {
        let (meta_str, body) = extract_metablock(source)
            .ok_or_else(|| ScriptError::MissingMetablock(origin.to_string()))?;

        let mut meta = ScriptMeta::default();
        for line in body.lines() {
            let Some(caps) = META_LINE.captures(line) else {
                continue;
            };
            let key = &caps[1];
            let value = caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();
            apply_key(&mut meta, key, value);
        }

        if meta.name.is_empty() {
            return Err(ScriptError::MissingName(origin.to_string()));
        }

        Ok(Self {
            meta,
            meta_str,
            source: source.to_string(),
        })
    }

    /// Build the `GM.info` descriptor for this script
    pub fn info(&self, script_handler: &str, version: &str) -> GmInfo {
        GmInfo {
            script_handler: script_handler.to_string(),
            version: version.to_string(),
            script_meta_str: self.meta_str.clone(),
            script: self.meta.clone(),
        }
    }
}

/// Returns the full metablock text (markers included) and the lines between the markers
fn extract_metablock(source: &str) -> Option<(String, String)> {
    let all: Vec<&str> = source.lines().collect();
    let start = all.iter().position(|l| is_marker(l, METABLOCK_START))?;
    let end_offset = all[start + 1..]
        .iter()
        .position(|l| is_marker(l, METABLOCK_END))?;
    let end = start + 1 + end_offset;

    let block = all[start..=end].join("\n");
    let body = all[start + 1..end].join("\n");
    Some((block, body))
}

fn is_marker(line: &str, marker: &str) -> bool {
    line.trim()
        .strip_prefix("//")
        .is_some_and(|rest| rest.trim() == marker)
}

fn apply_key(meta: &mut ScriptMeta, key: &str, value: String) {
    match key {
        "name" => meta.name = value,
        "namespace" => meta.namespace = value,
        "description" => meta.description = value,
        "version" => meta.version = value,
        "match" => meta.matches.push(value),
        "exclude-match" => meta.exclude_match.push(value),
        "include" => meta.includes.push(value),
        "exclude" => meta.excludes.push(value),
        "grant" => meta.grant.push(value),
        "require" => meta.require.push(value),
        "resource" => meta.resources.push(value),
        "run-at" => meta.run_at = value,
        "inject-into" => meta.inject_into = value,
        "noframes" => meta.noframes = true,
        // Localized variants such as @name:fr
        other => tracing::trace!("Ignoring metadata key @{}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SCRIPT: &str = r#"// ==UserScript==
// @name        Dark Theme
// @name:fr     Theme sombre
// @namespace   example.net
// @description Forces a dark palette
// @version     1.2.0
// @match       *://*.example.com/*
// @exclude-match https://example.com/admin/*
// @include     http://legacy.example.org/*
// @grant       GM.setValue
// @grant       GM_getValue
// @grant       GM.xmlHttpRequest
// @run-at      document-start
// @noframes
// ==/UserScript==

GM.addStyle("body { background: #000 }");
"#;

    #[test]
    fn test_parse_metablock_fields() {
        let script = Userscript::parse(SCRIPT, "dark.user.js").unwrap();
        let meta = &script.meta;

        assert_eq!(meta.name, "Dark Theme");
        assert_eq!(meta.namespace, "example.net");
        assert_eq!(meta.description, "Forces a dark palette");
        assert_eq!(meta.version, "1.2.0");
        assert_eq!(meta.matches, vec!["*://*.example.com/*".to_string()]);
        assert_eq!(meta.exclude_match, vec!["https://example.com/admin/*".to_string()]);
        assert_eq!(meta.includes, vec!["http://legacy.example.org/*".to_string()]);
        assert_eq!(meta.grant.len(), 3);
        assert_eq!(meta.run_at, "document-start");
        assert_eq!(meta.inject_into, "content");
        assert!(meta.noframes);
    }

    #[test]
    fn test_meta_str_keeps_markers() {
        let script = Userscript::parse(SCRIPT, "dark.user.js").unwrap();
        assert!(script.meta_str.starts_with("// ==UserScript=="));
        assert!(script.meta_str.ends_with("// ==/UserScript=="));
        assert!(!script.meta_str.contains("GM.addStyle"));
    }

    #[test]
    fn test_missing_metablock() {
        let result = Userscript::parse("console.log('hi');", "plain.js");
        assert!(matches!(result, Err(ScriptError::MissingMetablock(_))));
    }

    #[test]
    fn test_unterminated_metablock() {
        let result = Userscript::parse("// ==UserScript==\n// @name X\n", "open.js");
        assert!(matches!(result, Err(ScriptError::MissingMetablock(_))));
    }

    #[test]
    fn test_missing_name() {
        let source = "// ==UserScript==\n// @namespace x\n// ==/UserScript==\n";
        let result = Userscript::parse(source, "anon.user.js");
        assert!(matches!(result, Err(ScriptError::MissingName(_))));
    }

    #[test]
    fn test_grant_spellings() {
        let script = Userscript::parse(SCRIPT, "dark.user.js").unwrap();
        assert!(script.meta.is_granted("GM.setValue"));
        assert!(script.meta.is_granted("GM_setValue"));
        assert!(script.meta.is_granted("GM.getValue"));
        assert!(script.meta.is_granted("GM.xmlHttpRequest"));
        assert!(!script.meta.is_granted("GM.deleteValue"));
    }

    #[test]
    fn test_grant_none() {
        let meta = ScriptMeta {
            grant: vec!["none".to_string(), "GM.setValue".to_string()],
            ..Default::default()
        };
        assert!(!meta.is_granted("GM.setValue"));
    }

    #[test]
    fn test_info_serialization_uses_metablock_keys() {
        let script = Userscript::parse(SCRIPT, "dark.user.js").unwrap();
        let info = script.info("gmbridge", "0.1.0");
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["scriptHandler"], "gmbridge");
        assert_eq!(json["script"]["run-at"], "document-start");
        assert_eq!(json["script"]["exclude-match"][0], "https://example.com/admin/*");
        assert!(json["scriptMetaStr"].as_str().unwrap().contains("@name"));
    }

    #[test]
    fn test_storage_namespace() {
        let script = Userscript::parse(SCRIPT, "dark.user.js").unwrap();
        assert_eq!(script.meta.storage_namespace(), "example.net/Dark Theme");
    }
}
