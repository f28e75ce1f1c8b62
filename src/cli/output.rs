use crate::script::{GmInfo, ScriptMeta};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One row of `gmbridge scripts`
#[derive(Debug, Clone, Serialize)]
pub struct ScriptEntry {
    pub file: PathBuf,
    pub name: String,
    pub namespace: String,
    pub version: String,
    /// Load error, if the file could not be parsed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScriptEntry {
    pub fn loaded(file: PathBuf, meta: &ScriptMeta) -> Self {
        Self {
            file,
            name: meta.name.clone(),
            namespace: meta.namespace.clone(),
            version: meta.version.clone(),
            error: None,
        }
    }

    pub fn failed(file: PathBuf, error: impl ToString) -> Self {
        Self {
            file,
            name: String::new(),
            namespace: String::new(),
            version: String::new(),
            error: Some(error.to_string()),
        }
    }
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

/// Format `GM.info` for display (human or JSON)
pub fn format_info(info: &GmInfo, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(info).unwrap_or_else(|_| "{}".to_string());
    }

    let script = &info.script;
    let mut output = String::new();
    output.push_str(&format!("Name: {}\n", script.name));
    output.push_str(&format!("Namespace: {}\n", script.namespace));
    if !script.version.is_empty() {
        output.push_str(&format!("Version: {}\n", script.version));
    }
    if !script.description.is_empty() {
        output.push_str(&format!("Description: {}\n", script.description));
    }
    output.push_str(&format!("Matches: {}\n", list_or_dash(&script.matches)));
    output.push_str(&format!("Includes: {}\n", list_or_dash(&script.includes)));
    output.push_str(&format!("Excludes: {}\n", list_or_dash(&script.excludes)));
    output.push_str(&format!("Grants: {}\n", list_or_dash(&script.grant)));
    output.push_str(&format!("Run at: {}\n", script.run_at));
    output.push_str(&format!("Handler: {} {}", info.script_handler, info.version));
    output
}

/// Format the scripts directory listing (human or JSON)
pub fn format_scripts(entries: &[ScriptEntry], json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(entries).unwrap_or_else(|_| "[]".to_string());
    }
    if entries.is_empty() {
        return "No userscripts found.".to_string();
    }

    entries
        .iter()
        .map(|entry| {
            let file = entry
                .file
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            match &entry.error {
                Some(error) => format!("✗ {} ({})", file, error),
                None if entry.version.is_empty() => {
                    format!("✓ {} - {}/{}", file, entry.namespace, entry.name)
                }
                None => format!(
                    "✓ {} - {}/{} v{}",
                    file, entry.namespace, entry.name, entry.version
                ),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format the stored values of a namespace (human or JSON)
pub fn format_values(namespace: &str, values: &BTreeMap<String, Value>, json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(values).unwrap_or_else(|_| "{}".to_string());
    }
    if values.is_empty() {
        return format!("No values stored for {}.", namespace);
    }

    values
        .iter()
        .map(|(key, value)| format!("{} = {}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_values() {
        let mut values = BTreeMap::new();
        values.insert("theme".to_string(), json!("dark"));
        values.insert("count".to_string(), json!(3));

        assert_eq!(format_values("ns/a", &values, false), "count = 3\ntheme = \"dark\"");
        assert_eq!(format_values("ns/a", &BTreeMap::new(), false), "No values stored for ns/a.");

        let parsed: Value = serde_json::from_str(&format_values("ns/a", &values, true)).unwrap();
        assert_eq!(parsed, json!({"count": 3, "theme": "dark"}));
    }

    #[test]
    fn test_format_scripts() {
        let meta = ScriptMeta {
            name: "Tidy".to_string(),
            namespace: "example".to_string(),
            version: "1.2".to_string(),
            ..Default::default()
        };
        let entries = vec![
            ScriptEntry::loaded(PathBuf::from("/s/tidy.user.js"), &meta),
            ScriptEntry::failed(PathBuf::from("/s/broken.user.js"), "No metablock found"),
        ];

        assert_eq!(
            format_scripts(&entries, false),
            "✓ tidy.user.js - example/Tidy v1.2\n✗ broken.user.js (No metablock found)"
        );
        assert_eq!(format_scripts(&[], false), "No userscripts found.");
    }
}
