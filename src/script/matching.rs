use crate::script::error::{ScriptError, ScriptResult};
use crate::script::metadata::ScriptMeta;
use regex::Regex;

/// URL pattern compiled to a regex
///
/// Two syntaxes are supported:
/// - match patterns (`@match`, `@exclude-match`): `scheme://host/path`
/// - globs (`@include`, `@exclude`): `*` wildcards, or `/regex/` literals
#[derive(Debug, Clone)]
pub struct UrlPattern {
    pattern: String,
    regex: Regex,
}

impl UrlPattern {
    /// Compile a match pattern such as `*://*.example.com/*`
    pub fn match_pattern(pattern: &str) -> Option<Self> {
        let regex_pattern = if pattern == "<all_urls>" {
            r"^(https?|wss?|ftp|file)://.*$".to_string()
        } else {
            let (scheme, rest) = pattern.split_once("://")?;
            let scheme = match scheme {
                "*" => "https?".to_string(),
                "http" | "https" | "ws" | "wss" | "ftp" | "file" => regex::escape(scheme),
                _ => return None,
            };

            let slash = rest.find('/')?;
            let (host, path) = rest.split_at(slash);
            let host = if host == "*" {
                r"[^/]*".to_string()
            } else if let Some(domain) = host.strip_prefix("*.") {
                if domain.contains('*') {
                    return None;
                }
                format!(r"([^/.]+\.)*{}(:\d+)?", regex::escape(domain))
            } else if host.contains('*') {
                return None;
            } else if host.is_empty() {
                String::new()
            } else {
                format!(r"{}(:\d+)?", regex::escape(host))
            };

            format!("^{}://{}{}$", scheme, host, wildcard_to_regex(path))
        };

        let regex = Regex::new(&regex_pattern).ok()?;
        Some(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Compile an include/exclude glob. Globs are matched case-insensitively.
    pub fn glob(pattern: &str) -> Option<Self> {
        let regex_pattern = if pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/')
        {
            // Already a regex
            pattern[1..pattern.len() - 1].to_string()
        } else {
            format!("(?i)^{}$", wildcard_to_regex(pattern))
        };

        let regex = Regex::new(&regex_pattern).ok()?;
        Some(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Check if URL matches this pattern
    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }

    /// The pattern source text
    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

fn wildcard_to_regex(pattern: &str) -> String {
    pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}

/// Decides whether a script runs on a URL
///
/// Exclusions win over inclusions. A script with neither `@match` nor
/// `@include` runs nowhere.
#[derive(Debug, Clone)]
pub struct ScriptMatcher {
    includes: Vec<UrlPattern>,
    excludes: Vec<UrlPattern>,
}

impl ScriptMatcher {
    /// Compile all URL patterns declared in the metadata
    pub fn new(meta: &ScriptMeta) -> ScriptResult<Self> {
        let compile = |patterns: &[String], f: fn(&str) -> Option<UrlPattern>| {
            patterns
                .iter()
                .map(|p| f(p).ok_or_else(|| ScriptError::invalid_pattern(&meta.name, p)))
                .collect::<ScriptResult<Vec<_>>>()
        };

        let mut includes = compile(&meta.matches, UrlPattern::match_pattern)?;
        includes.extend(compile(&meta.includes, UrlPattern::glob)?);

        let mut excludes = compile(&meta.exclude_match, UrlPattern::match_pattern)?;
        excludes.extend(compile(&meta.excludes, UrlPattern::glob)?);

        Ok(Self { includes, excludes })
    }

    /// Check whether the script applies to `url`
    pub fn applies_to(&self, url: &str) -> bool {
        if let Some(p) = self.excludes.iter().find(|p| p.matches(url)) {
            tracing::debug!(pattern = p.as_str(), "URL excluded: {}", url);
            return false;
        }
        self.includes.iter().any(|p| p.matches(url))
    }
}
