//! Per-syntax version extraction and rewriting capabilities
//!
//! Each project file that embeds the version does so in its own syntax:
//! a key-value line, a structured field, or an arbitrary embedded
//! literal. A `VersionSyntax` implementation knows how to find the token
//! and how to rewrite it without disturbing the rest of the file; the
//! variant is selected when the file is registered, never inferred from
//! content.

use regex::Regex;

use crate::models::errors::{PackdError, Result};

/// Version extraction/rewrite capability for one file syntax
pub trait VersionSyntax: Send + Sync {
    /// Find the embedded version token. `Ok(None)` means the file has no
    /// token; conflicting or duplicate tokens are a `ValidationError`.
    fn extract(&self, content: &str) -> Result<Option<String>>;

    /// Rewrite the embedded token to `version`, leaving everything else
    /// byte-identical. Fails if no token is present.
    fn rewrite(&self, content: &str, version: &str) -> Result<String>;

    /// Short human-readable description for reports and errors
    fn describe(&self) -> String;
}

const VERSION_CHARS: &str = r"[0-9][0-9A-Za-z.+\-]*";

// =============================================================================
// Key-value lines (version = 1.2.3 / VERSION: 1.2.3)
// =============================================================================

/// Line-oriented `key = value` / `key: value` files (properties,
/// simple config files, Makefiles).
pub struct KeyValueSyntax {
    key: String,
    pattern: Regex,
}

impl KeyValueSyntax {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let pattern = Regex::new(&format!(
            r#"(?m)^(?P<prefix>\s*{}\s*[:=]\s*"?'?)(?P<version>{})(?P<suffix>"?'?\s*)$"#,
            regex::escape(&key),
            VERSION_CHARS
        ))
        .expect("key-value pattern is valid");
        Self { key, pattern }
    }
}

impl VersionSyntax for KeyValueSyntax {
    fn extract(&self, content: &str) -> Result<Option<String>> {
        let mut found: Option<String> = None;
        for captures in self.pattern.captures_iter(content) {
            let version = captures["version"].to_string();
            match &found {
                None => found = Some(version),
                Some(_) => {
                    return Err(PackdError::validation(format!(
                        "duplicate '{}' version tokens found",
                        self.key
                    )))
                }
            }
        }
        Ok(found)
    }

    fn rewrite(&self, content: &str, version: &str) -> Result<String> {
        self.extract(content)?.ok_or_else(|| {
            PackdError::validation(format!("no '{}' version token to rewrite", self.key))
        })?;
        let replaced = self
            .pattern
            .replace(content, format!("${{prefix}}{}${{suffix}}", version));
        Ok(replaced.into_owned())
    }

    fn describe(&self) -> String {
        format!("key-value '{}'", self.key)
    }
}

// =============================================================================
// Structured field ([table] version = "...")
// =============================================================================

/// `version = "..."` inside a named TOML table (Cargo.toml `[package]`,
/// pyproject.toml `[project]`). The rewrite is surgical and the result
/// is re-parsed with `toml` to confirm only the intended field moved.
pub struct TomlFieldSyntax {
    table: String,
    field_pattern: Regex,
}

impl TomlFieldSyntax {
    pub fn new(table: impl Into<String>) -> Self {
        let table = table.into();
        let field_pattern = Regex::new(&format!(
            r#"(?m)^(?P<prefix>version\s*=\s*")(?P<version>{})(?P<suffix>")\s*$"#,
            VERSION_CHARS
        ))
        .expect("toml field pattern is valid");
        Self {
            table,
            field_pattern,
        }
    }

    /// Byte range of the table's body (from after its header line to the
    /// next table header or EOF)
    fn table_span(&self, content: &str) -> Option<(usize, usize)> {
        let header = Regex::new(&format!(
            r"(?m)^\[{}\]\s*$",
            regex::escape(&self.table)
        ))
        .expect("table header pattern is valid");
        let m = header.find(content)?;
        let body_start = m.end();
        let next_header = Regex::new(r"(?m)^\[").expect("next header pattern is valid");
        let body_end = next_header
            .find_at(content, body_start)
            .map(|n| n.start())
            .unwrap_or(content.len());
        Some((body_start, body_end))
    }
}

impl VersionSyntax for TomlFieldSyntax {
    fn extract(&self, content: &str) -> Result<Option<String>> {
        let Some((start, end)) = self.table_span(content) else {
            return Ok(None);
        };
        let body = &content[start..end];

        let mut found: Option<String> = None;
        for captures in self.field_pattern.captures_iter(body) {
            let version = captures["version"].to_string();
            match &found {
                None => found = Some(version),
                Some(_) => {
                    return Err(PackdError::validation(format!(
                        "duplicate version fields in [{}]",
                        self.table
                    )))
                }
            }
        }
        Ok(found)
    }

    fn rewrite(&self, content: &str, version: &str) -> Result<String> {
        let (start, end) = self.table_span(content).ok_or_else(|| {
            PackdError::validation(format!("no [{}] table to rewrite", self.table))
        })?;
        self.extract(content)?.ok_or_else(|| {
            PackdError::validation(format!("no version field in [{}] to rewrite", self.table))
        })?;

        let body = &content[start..end];
        let new_body = self
            .field_pattern
            .replace(body, format!("${{prefix}}{}${{suffix}}", version));
        let mut result = String::with_capacity(content.len());
        result.push_str(&content[..start]);
        result.push_str(&new_body);
        result.push_str(&content[end..]);

        // Confirm the document still parses and the field landed
        let parsed: toml::Value = toml::from_str(&result)
            .map_err(|e| PackdError::validation(format!("rewrite broke TOML syntax: {}", e)))?;
        let landed = parsed
            .get(&self.table)
            .and_then(|t| t.get("version"))
            .and_then(|v| v.as_str());
        if landed != Some(version) {
            return Err(PackdError::validation(format!(
                "rewrite did not land in [{}]: found {:?}",
                self.table, landed
            )));
        }
        Ok(result)
    }

    fn describe(&self) -> String {
        format!("toml field [{}].version", self.table)
    }
}

// =============================================================================
// Embedded literal (arbitrary regex with one capture group)
// =============================================================================

/// Arbitrary embedded version literal located by a caller-supplied
/// pattern with exactly one capture group around the version
/// (`__version__ = "..."`, `pub const VERSION: &str = "...";`).
pub struct EmbeddedLiteralSyntax {
    pattern: Regex,
}

impl EmbeddedLiteralSyntax {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| PackdError::validation(format!("bad literal pattern: {}", e)))?;
        if pattern.captures_len() != 2 {
            return Err(PackdError::validation(
                "literal pattern must have exactly one capture group around the version",
            ));
        }
        Ok(Self { pattern })
    }
}

impl VersionSyntax for EmbeddedLiteralSyntax {
    fn extract(&self, content: &str) -> Result<Option<String>> {
        let mut found: Option<String> = None;
        for captures in self.pattern.captures_iter(content) {
            let version = captures
                .get(1)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            match &found {
                None if !version.is_empty() => found = Some(version),
                None => {}
                Some(existing) if *existing == version => {
                    return Err(PackdError::validation("duplicate version literals found"))
                }
                Some(existing) => {
                    return Err(PackdError::validation(format!(
                        "conflicting version literals: '{}' vs '{}'",
                        existing, version
                    )))
                }
            }
        }
        Ok(found)
    }

    fn rewrite(&self, content: &str, version: &str) -> Result<String> {
        let captures = self
            .pattern
            .captures(content)
            .ok_or_else(|| PackdError::validation("no version literal to rewrite"))?;
        let group = captures
            .get(1)
            .ok_or_else(|| PackdError::validation("pattern matched without capturing"))?;

        let mut result = String::with_capacity(content.len());
        result.push_str(&content[..group.start()]);
        result.push_str(version);
        result.push_str(&content[group.end()..]);
        Ok(result)
    }

    fn describe(&self) -> String {
        format!("embedded literal /{}/", self.pattern.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value_extract_and_rewrite() {
        let syntax = KeyValueSyntax::new("version");
        let content = "name = demo\nversion = 1.2.3\ndebug = true\n";

        assert_eq!(syntax.extract(content).unwrap().as_deref(), Some("1.2.3"));

        let rewritten = syntax.rewrite(content, "2.0.0").unwrap();
        assert_eq!(rewritten, "name = demo\nversion = 2.0.0\ndebug = true\n");
    }

    #[test]
    fn test_key_value_colon_and_quotes() {
        let syntax = KeyValueSyntax::new("version");
        let content = "version: \"0.9.1\"\n";
        assert_eq!(syntax.extract(content).unwrap().as_deref(), Some("0.9.1"));
        let rewritten = syntax.rewrite(content, "0.9.2").unwrap();
        assert_eq!(rewritten, "version: \"0.9.2\"\n");
    }

    #[test]
    fn test_key_value_duplicates_rejected() {
        let syntax = KeyValueSyntax::new("version");
        let content = "version = 1.0.0\nversion = 1.1.0\n";
        let err = syntax.extract(content).unwrap_err();
        assert!(matches!(err, PackdError::Validation(_)));
    }

    #[test]
    fn test_key_value_missing_token_is_none() {
        let syntax = KeyValueSyntax::new("version");
        assert!(syntax.extract("name = demo\n").unwrap().is_none());
        assert!(syntax.rewrite("name = demo\n", "1.0.0").is_err());
    }

    #[test]
    fn test_toml_field_scoped_to_table() {
        let syntax = TomlFieldSyntax::new("package");
        let content = r#"[package]
name = "demo"
version = "0.1.0"

[dependencies]
serde = { version = "1", features = ["derive"] }
"#;
        assert_eq!(syntax.extract(content).unwrap().as_deref(), Some("0.1.0"));

        let rewritten = syntax.rewrite(content, "0.2.0").unwrap();
        assert!(rewritten.contains("version = \"0.2.0\""));
        // Dependency table untouched
        assert!(rewritten.contains(r#"serde = { version = "1", features = ["derive"] }"#));
    }

    #[test]
    fn test_toml_field_missing_table_is_none() {
        let syntax = TomlFieldSyntax::new("package");
        assert!(syntax.extract("[project]\nversion = \"1.0.0\"\n").unwrap().is_none());
    }

    #[test]
    fn test_embedded_literal_python_dunder() {
        let syntax = EmbeddedLiteralSyntax::new(r#"__version__\s*=\s*"([^"]+)""#).unwrap();
        let content = "\"\"\"demo\"\"\"\n__version__ = \"3.1.4\"\n";
        assert_eq!(syntax.extract(content).unwrap().as_deref(), Some("3.1.4"));
        let rewritten = syntax.rewrite(content, "3.2.0").unwrap();
        assert!(rewritten.contains("__version__ = \"3.2.0\""));
    }

    #[test]
    fn test_embedded_literal_conflicts_rejected() {
        let syntax = EmbeddedLiteralSyntax::new(r#"VERSION = "([^"]+)""#).unwrap();
        let content = "VERSION = \"1.0.0\"\nVERSION = \"2.0.0\"\n";
        let err = syntax.extract(content).unwrap_err();
        assert!(err.to_string().contains("conflicting"));
    }

    #[test]
    fn test_embedded_literal_requires_one_group() {
        assert!(EmbeddedLiteralSyntax::new("no groups here").is_err());
        assert!(EmbeddedLiteralSyntax::new("(a)(b)").is_err());
    }
}
