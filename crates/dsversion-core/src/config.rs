//! Configuration for the versioning services.
//!
//! Loaded from `dsversion.jsonc` / `dsversion.json` (JSON with comments),
//! then overridden by `DSVERSION_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {message}")]
    InvalidJson { path: String, message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Diff rendering options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Unchanged lines shown around each change.
    pub context_lines: usize,
    /// Soft-wrap width of the HTML side-by-side table.
    pub wrap_column: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            context_lines: 3,
            wrap_column: 70,
        }
    }
}

/// HTTP server options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5050".to_string(),
        }
    }
}

/// Versioning configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionsConfig {
    /// Public URL of the catalog. Upload URLs under it are rewritten to
    /// their versioned download path, and redirects point at it.
    pub site_url: String,

    /// User credited when no acting user resolves.
    pub system_user: String,

    /// Directory of the JSON version table. `None` uses the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<PathBuf>,

    /// Label prefix of versions created by restore.
    pub restore_prefix: String,

    pub diff: DiffConfig,

    pub server: ServerConfig,

    /// Default log level when `RUST_LOG` is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for VersionsConfig {
    fn default() -> Self {
        Self {
            site_url: "http://localhost:5000".to_string(),
            system_user: "site_user".to_string(),
            storage_path: None,
            restore_prefix: "restored_".to_string(),
            diff: DiffConfig::default(),
            server: ServerConfig::default(),
            log_level: None,
        }
    }
}

impl VersionsConfig {
    /// Load configuration.
    ///
    /// An explicit path wins; otherwise the first of `dsversion.jsonc` /
    /// `dsversion.json` in `dir` is used, if any. Environment overrides are
    /// applied last. Returns the config and the file it came from.
    pub async fn load(
        explicit: Option<&Path>,
        dir: Option<&Path>,
    ) -> ConfigResult<(Self, Option<PathBuf>)> {
        let source = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => dir.and_then(dsversion_util::path::find_config_file),
        };

        let mut config = match &source {
            Some(path) => Self::load_file(path).await?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());

        Ok((config, source))
    }

    /// Load one configuration file.
    pub async fn load_file(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::parse_jsonc(&content, &path.display().to_string())
    }

    /// Parse JSONC (JSON with comments).
    pub fn parse_jsonc(content: &str, source: &str) -> ConfigResult<Self> {
        let stripped = strip_comments(content);
        serde_json::from_str(&stripped).map_err(|e| ConfigError::InvalidJson {
            path: source.to_string(),
            message: e.to_string(),
        })
    }

    /// Apply `DSVERSION_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("DSVERSION_SITE_URL") {
            self.site_url = value;
        }
        if let Some(value) = lookup("DSVERSION_SYSTEM_USER") {
            self.system_user = value;
        }
        if let Some(value) = lookup("DSVERSION_STORAGE_PATH") {
            self.storage_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("DSVERSION_ADDRESS") {
            self.server.address = value;
        }
        if let Some(value) = lookup("DSVERSION_LOG_LEVEL") {
            self.log_level = Some(value);
        }
    }

    /// `site_url` without a trailing slash.
    pub fn site_url(&self) -> &str {
        self.site_url.trim_end_matches('/')
    }

    /// Directory of the version table.
    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.storage_path
            .clone()
            .or_else(dsversion_util::path::data_dir)
    }
}

/// Strip `//` and `/* */` comments outside of strings.
fn strip_comments(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escape_next = false;

    while let Some(c) = chars.next() {
        if escape_next {
            result.push(c);
            escape_next = false;
            continue;
        }

        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            result.push(c);
            continue;
        }

        match (c, chars.peek().copied()) {
            ('"', _) => {
                in_string = true;
                result.push(c);
            }
            ('/', Some('/')) => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        result.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = ' ';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    // Keep line numbers stable for parse errors.
                    if c == '\n' {
                        result.push('\n');
                    }
                    prev = c;
                }
            }
            _ => result.push(c),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_strip_comments() {
        let input = r#"{
            // Line comment
            "site_url": "http://example.org", // trailing comment
            /* block comment */
            "system_user": "val/*not a comment*/ue"
        }"#;

        let result = strip_comments(input);
        assert!(!result.contains("Line comment"));
        assert!(!result.contains("trailing comment"));
        assert!(!result.contains("block comment"));
        assert!(result.contains("http://example.org"));
        assert!(result.contains("val/*not a comment*/ue"));
    }

    #[test]
    fn test_parse_jsonc_partial() {
        let input = r#"{
            // Only override what differs
            "site_url": "https://data.example.org/",
            "diff": { "wrap_column": 40 }
        }"#;

        let config = VersionsConfig::parse_jsonc(input, "test").unwrap();
        assert_eq!(config.site_url(), "https://data.example.org");
        assert_eq!(config.diff.wrap_column, 40);
        assert_eq!(config.diff.context_lines, 3);
        assert_eq!(config.restore_prefix, "restored_");
        assert_eq!(config.system_user, "site_user");
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = VersionsConfig::parse_jsonc("{ nope", "broken.json").unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DSVERSION_SITE_URL", "https://catalog.example"),
            ("DSVERSION_STORAGE_PATH", "/var/lib/dsversion"),
            ("DSVERSION_ADDRESS", "0.0.0.0:8080"),
        ]
        .into_iter()
        .collect();

        let mut config = VersionsConfig::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.site_url, "https://catalog.example");
        assert_eq!(
            config.storage_dir(),
            Some(PathBuf::from("/var/lib/dsversion"))
        );
        assert_eq!(config.server.address, "0.0.0.0:8080");
        assert_eq!(config.system_user, "site_user");
    }

    #[tokio::test]
    async fn test_load_prefers_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("dsversion.json"),
            r#"{"system_user": "from-dir"}"#,
        )
        .unwrap();
        let explicit = dir.path().join("other.jsonc");
        std::fs::write(&explicit, r#"{"system_user": "explicit"} // note"#).unwrap();

        let config = VersionsConfig::load_file(&explicit).await.unwrap();
        assert_eq!(config.system_user, "explicit");

        let found = dsversion_util::path::find_config_file(dir.path()).unwrap();
        let config = VersionsConfig::load_file(&found).await.unwrap();
        assert_eq!(config.system_user, "from-dir");
    }
}
