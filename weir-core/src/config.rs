//! Configuration file loading.
//!
//! The config is TOML: a list of `[[collection]]` tables. Every collection
//! has a required `name` and `type`; everything else in the table belongs
//! to the datasource the `type` selects, so the whole table is kept as a
//! raw JSON value and handed to the datasource to deserialize on use.
//!
//! ```toml
//! [[collection]]
//! name = "default"
//! type = "journald"
//! [[collection.match]]
//! CONTAINER_NAME = "myapp"
//! ```

use crate::error::{Result, WeirError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// One named log collection and the datasource options to realise it.
#[derive(Debug, Clone)]
pub struct Collection {
    /// Collection name, as addressed by the API and the CLI.
    pub name: String,
    /// Datasource type (`journald`, `ssh-journald`, `stdin`).
    pub kind: String,
    /// The full collection table, for the datasource to deserialize.
    pub opts: serde_json::Value,
}

/// The loaded configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path the config was loaded from. Empty for synthesized configs;
    /// datasources resolve relative paths against its parent directory.
    pub path: PathBuf,
    /// Configured collections, in file order.
    pub collections: Vec<Collection>,
}

#[derive(Deserialize)]
struct FileConfig {
    #[serde(default)]
    collection: Vec<toml::Table>,
}

impl Config {
    /// Read and parse the config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| WeirError::ConfigRead {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        Self::parse(&text, path)
    }

    /// Parse config text. `path` is recorded for relative-path resolution
    /// and error messages.
    pub fn parse(text: &str, path: impl Into<PathBuf>) -> Result<Config> {
        let path = path.into();

        let file: FileConfig = toml::from_str(text).map_err(|e| WeirError::ConfigParse {
            path: path.clone(),
            cause: e.to_string(),
        })?;

        let mut collections = Vec::with_capacity(file.collection.len());
        for table in file.collection {
            let name = require_str(&table, "name", &path)?;
            let kind = require_str(&table, "type", &path)?;
            let opts = serde_json::to_value(&table).map_err(|e| WeirError::ConfigParse {
                path: path.clone(),
                cause: e.to_string(),
            })?;
            collections.push(Collection { name, kind, opts });
        }

        Ok(Config { path, collections })
    }

    /// The single-collection config used in `--stdin` mode.
    pub fn stdin_default() -> Config {
        Config {
            path: PathBuf::new(),
            collections: vec![Collection {
                name: "default".to_string(),
                kind: "stdin".to_string(),
                opts: serde_json::json!({ "name": "default", "type": "stdin" }),
            }],
        }
    }

    /// Look up a collection by name.
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// The directory relative datasource paths resolve against.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

fn require_str(table: &toml::Table, key: &str, path: &Path) -> Result<String> {
    match table.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(WeirError::ConfigParse {
            path: path.to_path_buf(),
            cause: format!("collection is missing required key `{key}`"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_journald_collection() {
        let text = r#"[[collection]]
type = 'journald'
name = "default"
docker-aware = true
[[collection.match]]
CONTAINER_NAME = 'fuzz'
"#;

        let config = Config::parse(text, "/etc/weir/config.toml").unwrap();
        assert_eq!(config.collections.len(), 1);

        let c = &config.collections[0];
        assert_eq!(c.name, "default");
        assert_eq!(c.kind, "journald");

        // The whole table survives, keys in sorted order.
        assert_eq!(
            c.opts.to_string(),
            r#"{"docker-aware":true,"match":[{"CONTAINER_NAME":"fuzz"}],"name":"default","type":"journald"}"#
        );
    }

    #[test]
    fn missing_name_is_an_error() {
        let text = "[[collection]]\ntype = 'journald'\n";
        let err = Config::parse(text, "config.toml").unwrap_err();
        assert_eq!(err.code(), "E102");
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn missing_type_is_an_error() {
        let text = "[[collection]]\nname = 'default'\n";
        let err = Config::parse(text, "config.toml").unwrap_err();
        assert!(err.to_string().contains("type"));
    }

    #[test]
    fn empty_config_has_no_collections() {
        let config = Config::parse("", "config.toml").unwrap();
        assert!(config.collections.is_empty());
        assert!(config.collection("default").is_none());
    }

    #[test]
    fn lookup_by_name() {
        let text = "[[collection]]\nname = 'a'\ntype = 'stdin'\n\n[[collection]]\nname = 'b'\ntype = 'stdin'\n";
        let config = Config::parse(text, "config.toml").unwrap();
        assert_eq!(config.collection("b").unwrap().kind, "stdin");
    }

    #[test]
    fn stdin_default_shape() {
        let config = Config::stdin_default();
        let c = config.collection("default").unwrap();
        assert_eq!(c.kind, "stdin");
    }

    #[test]
    fn dir_of_config_path() {
        let config = Config::parse("", "/etc/weir/config.toml").unwrap();
        assert_eq!(config.dir(), Path::new("/etc/weir"));
    }
}
