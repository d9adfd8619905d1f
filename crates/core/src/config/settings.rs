//! User settings layered onto the configuration tree
//!
//! Settings come from a `modbuild.toml` / `modbuild.json` file and from
//! `key=value` overrides given on the command line. Nested tables are
//! flattened into dotted keys and applied with `ConfigTree::set`, after the
//! plugins declared their defaults and before they derive from each other.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::tree::{ConfigTree, join_path};
use super::value::ConfigValue;

pub const SETTINGS_FILE_NAMES: [&str; 2] = ["modbuild.toml", "modbuild.json"];

#[derive(Debug, Clone, Default)]
pub struct Settings {
    entries: Vec<(String, ConfigValue)>,
    source: Option<PathBuf>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the settings file of a project directory
    pub fn find(project_dir: &Path) -> Option<PathBuf> {
        SETTINGS_FILE_NAMES
            .iter()
            .map(|name| project_dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load a settings file, choosing the format from its extension
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut settings = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents)?,
            Some("toml") => Self::from_toml_str(&contents)?,
            _ => {
                return Err(Error::ConfigError(format!(
                    "Unsupported settings file: {}",
                    path.display()
                )));
            }
        };
        debug!(
            "Loaded {} settings from {}",
            settings.entries.len(),
            path.display()
        );
        settings.source = Some(path.to_path_buf());
        Ok(settings)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(contents)?;
        let mut entries = Vec::new();
        flatten_json("", &value, &mut entries);
        Ok(Self {
            entries,
            source: None,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(contents)?;
        let mut entries = Vec::new();
        for (key, value) in &table {
            flatten_toml(key, value, &mut entries);
        }
        Ok(Self {
            entries,
            source: None,
        })
    }

    /// Parse a `key=value` override
    pub fn parse_override(raw: &str) -> Result<(String, ConfigValue)> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| Error::ConfigError(format!("Expected key=value, got '{raw}'")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidPath(raw.to_string()));
        }
        Ok((key.to_string(), ConfigValue::parse_literal(value.trim())))
    }

    /// Add an override; later entries win
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn extend(&mut self, other: Settings) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[(String, ConfigValue)] {
        &self.entries
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply every entry to the tree in order
    pub fn apply(&self, tree: &mut ConfigTree) -> Result<()> {
        for (key, value) in &self.entries {
            debug!("Applying setting {} = {}", key, value);
            tree.set(key, value.clone())?;
        }
        Ok(())
    }
}

fn json_scalar(value: &serde_json::Value) -> Option<ConfigValue> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(ConfigValue::Bool(*b)),
        serde_json::Value::Number(n) => Some(
            n.as_i64()
                .map(ConfigValue::Int)
                .unwrap_or_else(|| ConfigValue::Str(n.to_string())),
        ),
        serde_json::Value::String(s) => Some(ConfigValue::Str(s.clone())),
        serde_json::Value::Array(items) => {
            Some(ConfigValue::List(items.iter().filter_map(json_scalar).collect()))
        }
        serde_json::Value::Object(_) => None,
    }
}

fn flatten_json(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, ConfigValue)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                flatten_json(&join_path(prefix, key), child, out);
            }
        }
        other => {
            if prefix.is_empty() {
                return;
            }
            if let Some(value) = json_scalar(other) {
                out.push((prefix.to_string(), value));
            }
        }
    }
}

fn toml_scalar(value: &toml::Value) -> Option<ConfigValue> {
    match value {
        toml::Value::Boolean(b) => Some(ConfigValue::Bool(*b)),
        toml::Value::Integer(i) => Some(ConfigValue::Int(*i)),
        toml::Value::Float(f) => Some(ConfigValue::Str(f.to_string())),
        toml::Value::String(s) => Some(ConfigValue::Str(s.clone())),
        toml::Value::Datetime(dt) => Some(ConfigValue::Str(dt.to_string())),
        toml::Value::Array(items) => {
            Some(ConfigValue::List(items.iter().filter_map(toml_scalar).collect()))
        }
        toml::Value::Table(_) => None,
    }
}

fn flatten_toml(prefix: &str, value: &toml::Value, out: &mut Vec<(String, ConfigValue)>) {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                flatten_toml(&join_path(prefix, key), child, out);
            }
        }
        other => {
            if let Some(value) = toml_scalar(other) {
                out.push((prefix.to_string(), value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_toml_is_flattened_into_dotted_keys() {
        let settings = Settings::from_toml_str(
            r#"
            [compiler]
            release = 17
            rawArguments = ["-parameters"]

            [convention]
            javaHome = "/opt/jdk"
            "#,
        )
        .unwrap();
        let mut keys: Vec<_> = settings.entries().iter().map(|(k, _)| k.as_str()).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec!["compiler.rawArguments", "compiler.release", "convention.javaHome"]
        );
    }

    #[test]
    fn test_json_is_flattened_into_dotted_keys() {
        let settings =
            Settings::from_json_str(r#"{"packager": {"moduleVersion": "1.2", "skip": null}}"#)
                .unwrap();
        assert_eq!(
            settings.entries(),
            &[(
                "packager.moduleVersion".to_string(),
                ConfigValue::Str("1.2".into())
            )]
        );
    }

    #[test]
    fn test_parse_override() {
        let (key, value) = Settings::parse_override("compiler.release=21").unwrap();
        assert_eq!(key, "compiler.release");
        assert_eq!(value, ConfigValue::Int(21));
        assert!(Settings::parse_override("novalue").is_err());
    }

    #[test]
    fn test_find_prefers_toml() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("modbuild.json"), "{}").unwrap();
        std::fs::write(temp_dir.path().join("modbuild.toml"), "").unwrap();
        let found = Settings::find(temp_dir.path()).unwrap();
        assert!(found.ends_with("modbuild.toml"));
    }

    #[test]
    fn test_load_from_file_records_source() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("modbuild.json");
        std::fs::write(&path, r#"{"a": {"b": true}}"#).unwrap();
        let settings = Settings::load_from_file(&path).unwrap();
        assert_eq!(settings.source(), Some(path.as_path()));
        assert_eq!(settings.entries()[0].1, ConfigValue::Bool(true));
    }
}
