//! Plugins declared by manifest files instead of code
//!
//! A manifest names an external command and the arguments to run it with.
//! Arguments may reference configuration values as `${section.key}`; a
//! reference without a section refers to the plugin's own section, which
//! holds the manifest's `defaults`:
//!
//! ```toml
//! name = "checkstyle"
//! command = "/usr/bin/checkstyle"
//! args = ["-c", "${rules}", "${convention.javaModuleSourcePath}"]
//! watch = ["config"]
//!
//! [defaults]
//! rules = "config/checks.xml"
//! ```

use crate::config::{
    ConfigValue, ConfigView, KeySpec, PluginConfig, SectionType, ValueKind,
};
use crate::error::{Error, Result};
use crate::pipeline::{Plugin, WatchRegistry};
use crate::tools::{PATH_SEPARATOR, SystemTool, ToolProvider};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_.-]+)\}").unwrap());
static PLUGIN_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]*$").unwrap());

const RESERVED_KEYS: [&str; 3] = ["command", "args", "watch"];

/// A default value declared by a manifest
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ManifestValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl ManifestValue {
    fn kind(&self) -> ValueKind {
        match self {
            ManifestValue::Bool(_) => ValueKind::Bool,
            ManifestValue::Int(_) => ValueKind::Int,
            ManifestValue::Str(_) => ValueKind::Str,
            ManifestValue::List(_) => ValueKind::StrList,
        }
    }
}

impl From<ManifestValue> for ConfigValue {
    fn from(value: ManifestValue) -> Self {
        match value {
            ManifestValue::Bool(b) => ConfigValue::Bool(b),
            ManifestValue::Int(i) => ConfigValue::Int(i),
            ManifestValue::Str(s) => ConfigValue::Str(s),
            ManifestValue::List(items) => items.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandManifest {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Directories relative to `convention.projectDir`
    #[serde(default)]
    pub watch: Vec<PathBuf>,
    #[serde(default)]
    pub defaults: BTreeMap<String, ManifestValue>,
}

impl CommandManifest {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if !PLUGIN_NAME_RE.is_match(&self.name) {
            return Err(format!("invalid plugin name '{}'", self.name));
        }
        if self.command.trim().is_empty() {
            return Err("empty command".to_string());
        }
        if let Some(key) = self.defaults.keys().find(|key| {
            RESERVED_KEYS.contains(&key.as_str()) || key.contains('.') || key.is_empty()
        }) {
            return Err(format!("invalid default key '{key}'"));
        }
        Ok(())
    }
}

/// A plugin running the command of a manifest
#[derive(Debug, Clone)]
pub struct CommandPlugin {
    manifest: CommandManifest,
    section: SectionType,
}

impl CommandPlugin {
    pub fn new(manifest: CommandManifest) -> Result<Self> {
        manifest.validate().map_err(|message| Error::PluginManifest {
            path: manifest.name.clone(),
            message,
        })?;
        let mut keys = vec![
            KeySpec::new("command", ValueKind::Str),
            KeySpec::new("args", ValueKind::StrList),
            KeySpec::new("watch", ValueKind::PathList),
        ];
        keys.extend(
            manifest
                .defaults
                .iter()
                .map(|(key, value)| KeySpec::owned(key.clone(), value.kind())),
        );
        let section = SectionType::dynamic(manifest.name.clone(), keys);
        Ok(Self { manifest, section })
    }

    pub fn manifest(&self) -> &CommandManifest {
        &self.manifest
    }

    /// Load a `.toml` or `.json` manifest
    pub fn load(path: &Path) -> Result<Self> {
        let invalid = |message: String| Error::PluginManifest {
            path: path.display().to_string(),
            message,
        };
        let contents = std::fs::read_to_string(path)?;
        let manifest = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => CommandManifest::from_toml_str(&contents),
            Some("json") => CommandManifest::from_json_str(&contents),
            _ => return Err(invalid("unsupported manifest format".to_string())),
        }
        .map_err(|e| invalid(e.to_string()))?;
        manifest.validate().map_err(invalid)?;
        Self::new(manifest)
    }

    /// Load every manifest of a directory in file name order, one result per
    /// manifest
    pub fn load_dir(dir: &Path) -> Result<Vec<Result<Self>>> {
        let mut manifests = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_manifest = path
                .extension()
                .is_some_and(|ext| ext == "toml" || ext == "json");
            if path.is_file() && is_manifest {
                manifests.push(path);
            }
        }
        manifests.sort();
        Ok(manifests
            .iter()
            .map(|path| {
                debug!("Loading plugin manifest {}", path.display());
                Self::load(path)
            })
            .collect())
    }

    fn key(&self, key: &str) -> String {
        format!("{}.{}", self.manifest.name, key)
    }

    fn project_dir(config: &ConfigView<'_>) -> Result<Option<PathBuf>> {
        config.get_opt("convention.projectDir")
    }

    /// Substitute `${...}` references in one argument
    pub fn expand(&self, config: &ConfigView<'_>, arg: &str) -> Result<String> {
        let mut failure = None;
        let expanded = PLACEHOLDER_RE.replace_all(arg, |caps: &Captures<'_>| {
            let reference = &caps[1];
            let path = if reference.contains('.') {
                reference.to_string()
            } else {
                self.key(reference)
            };
            match config.get::<ConfigValue>(&path) {
                Ok(value) => render_argument(&value),
                Err(e) => {
                    failure.get_or_insert(e);
                    String::new()
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(expanded.into_owned()),
        }
    }
}

/// Lists of paths become platform path lists, other lists are comma separated
fn render_argument(value: &ConfigValue) -> String {
    match value {
        ConfigValue::List(items) => {
            let separator = if items.iter().all(|item| matches!(item, ConfigValue::Path(_)))
                && !items.is_empty()
            {
                PATH_SEPARATOR
            } else {
                ","
            };
            items
                .iter()
                .map(render_argument)
                .collect::<Vec<_>>()
                .join(separator)
        }
        other => other.to_string(),
    }
}

impl Plugin for CommandPlugin {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn init(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        config.get_or_create(&self.manifest.name, &self.section)?;
        config.set_default(&self.key("command"), self.manifest.command.clone())?;
        config.set_default(&self.key("args"), self.manifest.args.clone())?;
        config.set_default(&self.key("watch"), self.manifest.watch.clone())?;
        for (key, value) in &self.manifest.defaults {
            config.set_default(&self.key(key), value.clone())?;
        }
        Ok(())
    }

    fn watch(&self, config: &ConfigView<'_>, registry: &mut WatchRegistry) -> Result<()> {
        let watched: Vec<PathBuf> = config.get_or(&self.key("watch"), Vec::new())?;
        let project_dir = Self::project_dir(config)?;
        for path in watched {
            match &project_dir {
                Some(dir) if path.is_relative() => registry.watch(dir.join(path)),
                _ => registry.watch(path),
            }
        }
        Ok(())
    }

    fn execute(&self, config: &ConfigView<'_>) -> Result<i32> {
        let command: String = config.get(&self.key("command"))?;
        let raw: Vec<String> = config.get_or(&self.key("args"), Vec::new())?;
        let args = raw
            .iter()
            .map(|arg| self.expand(config, arg))
            .collect::<Result<Vec<_>>>()?;

        let mut tool = SystemTool::new(self.manifest.name.clone(), command);
        match Self::project_dir(config)? {
            Some(dir) if dir.is_dir() => tool = tool.with_working_dir(dir),
            Some(dir) => warn!("Project directory {} does not exist", dir.display()),
            None => {}
        }
        tool.run(&mut io::stdout(), &mut io::stderr(), &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigTree;
    use crate::pipeline::PluginRegistry;
    use std::fs;
    use tempfile::TempDir;

    const MANIFEST: &str = r#"
name = "greet"
command = "/bin/sh"
args = ["-c", "exit ${code}"]
watch = ["config"]

[defaults]
code = 3
flags = ["a", "b"]
"#;

    fn initialized(plugin: &CommandPlugin) -> ConfigTree {
        let mut tree = ConfigTree::new();
        plugin.init(&mut tree.as_checked(plugin.name())).unwrap();
        tree
    }

    #[test]
    fn test_manifest_declares_section() {
        let plugin = CommandPlugin::new(CommandManifest::from_toml_str(MANIFEST).unwrap()).unwrap();
        let mut tree = initialized(&plugin);
        assert_eq!(tree.get::<i64>("greet.code").unwrap(), 3);
        assert!(tree.set("greet.code", "4").is_ok());
        assert_eq!(tree.get::<i64>("greet.code").unwrap(), 4);
        assert!(matches!(
            tree.set("greet.undeclared", 1),
            Err(Error::FrozenKey { .. })
        ));
    }

    #[test]
    fn test_expands_references() {
        let plugin = CommandPlugin::new(CommandManifest::from_toml_str(MANIFEST).unwrap()).unwrap();
        let mut tree = initialized(&plugin);
        tree.set(
            "greet.watch",
            vec![PathBuf::from("a"), PathBuf::from("b")],
        )
        .unwrap();
        let view = tree.view();
        assert_eq!(plugin.expand(&view, "-f=${flags}").unwrap(), "-f=a,b");
        assert_eq!(
            plugin.expand(&view, "${greet.watch}").unwrap(),
            format!("a{PATH_SEPARATOR}b")
        );
        assert!(matches!(
            plugin.expand(&view, "${missing.key}"),
            Err(Error::NoSuchKey(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_manifests() {
        let manifest = CommandManifest {
            name: "Bad.Name".to_string(),
            command: "true".to_string(),
            args: Vec::new(),
            watch: Vec::new(),
            defaults: BTreeMap::new(),
        };
        assert!(matches!(
            CommandPlugin::new(manifest),
            Err(Error::PluginManifest { .. })
        ));
        let json = r#"{"name": "x", "command": "true", "defaults": {"args": "clash"}}"#;
        let manifest = CommandManifest::from_json_str(json).unwrap();
        assert!(CommandPlugin::new(manifest).is_err());
    }

    #[test]
    fn test_discover_skips_broken_manifests() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("greet.toml"), MANIFEST).unwrap();
        fs::write(temp_dir.path().join("broken.json"), "{ not json").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = PluginRegistry::new();
        assert_eq!(registry.discover(temp_dir.path()).unwrap(), 1);
        assert!(registry.contains("greet"));
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_command_with_expanded_arguments() {
        let plugin = CommandPlugin::new(CommandManifest::from_toml_str(MANIFEST).unwrap()).unwrap();
        let tree = initialized(&plugin);
        assert_eq!(plugin.execute(&tree.view()).unwrap(), 3);

        let mut registry = WatchRegistry::new();
        plugin.watch(&tree.view(), &mut registry).unwrap();
        assert_eq!(
            registry.paths().map(Path::to_path_buf).collect::<Vec<_>>(),
            vec![PathBuf::from("config")]
        );
    }
}
