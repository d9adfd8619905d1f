//! Loading a project: plugins, settings and the configured tree

use anyhow::{Context, Result};
use modbuild_core::config::{ConfigTree, Settings};
use modbuild_core::plugins::register_builtin;
use modbuild_core::tools::{LocalRepository, Toolbox};
use modbuild_core::{Pipeline, PluginRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::cli::GlobalArgs;

/// Manifest directory of a project, relative to its root
pub const PLUGIN_DIR: &str = ".modbuild/plugins";

/// A project directory with its plugins and settings
#[derive(Debug)]
pub struct Project {
    pub dir: PathBuf,
    pub toolbox: Toolbox,
    pub pipeline: Pipeline,
    pub settings: Settings,
}

impl Project {
    pub fn load(global: &GlobalArgs) -> Result<Self> {
        let dir = match &global.project {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        let dir = dir
            .canonicalize()
            .with_context(|| format!("Project directory {} not found", dir.display()))?;
        debug!("Loading project {}", dir.display());

        let mut toolbox = Toolbox::default();
        if let Some(repository) = &global.repository {
            toolbox = toolbox.with_artifacts(Arc::new(LocalRepository::new(repository)));
        }

        let mut registry = PluginRegistry::new();
        register_builtin(&mut registry, &toolbox);
        let plugin_dir = global
            .plugin_dir
            .clone()
            .unwrap_or_else(|| dir.join(PLUGIN_DIR));
        registry
            .discover(&plugin_dir)
            .with_context(|| format!("Failed to read plugins from {}", plugin_dir.display()))?;

        let settings = load_settings(&dir, global)?;
        Ok(Self {
            dir,
            toolbox,
            pipeline: Pipeline::new(registry),
            settings,
        })
    }

    /// A tree with every plugin initialized and configured
    pub fn configure(&mut self) -> Result<ConfigTree> {
        let mut tree = ConfigTree::new();
        self.pipeline
            .setup(&mut tree, &self.settings)
            .context("Failed to configure plugins")?;
        Ok(tree)
    }
}

/// Project directory first, then the settings file, then `--set` overrides
fn load_settings(dir: &Path, global: &GlobalArgs) -> Result<Settings> {
    let mut settings = Settings::new();
    settings.push("convention.projectDir", dir.to_path_buf());

    let file = match &global.config {
        Some(path) => Some(path.clone()),
        None => Settings::find(dir),
    };
    if let Some(path) = file {
        let loaded = Settings::load_from_file(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        settings.extend(loaded);
    } else {
        debug!("No settings file in {}, using defaults", dir.display());
    }

    for raw in &global.overrides {
        let (key, value) = Settings::parse_override(raw)?;
        settings.push(key, value);
    }
    Ok(settings)
}
