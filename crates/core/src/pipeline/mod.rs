//! Sequencing plugins through their lifecycle against one configuration tree

pub mod registry;
pub mod watch;

pub use registry::PluginRegistry;
pub use watch::WatchRegistry;

use crate::config::{ConfigTree, ConfigView, PluginConfig, Settings};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

/// A unit of build work owning the configuration section named after it.
///
/// `init` declares the plugin's defaults and `configure` wires its inputs
/// to other sections with derivations; both only get write access to the
/// plugin's own namespace. `watch` and `execute` see the tree read-only.
pub trait Plugin: Send + Sync {
    /// Unique lowercase name, also the name of the plugin's section
    fn name(&self) -> &str;

    fn init(&self, _config: &mut PluginConfig<'_>) -> Result<()> {
        Ok(())
    }

    fn configure(&self, _config: &mut PluginConfig<'_>) -> Result<()> {
        Ok(())
    }

    /// Register the directories whose changes should trigger a re-run
    fn watch(&self, _config: &ConfigView<'_>, _registry: &mut WatchRegistry) -> Result<()> {
        Ok(())
    }

    /// Do the work; zero means success
    fn execute(&self, config: &ConfigView<'_>) -> Result<i32>;
}

/// Lifecycle of a plugin within a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PluginState {
    #[default]
    Uninitialized,
    Initialized,
    Configured,
    Watched,
    Executed,
}

/// Execute `plugins` in order, stopping at the first nonzero exit code.
///
/// I/O failures of a plugin become exit code 1; configuration errors are
/// returned.
pub fn run_sequence(plugins: &[Arc<dyn Plugin>], tree: &ConfigTree) -> Result<i32> {
    let view = tree.view();
    for plugin in plugins {
        let code = execute_plugin(plugin.as_ref(), &view)?;
        if code != 0 {
            return Ok(code);
        }
    }
    Ok(0)
}

fn execute_plugin(plugin: &dyn Plugin, view: &ConfigView<'_>) -> Result<i32> {
    info!("Running {}", plugin.name());
    let code = match plugin.execute(view) {
        Ok(code) => code,
        Err(e) if e.is_io() => {
            error!("{} failed: {}", plugin.name(), e);
            1
        }
        Err(e) => return Err(e),
    };
    if code != 0 {
        error!("{} exited with code {}", plugin.name(), code);
    }
    Ok(code)
}

/// The plugins of a registry and their lifecycle states
#[derive(Debug, Default)]
pub struct Pipeline {
    registry: PluginRegistry,
    states: HashMap<String, PluginState>,
}

impl Pipeline {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            registry,
            states: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn state(&self, name: &str) -> PluginState {
        self.states.get(name).copied().unwrap_or_default()
    }

    /// Look up a sequence of plugins by name, failing on the first unknown
    /// name before anything runs
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn Plugin>>> {
        names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.registry
                    .get(name)
                    .ok_or_else(|| Error::UnknownPlugin(name.to_string()))
            })
            .collect()
    }

    /// Let every plugin declare its defaults
    pub fn init(&mut self, tree: &mut ConfigTree) -> Result<()> {
        for plugin in self.registry.plugins() {
            debug!("Initializing {}", plugin.name());
            plugin.init(&mut tree.as_checked(plugin.name()))?;
            self.states
                .insert(plugin.name().to_string(), PluginState::Initialized);
        }
        Ok(())
    }

    /// Let every plugin derive its inputs from other sections
    pub fn configure(&mut self, tree: &mut ConfigTree) -> Result<()> {
        for plugin in self.registry.plugins() {
            debug!("Configuring {}", plugin.name());
            plugin.configure(&mut tree.as_checked(plugin.name()))?;
            self.states
                .insert(plugin.name().to_string(), PluginState::Configured);
        }
        Ok(())
    }

    /// `init`, then user settings, then `configure`
    pub fn setup(&mut self, tree: &mut ConfigTree, settings: &Settings) -> Result<()> {
        self.init(tree)?;
        settings.apply(tree)?;
        self.configure(tree)
    }

    /// Collect the directories the given plugin watches
    pub fn watch(&mut self, name: &str, tree: &ConfigTree) -> Result<WatchRegistry> {
        let plugin = self
            .registry
            .get(name)
            .ok_or_else(|| Error::UnknownPlugin(name.to_string()))?;
        let mut registry = WatchRegistry::new();
        plugin.watch(&tree.view(), &mut registry)?;
        self.states.insert(name.to_string(), PluginState::Watched);
        Ok(registry)
    }

    /// Execute the named plugins against an already configured tree
    pub fn execute<S: AsRef<str>>(&mut self, tree: &ConfigTree, names: &[S]) -> Result<i32> {
        let plugins = self.select(names)?;
        let view = tree.view();
        for plugin in &plugins {
            let code = execute_plugin(plugin.as_ref(), &view)?;
            self.states
                .insert(plugin.name().to_string(), PluginState::Executed);
            if code != 0 {
                return Ok(code);
            }
        }
        Ok(0)
    }

    /// Standalone run: set up every plugin, then execute the named ones
    pub fn run<S: AsRef<str>>(
        &mut self,
        tree: &mut ConfigTree,
        settings: &Settings,
        names: &[S],
    ) -> Result<i32> {
        self.select(names)?;
        self.setup(tree, settings)?;
        self.execute(tree, names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KeySpec, SectionType, ValueKind};
    use std::sync::Mutex;

    static COUNTER_KEYS: [KeySpec; 1] = [KeySpec::new("exitCode", ValueKind::Int)];
    static COUNTER: SectionType = SectionType::new("counter", &COUNTER_KEYS);

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Plugin for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn init(&self, config: &mut PluginConfig<'_>) -> Result<()> {
            config.get_or_create(self.name, &COUNTER)?;
            config.set_default(&format!("{}.exitCode", self.name), 0)
        }

        fn execute(&self, config: &ConfigView<'_>) -> Result<i32> {
            self.log.lock().unwrap().push(self.name.to_string());
            let code: i64 = config.get(&format!("{}.exitCode", self.name))?;
            Ok(code as i32)
        }
    }

    fn pipeline(log: &Arc<Mutex<Vec<String>>>) -> Pipeline {
        let mut registry = PluginRegistry::new();
        for name in ["first", "second", "third"] {
            registry.register(Recording {
                name,
                log: log.clone(),
            });
        }
        Pipeline::new(registry)
    }

    #[test]
    fn test_first_failure_halts_the_sequence() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = pipeline(&log);
        let mut tree = ConfigTree::new();
        let mut settings = Settings::new();
        settings.push("second.exitCode", 3);

        let code = pipeline
            .run(&mut tree, &settings, &["first", "second", "third"])
            .unwrap();
        assert_eq!(code, 3);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(pipeline.state("second"), PluginState::Executed);
        assert_eq!(pipeline.state("third"), PluginState::Configured);
    }

    #[test]
    fn test_unknown_plugin_fails_before_execution() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = pipeline(&log);
        let mut tree = ConfigTree::new();
        let err = pipeline
            .run(&mut tree, &Settings::new(), &["first", "bogus"])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownPlugin(name) if name == "bogus"));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(pipeline.state("first"), PluginState::Uninitialized);
    }

    #[test]
    fn test_run_sequence_is_reentrant() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = pipeline(&log);
        let mut tree = ConfigTree::new();
        pipeline.setup(&mut tree, &Settings::new()).unwrap();
        let plugins = pipeline.select(&["third", "first"]).unwrap();
        assert_eq!(run_sequence(&plugins, &tree).unwrap(), 0);
        assert_eq!(run_sequence(&plugins, &tree).unwrap(), 0);
        assert_eq!(log.lock().unwrap().len(), 4);
    }
}
