//! Registry of the plugins available to a pipeline

use super::Plugin;
use crate::error::Result;
use crate::plugins::command::CommandPlugin;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct Registered {
    kind: TypeId,
    plugin: Arc<dyn Plugin>,
}

/// Plugins keyed by name, iterated in name order.
///
/// A plugin whose implementation type and name are already registered is
/// ignored. On a name clash between different types the plugin registered
/// first (built-ins are registered before dynamic plugins) is kept.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Registered>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin; returns whether it was added
    pub fn register<P: Plugin + 'static>(&mut self, plugin: P) -> bool {
        let kind = TypeId::of::<P>();
        let name = plugin.name().to_string();
        if let Some(existing) = self.plugins.get(&name) {
            if existing.kind == kind {
                debug!("Plugin {} is already registered", name);
            } else {
                warn!("Ignoring plugin {}: the name is already taken", name);
            }
            return false;
        }
        debug!("Registered plugin {}", name);
        self.plugins.insert(
            name,
            Registered {
                kind,
                plugin: Arc::new(plugin),
            },
        );
        true
    }

    /// Load command plugins from the manifests of `dir`. Invalid manifests
    /// are skipped with a warning. Returns the number of plugins added.
    pub fn discover(&mut self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            debug!("No plugin directory at {}", dir.display());
            return Ok(0);
        }
        let mut added = 0;
        for loaded in CommandPlugin::load_dir(dir)? {
            match loaded {
                Ok(plugin) => {
                    if self.register(plugin) {
                        added += 1;
                    }
                }
                Err(e) => warn!("Skipping plugin manifest: {}", e),
            }
        }
        info!("Discovered {} plugins in {}", added, dir.display());
        Ok(added)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).map(|r| r.plugin.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Names in run order
    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    /// Plugins in run order
    pub fn plugins(&self) -> impl Iterator<Item = &Arc<dyn Plugin>> {
        self.plugins.values().map(|r| &r.plugin)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigView;

    struct Named(&'static str);

    impl Plugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(&self, _config: &ConfigView<'_>) -> Result<i32> {
            Ok(0)
        }
    }

    struct Other(&'static str);

    impl Plugin for Other {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(&self, _config: &ConfigView<'_>) -> Result<i32> {
            Ok(1)
        }
    }

    #[test]
    fn test_plugins_are_sorted_and_deduplicated() {
        let mut registry = PluginRegistry::new();
        assert!(registry.register(Named("packager")));
        assert!(registry.register(Named("compiler")));
        assert!(!registry.register(Named("compiler")));
        assert!(registry.register(Other("resolver")));
        assert_eq!(registry.names(), vec!["compiler", "packager", "resolver"]);
    }

    #[test]
    fn test_first_registration_wins_name_clash() {
        let mut registry = PluginRegistry::new();
        registry.register(Named("compiler"));
        assert!(!registry.register(Other("compiler")));
        let plugin = registry.get("compiler").unwrap();
        assert_eq!(plugin.execute(&crate::ConfigTree::new().view()).unwrap(), 0);
    }

    #[test]
    fn test_discover_missing_directory() {
        let mut registry = PluginRegistry::new();
        assert_eq!(registry.discover(Path::new("/definitely/not/here")).unwrap(), 0);
    }
}
