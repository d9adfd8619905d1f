//! Restricted views over a configuration tree

use super::schema::SectionType;
use super::tree::{ConfigTree, join_path, split_path};
use super::value::{ConfigValue, FromConfigValue};
use crate::error::{Error, Result};

/// A read-only view of a configuration tree, optionally projected onto a
/// sub-section. Paths are resolved relative to the projection.
#[derive(Debug, Clone)]
pub struct ConfigView<'a> {
    tree: &'a ConfigTree,
    base: String,
    depth: usize,
}

impl<'a> ConfigView<'a> {
    pub fn new(tree: &'a ConfigTree) -> Self {
        Self {
            tree,
            base: String::new(),
            depth: 0,
        }
    }

    pub(crate) fn nested(tree: &'a ConfigTree, depth: usize) -> Self {
        Self {
            tree,
            base: String::new(),
            depth,
        }
    }

    /// The absolute path of this view's projection, empty for the root
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn get<T: FromConfigValue>(&self, path: &str) -> Result<T> {
        let full = self.resolve(path);
        match self.tree.lookup(&full, self.depth)? {
            Some(value) => T::from_config_value(&full, value),
            None => Err(Error::NoSuchKey(full)),
        }
    }

    pub fn get_opt<T: FromConfigValue>(&self, path: &str) -> Result<Option<T>> {
        let full = self.resolve(path);
        self.tree
            .lookup(&full, self.depth)?
            .map(|value| T::from_config_value(&full, value))
            .transpose()
    }

    /// Read a value, falling back to `default` when absent
    pub fn get_or<T: FromConfigValue>(&self, path: &str, default: T) -> Result<T> {
        Ok(self.get_opt(path)?.unwrap_or(default))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.tree.contains(&self.resolve(path))
    }

    /// Project onto the sub-section at `path`. The projection stays read-only.
    pub fn section(&self, path: &str) -> Result<ConfigView<'a>> {
        let full = self.resolve(path);
        if !self.tree.is_section(&full)? {
            return Err(Error::NoSuchKey(full));
        }
        Ok(ConfigView {
            tree: self.tree,
            base: full,
            depth: self.depth,
        })
    }

    /// Keys directly below this view, sorted
    pub fn keys(&self) -> Result<Vec<String>> {
        self.tree.section_keys(&self.base)
    }

    /// Render this view, evaluating deferred values
    pub fn render(&self) -> Result<String> {
        self.tree.render_section(&self.base)
    }

    /// Copy of the underlying tree
    pub fn duplicate(&self) -> ConfigTree {
        self.tree.duplicate()
    }

    fn resolve(&self, path: &str) -> String {
        join_path(&self.base, path)
    }
}

/// A mutable view handed to a plugin: reads are unrestricted, but every
/// mutation must target the plugin's own namespace.
#[derive(Debug)]
pub struct PluginConfig<'a> {
    tree: &'a mut ConfigTree,
    prefix: String,
}

impl<'a> PluginConfig<'a> {
    pub fn new(tree: &'a mut ConfigTree, prefix: impl Into<String>) -> Self {
        Self {
            tree,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn view(&self) -> ConfigView<'_> {
        self.tree.view()
    }

    pub fn get<T: FromConfigValue>(&self, path: &str) -> Result<T> {
        self.tree.get(path)
    }

    pub fn get_opt<T: FromConfigValue>(&self, path: &str) -> Result<Option<T>> {
        self.tree.get_opt(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.tree.contains(path)
    }

    pub fn set(&mut self, path: &str, value: impl Into<ConfigValue>) -> Result<()> {
        self.check(path)?;
        self.tree.set(path, value)
    }

    /// Set a value only if nothing is stored there yet, so defaults declared
    /// during `init` survive re-entrant runs and user settings.
    pub fn set_default(&mut self, path: &str, value: impl Into<ConfigValue>) -> Result<()> {
        self.check(path)?;
        if self.tree.contains(path) {
            return Ok(());
        }
        self.tree.set(path, value)
    }

    pub fn get_or_create(&mut self, path: &str, section: &SectionType) -> Result<bool> {
        self.check(path)?;
        self.tree.get_or_create(path, section)
    }

    pub fn derive<T, U, F>(&mut self, path: &str, source: &str, f: F) -> Result<()>
    where
        T: FromConfigValue + 'static,
        U: Into<ConfigValue> + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.check(path)?;
        self.tree.derive(path, source, f)
    }

    pub fn derive_with<U, F>(&mut self, path: &str, f: F) -> Result<()>
    where
        U: Into<ConfigValue> + 'static,
        F: Fn(&ConfigView<'_>) -> Result<U> + Send + Sync + 'static,
    {
        self.check(path)?;
        self.tree.derive_with(path, f)
    }

    /// Derive `path` from `source` unless a value is already stored there
    pub fn derive_default<T, U, F>(&mut self, path: &str, source: &str, f: F) -> Result<()>
    where
        T: FromConfigValue + 'static,
        U: Into<ConfigValue> + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.check(path)?;
        if self.tree.contains(path) {
            return Ok(());
        }
        self.tree.derive(path, source, f)
    }

    fn check(&self, path: &str) -> Result<()> {
        split_path(path)?;
        let owned = path == self.prefix
            || path
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('.'));
        if owned {
            Ok(())
        } else {
            Err(Error::Permission {
                plugin: self.prefix.clone(),
                key: path.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::KeySpec;
    use crate::config::value::ValueKind;

    static SECTION_KEYS: [KeySpec; 2] = [
        KeySpec::new("x", ValueKind::Int),
        KeySpec::new("y", ValueKind::Int),
    ];
    static SECTION: SectionType = SectionType::new("section", &SECTION_KEYS);

    #[test]
    fn test_checked_view_rejects_foreign_namespace() {
        let mut tree = ConfigTree::new();
        tree.get_or_create("other", &SECTION).unwrap();
        let mut config = tree.as_checked("mine");
        assert!(config.get_or_create("mine", &SECTION).is_ok());
        assert!(config.set("mine.x", 1).is_ok());
        assert!(matches!(
            config.set("other.x", 1),
            Err(Error::Permission { .. })
        ));
        assert!(matches!(
            config.get_or_create("mineral", &SECTION),
            Err(Error::Permission { .. })
        ));
    }

    #[test]
    fn test_checked_view_reads_everything() {
        let mut tree = ConfigTree::new();
        tree.get_or_create("other", &SECTION).unwrap();
        tree.set("other.x", 7).unwrap();
        let config = tree.as_checked("mine");
        assert_eq!(config.get::<i64>("other.x").unwrap(), 7);
    }

    #[test]
    fn test_set_default_keeps_existing_value() {
        let mut tree = ConfigTree::new();
        tree.get_or_create("mine", &SECTION).unwrap();
        tree.set("mine.x", 5).unwrap();
        let mut config = tree.as_checked("mine");
        config.set_default("mine.x", 1).unwrap();
        config.set_default("mine.y", 2).unwrap();
        assert_eq!(tree.get::<i64>("mine.x").unwrap(), 5);
        assert_eq!(tree.get::<i64>("mine.y").unwrap(), 2);
    }

    #[test]
    fn test_section_projection_resolves_relative_paths() {
        let mut tree = ConfigTree::new();
        tree.get_or_create("mine", &SECTION).unwrap();
        tree.set("mine.x", 3).unwrap();
        let view = tree.view();
        let section = view.section("mine").unwrap();
        assert_eq!(section.get::<i64>("x").unwrap(), 3);
        assert_eq!(section.keys().unwrap(), vec!["x".to_string()]);
        assert!(view.section("absent").is_err());
    }
}
