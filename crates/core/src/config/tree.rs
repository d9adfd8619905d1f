//! The configuration tree: dotted-key access over typed sections

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::node::{Deferred, Deriver, Entry, Node};
use super::schema::SectionType;
use super::value::{ConfigValue, FromConfigValue, ValueKind};
use super::view::{ConfigView, PluginConfig};
use crate::error::{Error, Result};

/// Deferred values deeper than this are treated as a derivation cycle
pub const MAX_DERIVATION_DEPTH: usize = 64;

/// Access flags inherited from the ancestors of a node
#[derive(Debug, Clone, Copy, Default)]
struct Flags {
    read_only: bool,
    frozen: bool,
}

/// Split a dotted path into its segments, rejecting empty segments
pub(crate) fn split_path(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(path.split('.').collect())
}

pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// The root of all configuration sections.
///
/// Every plugin owns the top-level section named after it. Values are either
/// concrete, nested sections, or deferred computations that are re-evaluated
/// against the live tree on every read.
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    root: Node,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A read-only view of the whole tree
    pub fn view(&self) -> ConfigView<'_> {
        ConfigView::new(self)
    }

    /// A view that only allows mutation below `prefix`
    pub fn as_checked(&mut self, prefix: &str) -> PluginConfig<'_> {
        PluginConfig::new(self, prefix)
    }

    /// Read a required value
    pub fn get<T: FromConfigValue>(&self, path: &str) -> Result<T> {
        self.view().get(path)
    }

    /// Read an optional value; absence is not an error
    pub fn get_opt<T: FromConfigValue>(&self, path: &str) -> Result<Option<T>> {
        self.view().get_opt(path)
    }

    /// Whether a value or section exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        let Ok(segments) = split_path(path) else {
            return false;
        };
        let Some((key, parents)) = segments.split_last() else {
            return false;
        };
        matches!(self.find_node(parents), Ok(Some(node)) if node.entries.contains_key(*key))
    }

    /// Store a concrete value
    pub fn set(&mut self, path: &str, value: impl Into<ConfigValue>) -> Result<()> {
        let value = value.into();
        let segments = split_path(path)?;
        let Some((key, parents)) = segments.split_last() else {
            return Err(Error::InvalidPath(path.to_string()));
        };
        let (node, flags) = self.find_node_mut(parents, true)?;
        let value = match Self::check_writable(node, flags, path, key)? {
            Some(kind) => kind.coerce(path, value)?,
            None => value,
        };
        debug!("Setting {} = {}", path, value);
        node.entries.insert(key.to_string(), Entry::Value(value));
        Ok(())
    }

    /// Ensure a typed section exists at `path`, creating a writable, frozen
    /// section when it is missing. Returns whether the section was created.
    pub fn get_or_create(&mut self, path: &str, section: &SectionType) -> Result<bool> {
        let segments = split_path(path)?;
        let Some((key, parents)) = segments.split_last() else {
            return Err(Error::InvalidPath(path.to_string()));
        };
        let (node, flags) = self.find_node_mut(parents, true)?;
        match node.entries.get(*key) {
            Some(Entry::Section(_)) => return Ok(false),
            Some(other) => {
                return Err(Error::type_mismatch(
                    path,
                    format!("section '{}'", section.name),
                    other.kind_name(),
                ));
            }
            None => {}
        }
        if !section.checked {
            return Err(Error::NotChecked(section.name.to_string()));
        }
        if flags.read_only {
            return Err(Error::ReadOnly(path.to_string()));
        }
        let declared = node
            .section
            .as_ref()
            .is_some_and(|parent| parent.declares(key));
        if flags.frozen && !declared {
            return Err(Error::FrozenKey {
                key: path.to_string(),
                section: node.type_name().to_string(),
            });
        }
        debug!("Creating section '{}' of type '{}'", path, section.name);
        node.entries
            .insert(key.to_string(), Entry::Section(Node::typed(section)));
        Ok(true)
    }

    /// Store a value derived from the current value of `source`.
    ///
    /// `f` runs on every read of `path`, so later changes to `source` (or to
    /// whatever `source` itself derives from) are always visible.
    pub fn derive<T, U, F>(&mut self, path: &str, source: &str, f: F) -> Result<()>
    where
        T: FromConfigValue + 'static,
        U: Into<ConfigValue> + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        split_path(source)?;
        let source_key = source.to_string();
        let eval: Arc<Deriver> = Arc::new(move |view: &ConfigView<'_>| {
            let value = view.get::<T>(&source_key)?;
            Ok(f(value).into())
        });
        self.store_deferred(
            path,
            Deferred {
                origin: source.to_string(),
                eval,
            },
        )
    }

    /// Store a value computed from any number of keys of the tree
    pub fn derive_with<U, F>(&mut self, path: &str, f: F) -> Result<()>
    where
        U: Into<ConfigValue> + 'static,
        F: Fn(&ConfigView<'_>) -> Result<U> + Send + Sync + 'static,
    {
        let eval: Arc<Deriver> =
            Arc::new(move |view: &ConfigView<'_>| f(view).map(Into::into));
        self.store_deferred(
            path,
            Deferred {
                origin: "<computed>".to_string(),
                eval,
            },
        )
    }

    /// Deep copy of the tree. Deferred values only hold key paths, so reads
    /// from the copy evaluate against the copy and never observe later
    /// mutations of the original.
    pub fn duplicate(&self) -> ConfigTree {
        self.clone()
    }

    /// Reject every mutation at or below `path`
    pub fn mark_read_only(&mut self, path: &str) -> Result<()> {
        let segments = split_path(path)?;
        let (node, _) = self.find_node_mut(&segments, false)?;
        node.read_only = true;
        Ok(())
    }

    /// Reject new undeclared keys at or below `path`
    pub fn freeze(&mut self, path: &str) -> Result<()> {
        let segments = split_path(path)?;
        let (node, _) = self.find_node_mut(&segments, false)?;
        node.frozen = true;
        Ok(())
    }

    /// Every leaf key with its evaluated value, sorted by key
    pub fn flatten(&self) -> Vec<(String, Result<ConfigValue>)> {
        let mut paths = Vec::new();
        collect_leaves(&self.root, "", &mut paths);
        paths
            .into_iter()
            .map(|path| {
                let value = self
                    .lookup(&path, 0)
                    .and_then(|value| value.ok_or_else(|| Error::NoSuchKey(path.clone())));
                (path, value)
            })
            .collect()
    }

    /// Render the section at `path`, or the whole tree for an empty path
    pub fn render_section(&self, path: &str) -> Result<String> {
        let node = if path.is_empty() {
            &self.root
        } else {
            let segments = split_path(path)?;
            self.find_node(&segments)?
                .ok_or_else(|| Error::NoSuchKey(path.to_string()))?
        };
        let mut out = String::new();
        self.render_node(&mut out, node, path)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(out)
    }

    /// Resolve `path`, evaluating deferred values. `depth` counts nested
    /// evaluations so that cyclic derivations fail instead of recursing forever.
    pub(crate) fn lookup(&self, path: &str, depth: usize) -> Result<Option<ConfigValue>> {
        if depth > MAX_DERIVATION_DEPTH {
            return Err(Error::DerivationCycle(path.to_string()));
        }
        let segments = split_path(path)?;
        let Some((key, parents)) = segments.split_last() else {
            return Err(Error::InvalidPath(path.to_string()));
        };
        let Some(node) = self.find_node(parents)? else {
            return Ok(None);
        };
        match node.entries.get(*key) {
            None => Ok(None),
            Some(Entry::Value(value)) => Ok(Some(value.clone())),
            Some(Entry::Section(_)) => Err(Error::type_mismatch(path, "value", "section")),
            Some(Entry::Deferred(deferred)) => {
                let view = ConfigView::nested(self, depth + 1);
                let value = (deferred.eval)(&view)?;
                let declared = node
                    .section
                    .as_ref()
                    .and_then(|section| section.key(key))
                    .map(|spec| spec.kind);
                match declared {
                    Some(ValueKind::Section(_)) | None => Ok(Some(value)),
                    Some(kind) => kind.coerce(path, value).map(Some),
                }
            }
        }
    }

    /// Whether `path` names a section
    pub(crate) fn is_section(&self, path: &str) -> Result<bool> {
        let segments = split_path(path)?;
        Ok(self.find_node(&segments).unwrap_or(None).is_some())
    }

    /// The keys directly below the section at `path`, sorted
    pub(crate) fn section_keys(&self, path: &str) -> Result<Vec<String>> {
        let node = if path.is_empty() {
            Some(&self.root)
        } else {
            self.find_node(&split_path(path)?)?
        };
        let node = node.ok_or_else(|| Error::NoSuchKey(path.to_string()))?;
        Ok(node.sorted_keys().into_iter().cloned().collect())
    }

    fn store_deferred(&mut self, path: &str, deferred: Deferred) -> Result<()> {
        let segments = split_path(path)?;
        let Some((key, parents)) = segments.split_last() else {
            return Err(Error::InvalidPath(path.to_string()));
        };
        let (node, flags) = self.find_node_mut(parents, true)?;
        Self::check_writable(node, flags, path, key)?;
        debug!("Deriving {} from {}", path, deferred.origin);
        node.entries
            .insert(key.to_string(), Entry::Deferred(deferred));
        Ok(())
    }

    /// Validate that `key` may be assigned a value in `node`, returning the
    /// declared kind of the key if the node is typed.
    fn check_writable(
        node: &Node,
        flags: Flags,
        path: &str,
        key: &str,
    ) -> Result<Option<ValueKind>> {
        if flags.read_only {
            return Err(Error::ReadOnly(path.to_string()));
        }
        if let Some(Entry::Section(_)) = node.entries.get(key) {
            return Err(Error::type_mismatch(path, "value", "section"));
        }
        match node.section.as_ref().and_then(|section| section.key(key)) {
            Some(spec) => match spec.kind {
                ValueKind::Section(_) => {
                    Err(Error::type_mismatch(path, spec.kind.describe(), "value"))
                }
                kind => Ok(Some(kind)),
            },
            None if flags.frozen => Err(Error::FrozenKey {
                key: path.to_string(),
                section: node.type_name().to_string(),
            }),
            None => Ok(None),
        }
    }

    fn find_node(&self, segments: &[&str]) -> Result<Option<&Node>> {
        let mut node = &self.root;
        for (i, segment) in segments.iter().enumerate() {
            match node.entries.get(*segment) {
                Some(Entry::Section(child)) => node = child,
                Some(other) => {
                    return Err(Error::type_mismatch(
                        &segments[..=i].join("."),
                        "section",
                        other.kind_name(),
                    ));
                }
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    /// Walk to the node at `segments` for writing. Missing sections are
    /// created only when `auto_create` is set, the parent declares them with a
    /// checked type, and nothing above is read-only.
    fn find_node_mut(&mut self, segments: &[&str], auto_create: bool) -> Result<(&mut Node, Flags)> {
        let mut node = &mut self.root;
        let mut flags = Flags {
            read_only: node.read_only,
            frozen: node.frozen,
        };
        for (i, segment) in segments.iter().enumerate() {
            if !node.entries.contains_key(*segment) {
                let prefix = segments[..=i].join(".");
                let declared = node
                    .section
                    .as_ref()
                    .and_then(|section| section.key(segment))
                    .map(|spec| spec.kind);
                match declared {
                    Some(ValueKind::Section(ty)) if !ty.checked => {
                        return Err(Error::NotChecked(ty.name.to_string()));
                    }
                    Some(ValueKind::Section(ty)) if auto_create => {
                        if flags.read_only {
                            return Err(Error::ReadOnly(prefix));
                        }
                        debug!("Auto-creating section '{}' of type '{}'", prefix, ty.name);
                        node.entries
                            .insert(segment.to_string(), Entry::Section(Node::typed(ty)));
                    }
                    _ => return Err(Error::NoSuchKey(prefix)),
                }
            }
            node = match node.entries.get_mut(*segment) {
                Some(Entry::Section(child)) => child,
                Some(other) => {
                    let found = other.kind_name();
                    return Err(Error::type_mismatch(
                        &segments[..=i].join("."),
                        "section",
                        found,
                    ));
                }
                None => return Err(Error::NoSuchKey(segments[..=i].join("."))),
            };
            flags.read_only |= node.read_only;
            flags.frozen |= node.frozen;
        }
        Ok((node, flags))
    }

    fn render_node(&self, out: &mut String, node: &Node, prefix: &str) -> fmt::Result {
        use std::fmt::Write;

        out.push('{');
        for (i, key) in node.sorted_keys().into_iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let path = join_path(prefix, key);
            match &node.entries[key] {
                Entry::Section(child) => {
                    write!(out, "{key}: ")?;
                    self.render_node(out, child, &path)?;
                }
                Entry::Value(value) => write!(out, "{key}: {value}")?,
                Entry::Deferred(_) => match self.lookup(&path, 0) {
                    Ok(Some(value)) => write!(out, "{key}: {value}")?,
                    Ok(None) => write!(out, "{key}: <absent>")?,
                    Err(e) => write!(out, "{key}: <error: {e}>")?,
                },
            }
        }
        out.push('}');
        Ok(())
    }
}

fn collect_leaves(node: &Node, prefix: &str, out: &mut Vec<String>) {
    for key in node.sorted_keys() {
        let path = join_path(prefix, key);
        match &node.entries[key] {
            Entry::Section(child) => collect_leaves(child, &path, out),
            _ => out.push(path),
        }
    }
}

impl fmt::Display for ConfigTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render_node(&mut out, &self.root, "")?;
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::KeySpec;
    use std::path::PathBuf;

    static NESTED_KEYS: [KeySpec; 1] = [KeySpec::new("depth", ValueKind::Int)];
    static NESTED: SectionType = SectionType::new("nested", &NESTED_KEYS);

    static PLAIN: SectionType = SectionType::unchecked("plain", &[]);

    static OUTER_KEYS: [KeySpec; 4] = [
        KeySpec::new("name", ValueKind::Str),
        KeySpec::new("home", ValueKind::Path),
        KeySpec::new("inner", ValueKind::Section(&NESTED)),
        KeySpec::new("plain", ValueKind::Section(&PLAIN)),
    ];
    static OUTER: SectionType = SectionType::new("outer", &OUTER_KEYS);

    fn tree() -> ConfigTree {
        let mut tree = ConfigTree::new();
        tree.get_or_create("outer", &OUTER).unwrap();
        tree
    }

    #[test]
    fn test_set_then_get() {
        let mut tree = tree();
        tree.set("outer.name", "demo").unwrap();
        assert_eq!(tree.get::<String>("outer.name").unwrap(), "demo");
    }

    #[test]
    fn test_set_coerces_to_declared_kind() {
        let mut tree = tree();
        tree.set("outer.home", "/opt/jdk").unwrap();
        assert_eq!(
            tree.get::<PathBuf>("outer.home").unwrap(),
            PathBuf::from("/opt/jdk")
        );
        assert!(matches!(
            tree.get_opt::<ConfigValue>("outer.home").unwrap(),
            Some(ConfigValue::Path(_))
        ));
    }

    #[test]
    fn test_frozen_section_rejects_undeclared_key() {
        let mut tree = tree();
        let err = tree.set("outer.unknown", 1).unwrap_err();
        assert!(matches!(err, Error::FrozenKey { .. }));
    }

    #[test]
    fn test_missing_key() {
        let tree = tree();
        assert!(matches!(
            tree.get::<String>("outer.name"),
            Err(Error::NoSuchKey(_))
        ));
        assert_eq!(tree.get_opt::<String>("outer.name").unwrap(), None);
        assert_eq!(tree.get_opt::<String>("missing.name").unwrap(), None);
    }

    #[test]
    fn test_nested_checked_section_is_auto_created_on_write() {
        let mut tree = tree();
        tree.set("outer.inner.depth", 3).unwrap();
        assert_eq!(tree.get::<i64>("outer.inner.depth").unwrap(), 3);
        assert!(tree.is_section("outer.inner").unwrap());
    }

    #[test]
    fn test_unchecked_section_is_not_auto_created() {
        let mut tree = tree();
        let err = tree.set("outer.plain.x", 1).unwrap_err();
        assert!(matches!(err, Error::NotChecked(_)));
        let err = tree.get_or_create("other", &PLAIN).unwrap_err();
        assert!(matches!(err, Error::NotChecked(_)));
    }

    #[test]
    fn test_undeclared_parent_is_missing() {
        let mut tree = ConfigTree::new();
        let err = tree.set("nowhere.x", 1).unwrap_err();
        assert!(matches!(err, Error::NoSuchKey(_)));
    }

    #[test]
    fn test_read_only_propagates_to_children() {
        let mut tree = tree();
        tree.set("outer.inner.depth", 1).unwrap();
        tree.mark_read_only("outer").unwrap();
        assert!(matches!(
            tree.set("outer.inner.depth", 2),
            Err(Error::ReadOnly(_))
        ));
        assert!(matches!(
            tree.set("outer.name", "x"),
            Err(Error::ReadOnly(_))
        ));
        assert_eq!(tree.get::<i64>("outer.inner.depth").unwrap(), 1);
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut tree = tree();
        tree.set("outer.name", "kept").unwrap();
        assert!(!tree.get_or_create("outer", &OUTER).unwrap());
        assert_eq!(tree.get::<String>("outer.name").unwrap(), "kept");
    }

    #[test]
    fn test_derivation_cycle_is_reported() {
        let mut tree = ConfigTree::new();
        tree.derive("a", "b", |v: i64| v).unwrap();
        tree.derive("b", "a", |v: i64| v).unwrap();
        assert!(matches!(
            tree.get::<i64>("a"),
            Err(Error::DerivationCycle(_))
        ));
    }

    #[test]
    fn test_invalid_paths() {
        let mut tree = ConfigTree::new();
        assert!(matches!(tree.set("", 1), Err(Error::InvalidPath(_))));
        assert!(matches!(tree.set("a..b", 1), Err(Error::InvalidPath(_))));
    }

    #[test]
    fn test_render_evaluates_deferred_values() {
        let mut tree = ConfigTree::new();
        tree.set("x", 1).unwrap();
        tree.derive("y", "x", |v: i64| v * 10).unwrap();
        tree.get_or_create("outer", &OUTER).unwrap();
        tree.set("outer.name", "demo").unwrap();
        assert_eq!(tree.to_string(), "{outer: {name: demo}, x: 1, y: 10}");
    }

    #[test]
    fn test_flatten_lists_leaves() {
        let mut tree = tree();
        tree.set("outer.name", "demo").unwrap();
        tree.set("outer.inner.depth", 2).unwrap();
        let keys: Vec<_> = tree.flatten().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["outer.inner.depth", "outer.name"]);
    }
}
