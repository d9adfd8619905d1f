//! Storage nodes of the configuration tree

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::schema::SectionType;
use super::value::ConfigValue;
use super::view::ConfigView;
use crate::error::Result;

/// A stored computation over the tree, evaluated on every read
pub(crate) type Deriver = dyn Fn(&ConfigView<'_>) -> Result<ConfigValue> + Send + Sync;

/// A deferred value. The closure only captures key paths, never nodes, so
/// evaluation always goes through whichever tree it is read from.
#[derive(Clone)]
pub(crate) struct Deferred {
    pub(crate) origin: String,
    pub(crate) eval: Arc<Deriver>,
}

#[derive(Clone)]
pub(crate) enum Entry {
    Value(ConfigValue),
    Section(Node),
    Deferred(Deferred),
}

impl Entry {
    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Entry::Value(value) => value.kind_name(),
            Entry::Section(_) => "section",
            Entry::Deferred(_) => "derived value",
        }
    }
}

/// One section of the tree
#[derive(Clone, Default)]
pub(crate) struct Node {
    pub(crate) section: Option<Arc<SectionType>>,
    pub(crate) read_only: bool,
    pub(crate) frozen: bool,
    pub(crate) entries: HashMap<String, Entry>,
}

impl Node {
    /// A writable, frozen node of the given type
    pub(crate) fn typed(section: &SectionType) -> Self {
        Self {
            section: Some(Arc::new(section.clone())),
            read_only: false,
            frozen: true,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn type_name(&self) -> &str {
        self.section
            .as_ref()
            .map(|section| section.name.as_ref())
            .unwrap_or("<untyped>")
    }

    pub(crate) fn sorted_keys(&self) -> Vec<&String> {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("section", &self.type_name())
            .field("read_only", &self.read_only)
            .field("frozen", &self.frozen)
            .field("keys", &self.sorted_keys())
            .finish()
    }
}
