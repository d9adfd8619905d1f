//! Section types: the declared shape of a configuration section

use std::borrow::Cow;

use super::value::ValueKind;

/// A declared key of a section type
#[derive(Debug, Clone)]
pub struct KeySpec {
    pub name: Cow<'static, str>,
    pub kind: ValueKind,
}

impl KeySpec {
    pub const fn new(name: &'static str, kind: ValueKind) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
        }
    }

    /// A key whose name is only known at runtime
    pub fn owned(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            kind,
        }
    }
}

/// The type of a configuration section.
///
/// A section created from a type is frozen: only the declared keys may be
/// set. Only `checked` types may be auto-created by `get_or_create` or when a
/// write traverses a missing nested section.
#[derive(Debug, Clone)]
pub struct SectionType {
    pub name: Cow<'static, str>,
    pub checked: bool,
    pub keys: Cow<'static, [KeySpec]>,
}

impl SectionType {
    /// A checked section type with a static key list
    pub const fn new(name: &'static str, keys: &'static [KeySpec]) -> Self {
        Self {
            name: Cow::Borrowed(name),
            checked: true,
            keys: Cow::Borrowed(keys),
        }
    }

    /// A section type that cannot be auto-created
    pub const fn unchecked(name: &'static str, keys: &'static [KeySpec]) -> Self {
        Self {
            name: Cow::Borrowed(name),
            checked: false,
            keys: Cow::Borrowed(keys),
        }
    }

    /// A checked section type whose keys are only known at runtime, such as
    /// the defaults declared by a plugin manifest.
    pub fn dynamic(name: impl Into<String>, keys: Vec<KeySpec>) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            checked: true,
            keys: Cow::Owned(keys),
        }
    }

    pub fn key(&self, name: &str) -> Option<&KeySpec> {
        self.keys.iter().find(|spec| spec.name == name)
    }

    pub fn declares(&self, name: &str) -> bool {
        self.key(name).is_some()
    }
}
