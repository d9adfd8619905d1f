//! Module descriptors: the metadata of one compilation unit

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The name of the module every other module implicitly requires
pub const JAVA_BASE: &str = "java.base";

/// Modifiers of a `requires` edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequiresModifier {
    Transitive,
    Static,
    Synthetic,
    Mandated,
}

impl fmt::Display for RequiresModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            RequiresModifier::Transitive => "transitive",
            RequiresModifier::Static => "static",
            RequiresModifier::Synthetic => "synthetic",
            RequiresModifier::Mandated => "mandated",
        };
        f.write_str(keyword)
    }
}

/// An immutable module descriptor.
///
/// Collections are ordered so that descriptors compare, print and serialize
/// deterministically. An empty target set on an export or open means the
/// package is visible to every module.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleDescriptor {
    name: String,
    version: Option<String>,
    open: bool,
    automatic: bool,
    requires: BTreeMap<String, BTreeSet<RequiresModifier>>,
    exports: BTreeMap<String, BTreeSet<String>>,
    opens: BTreeMap<String, BTreeSet<String>>,
    uses: BTreeSet<String>,
    provides: BTreeMap<String, Vec<String>>,
    packages: BTreeSet<String>,
    main_class: Option<String>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// An automatic module: reads everything, exports and opens all its
    /// packages
    pub fn automatic(name: impl Into<String>, packages: impl IntoIterator<Item = String>) -> Self {
        let packages: BTreeSet<String> = packages.into_iter().collect();
        Self {
            name: name.into(),
            automatic: true,
            exports: packages
                .iter()
                .map(|package| (package.clone(), BTreeSet::new()))
                .collect(),
            opens: packages
                .iter()
                .map(|package| (package.clone(), BTreeSet::new()))
                .collect(),
            packages,
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_open(mut self, open: bool) -> Self {
        self.open = open;
        self
    }

    pub fn with_requires(
        mut self,
        module: impl Into<String>,
        modifiers: impl IntoIterator<Item = RequiresModifier>,
    ) -> Self {
        self.requires
            .entry(module.into())
            .or_default()
            .extend(modifiers);
        self
    }

    pub fn with_exports(mut self, package: impl Into<String>) -> Self {
        let package = package.into();
        self.packages.insert(package.clone());
        self.exports.entry(package).or_default();
        self
    }

    pub fn with_exports_to<I, S>(mut self, package: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let package = package.into();
        self.packages.insert(package.clone());
        self.exports
            .entry(package)
            .or_default()
            .extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn with_opens(mut self, package: impl Into<String>) -> Self {
        let package = package.into();
        self.packages.insert(package.clone());
        self.opens.entry(package).or_default();
        self
    }

    pub fn with_opens_to<I, S>(mut self, package: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let package = package.into();
        self.packages.insert(package.clone());
        self.opens
            .entry(package)
            .or_default()
            .extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn with_uses(mut self, service: impl Into<String>) -> Self {
        self.uses.insert(service.into());
        self
    }

    pub fn with_provides<I, S>(mut self, service: impl Into<String>, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.provides.entry(service.into()).or_default();
        for provider in providers {
            let provider = provider.into();
            if !entry.contains(&provider) {
                entry.push(provider);
            }
        }
        self
    }

    pub fn with_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages.extend(packages.into_iter().map(Into::into));
        self
    }

    pub fn with_main_class(mut self, main_class: impl Into<String>) -> Self {
        self.main_class = Some(main_class.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    pub fn requires(&self) -> &BTreeMap<String, BTreeSet<RequiresModifier>> {
        &self.requires
    }

    pub fn exports(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.exports
    }

    pub fn opens(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.opens
    }

    pub fn uses(&self) -> &BTreeSet<String> {
        &self.uses
    }

    pub fn provides(&self) -> &BTreeMap<String, Vec<String>> {
        &self.provides
    }

    /// Every package of the module, exported or not
    pub fn packages(&self) -> &BTreeSet<String> {
        &self.packages
    }

    /// Packages that are not exported
    pub fn concealed_packages(&self) -> BTreeSet<String> {
        self.packages
            .iter()
            .filter(|package| !self.exports.contains_key(*package))
            .cloned()
            .collect()
    }

    pub fn main_class(&self) -> Option<&str> {
        self.main_class.as_deref()
    }

    pub fn requires_module(&self, module: &str) -> bool {
        self.requires.contains_key(module)
    }
}

impl fmt::Display for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.automatic {
            write!(f, "automatic ")?;
        } else if self.open {
            write!(f, "open ")?;
        }
        write!(f, "module {}", self.name)?;
        if let Some(version) = &self.version {
            write!(f, "@{version}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_tracks_packages() {
        let descriptor = ModuleDescriptor::new("com.acme.app")
            .with_exports("com.acme.app.api")
            .with_opens_to("com.acme.app.model", ["com.fasterxml.jackson.databind"])
            .with_packages(["com.acme.app.internal"]);

        assert_eq!(descriptor.packages().len(), 3);
        assert_eq!(
            descriptor.concealed_packages(),
            BTreeSet::from([
                "com.acme.app.internal".to_string(),
                "com.acme.app.model".to_string(),
            ])
        );
    }

    #[test]
    fn test_provides_keeps_declaration_order_without_duplicates() {
        let descriptor = ModuleDescriptor::new("m")
            .with_provides("s.Service", ["b.Impl", "a.Impl"])
            .with_provides("s.Service", ["b.Impl"]);
        assert_eq!(
            descriptor.provides()["s.Service"],
            vec!["b.Impl".to_string(), "a.Impl".to_string()]
        );
    }

    #[test]
    fn test_automatic_module_exports_everything() {
        let descriptor =
            ModuleDescriptor::automatic("commons.lang", vec!["org.apache.commons.lang".to_string()]);
        assert!(descriptor.is_automatic());
        assert!(descriptor.exports()["org.apache.commons.lang"].is_empty());
        assert_eq!(descriptor.to_string(), "automatic module commons.lang");
    }
}
