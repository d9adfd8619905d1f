//! Module finders: uniform lookup of descriptors across module sources

use super::classfile::parse_module_info;
use super::descriptor::{JAVA_BASE, ModuleDescriptor};
use crate::error::Result;
use crate::parser::parse_module_file;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const MODULE_INFO_SOURCE: &str = "module-info.java";
pub const MODULE_INFO_CLASS: &str = "module-info.class";

/// A source of module descriptors
pub trait ModuleFinder: Send + Sync {
    /// Find the descriptor of a module by name
    fn find(&self, name: &str) -> Option<ModuleDescriptor>;

    /// All descriptors this finder knows about
    fn find_all(&self) -> Vec<ModuleDescriptor>;
}

/// A descriptor together with the directory or file it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    pub descriptor: ModuleDescriptor,
    pub location: PathBuf,
}

/// Modules collected from disk, keyed by name. The first root that
/// declares a module wins.
#[derive(Debug, Clone, Default)]
pub struct ModuleSet {
    modules: BTreeMap<String, ModuleReference>,
}

impl ModuleSet {
    pub fn insert(&mut self, reference: ModuleReference) {
        let name = reference.descriptor.name().to_string();
        if let Some(existing) = self.modules.get(&name) {
            warn!(
                "Module {} in {} is shadowed by {}",
                name,
                reference.location.display(),
                existing.location.display()
            );
            return;
        }
        self.modules.insert(name, reference);
    }

    pub fn get(&self, name: &str) -> Option<&ModuleReference> {
        self.modules.get(name)
    }

    pub fn location(&self, name: &str) -> Option<&Path> {
        self.modules.get(name).map(|r| r.location.as_path())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn references(&self) -> impl Iterator<Item = &ModuleReference> {
        self.modules.values()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ModuleFinder for ModuleSet {
    fn find(&self, name: &str) -> Option<ModuleDescriptor> {
        self.modules.get(name).map(|r| r.descriptor.clone())
    }

    fn find_all(&self) -> Vec<ModuleDescriptor> {
        self.modules.values().map(|r| r.descriptor.clone()).collect()
    }
}

/// Descriptors held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryFinder {
    modules: BTreeMap<String, ModuleDescriptor>,
}

impl InMemoryFinder {
    pub fn new(descriptors: impl IntoIterator<Item = ModuleDescriptor>) -> Self {
        Self {
            modules: descriptors
                .into_iter()
                .map(|d| (d.name().to_string(), d))
                .collect(),
        }
    }
}

impl ModuleFinder for InMemoryFinder {
    fn find(&self, name: &str) -> Option<ModuleDescriptor> {
        self.modules.get(name).cloned()
    }

    fn find_all(&self) -> Vec<ModuleDescriptor> {
        self.modules.values().cloned().collect()
    }
}

/// Finds modules in exploded source trees laid out as
/// `<root>/<module>/module-info.java`
#[derive(Debug, Clone, Default)]
pub struct SourceModuleFinder {
    modules: ModuleSet,
}

impl SourceModuleFinder {
    pub fn scan(roots: &[PathBuf]) -> Result<Self> {
        let mut modules = ModuleSet::default();
        for dir in module_directories(roots, MODULE_INFO_SOURCE)? {
            let descriptor = parse_module_file(&dir.join(MODULE_INFO_SOURCE))?
                .with_packages(packages_under(&dir, "java"));
            debug!("Found source module {} in {}", descriptor.name(), dir.display());
            modules.insert(ModuleReference {
                descriptor,
                location: dir,
            });
        }
        Ok(Self { modules })
    }

    pub fn modules(&self) -> &ModuleSet {
        &self.modules
    }
}

impl ModuleFinder for SourceModuleFinder {
    fn find(&self, name: &str) -> Option<ModuleDescriptor> {
        self.modules.find(name)
    }

    fn find_all(&self) -> Vec<ModuleDescriptor> {
        self.modules.find_all()
    }
}

/// Finds compiled modules laid out as `<dir>/<module>/module-info.class`
#[derive(Debug, Clone, Default)]
pub struct CompiledModuleFinder {
    modules: ModuleSet,
}

impl CompiledModuleFinder {
    pub fn scan(dirs: &[PathBuf]) -> Result<Self> {
        let mut modules = ModuleSet::default();
        for dir in module_directories(dirs, MODULE_INFO_CLASS)? {
            let bytes = std::fs::read(dir.join(MODULE_INFO_CLASS))?;
            let descriptor = parse_module_info(&bytes)?.with_packages(packages_under(&dir, "class"));
            debug!("Found compiled module {} in {}", descriptor.name(), dir.display());
            modules.insert(ModuleReference {
                descriptor,
                location: dir,
            });
        }
        Ok(Self { modules })
    }

    pub fn modules(&self) -> &ModuleSet {
        &self.modules
    }
}

impl ModuleFinder for CompiledModuleFinder {
    fn find(&self, name: &str) -> Option<ModuleDescriptor> {
        self.modules.find(name)
    }

    fn find_all(&self) -> Vec<ModuleDescriptor> {
        self.modules.find_all()
    }
}

/// The modules built into the host runtime
#[derive(Debug, Clone)]
pub struct SystemModuleFinder {
    modules: BTreeMap<String, ModuleDescriptor>,
}

impl Default for SystemModuleFinder {
    fn default() -> Self {
        Self::from_names(std::iter::empty::<String>(), None)
    }
}

impl SystemModuleFinder {
    /// System modules with the given names; `java.base` is always present
    pub fn from_names<I, S>(names: I, version: Option<&str>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        names.insert(JAVA_BASE.to_string());
        let modules = names
            .into_iter()
            .map(|name| {
                let mut descriptor = ModuleDescriptor::new(name.clone());
                if let Some(version) = version {
                    descriptor = descriptor.with_version(version);
                }
                (name, descriptor)
            })
            .collect();
        Self { modules }
    }

    /// Read the module list from the `release` file of a JDK installation
    pub fn from_java_home(java_home: &Path) -> Result<Self> {
        let release = std::fs::read_to_string(java_home.join("release"))?;
        let mut names = Vec::new();
        let mut version = None;
        for line in release.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"');
            match key.trim() {
                "MODULES" => names.extend(value.split_whitespace().map(str::to_string)),
                "JAVA_VERSION" => version = Some(value.to_string()),
                _ => {}
            }
        }
        debug!(
            "Found {} system modules in {}",
            names.len(),
            java_home.display()
        );
        Ok(Self::from_names(names, version.as_deref()))
    }
}

impl ModuleFinder for SystemModuleFinder {
    fn find(&self, name: &str) -> Option<ModuleDescriptor> {
        self.modules.get(name).cloned()
    }

    fn find_all(&self) -> Vec<ModuleDescriptor> {
        self.modules.values().cloned().collect()
    }
}

/// Several finders queried in order; the first finder that knows a module
/// wins
#[derive(Default)]
pub struct ComposedFinder {
    finders: Vec<Box<dyn ModuleFinder>>,
}

impl ComposedFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, finder: impl ModuleFinder + 'static) -> Self {
        self.finders.push(Box::new(finder));
        self
    }

    pub fn push(&mut self, finder: Box<dyn ModuleFinder>) {
        self.finders.push(finder);
    }
}

impl std::fmt::Debug for ComposedFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedFinder")
            .field("finders", &self.finders.len())
            .finish()
    }
}

impl ModuleFinder for ComposedFinder {
    fn find(&self, name: &str) -> Option<ModuleDescriptor> {
        self.finders.iter().find_map(|finder| finder.find(name))
    }

    fn find_all(&self) -> Vec<ModuleDescriptor> {
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        for descriptor in self.finders.iter().flat_map(|finder| finder.find_all()) {
            if seen.contains(descriptor.name()) {
                continue;
            }
            seen.insert(descriptor.name().to_string());
            all.push(descriptor);
        }
        all
    }
}

/// Immediate sub-directories of `roots` that contain `marker`, in sorted
/// order. Missing roots are skipped.
fn module_directories(roots: &[PathBuf], marker: &str) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for root in roots {
        if !root.is_dir() {
            debug!("Skipping missing module root {}", root.display());
            continue;
        }
        let mut children = Vec::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if path.join(marker).is_file() {
                children.push(path);
            }
        }
        children.sort();
        dirs.extend(children);
    }
    Ok(dirs)
}

/// Packages of a module directory: every sub-directory holding at least one
/// file with the given extension, as a dotted name relative to `dir`
pub(crate) fn packages_under(dir: &Path, extension: &str) -> BTreeSet<String> {
    WalkDir::new(dir)
        .min_depth(2)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == extension))
        .filter_map(|entry| {
            let parent = entry.path().parent()?.strip_prefix(dir).ok()?;
            let segments: Vec<_> = parent
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(segments.join("."))
        })
        .collect()
}
