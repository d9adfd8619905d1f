//! Modules packaged as jar files, explicit or automatic

use super::classfile::parse_module_info;
use super::descriptor::ModuleDescriptor;
use super::finder::{MODULE_INFO_CLASS, ModuleFinder, ModuleReference, ModuleSet};
use crate::error::Result;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;
use tracing::debug;

const MANIFEST: &str = "META-INF/MANIFEST.MF";
const DEFAULT_CACHE_CAPACITY: usize = 256;

static VERSION_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+(\.|$))").unwrap());
static NON_ALPHANUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9]").unwrap());
static REPEATED_DOTS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.{2,}").unwrap());

/// Derive an automatic module name from a jar file name:
/// `commons-lang3-3.12.0.jar` becomes `commons.lang3`
pub fn automatic_module_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".jar").unwrap_or(file_name);
    let stem = match VERSION_SUFFIX_RE.find(stem) {
        Some(m) => &stem[..m.start()],
        None => stem,
    };
    let name = NON_ALPHANUMERIC_RE.replace_all(stem, ".");
    let name = REPEATED_DOTS_RE.replace_all(&name, ".");
    let name = name.trim_matches('.');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Descriptors read from jars, keyed by path and modification time so an
/// unchanged jar is only read once
#[derive(Debug, Clone)]
pub struct DescriptorCache {
    entries: Arc<Mutex<LruCache<(PathBuf, SystemTime), ModuleDescriptor>>>,
}

impl Default for DescriptorCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl DescriptorCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn get_or_read(&self, path: &Path) -> Result<Option<ModuleDescriptor>> {
        let modified = std::fs::metadata(path)?.modified()?;
        let key = (path.to_path_buf(), modified);
        if let Some(descriptor) = self.entries.lock().get(&key) {
            return Ok(Some(descriptor.clone()));
        }
        // read outside the lock
        let descriptor = read_jar_descriptor(path)?;
        if let Some(descriptor) = &descriptor {
            self.entries.lock().put(key, descriptor.clone());
        }
        Ok(descriptor)
    }
}

/// Read the descriptor of a jar: its `module-info.class` if present,
/// otherwise an automatic module. Returns `None` when no module name can
/// be derived.
pub fn read_jar_descriptor(path: &Path) -> Result<Option<ModuleDescriptor>> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;

    let mut packages = BTreeSet::new();
    for name in archive.file_names() {
        if name.starts_with("META-INF/") || !name.ends_with(".class") || name == MODULE_INFO_CLASS
        {
            continue;
        }
        if let Some((package, _)) = name.rsplit_once('/') {
            packages.insert(package.replace('/', "."));
        }
    }

    if let Ok(mut entry) = archive.by_name(MODULE_INFO_CLASS) {
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        return Ok(Some(parse_module_info(&bytes)?.with_packages(packages)));
    }

    let manifest_name = match archive.by_name(MANIFEST) {
        Ok(mut entry) => {
            let mut manifest = String::new();
            entry.read_to_string(&mut manifest)?;
            manifest.lines().find_map(|line| {
                line.strip_prefix("Automatic-Module-Name:")
                    .map(|name| name.trim().to_string())
            })
        }
        Err(_) => None,
    };
    let name = manifest_name.or_else(|| {
        path.file_name()
            .and_then(|name| automatic_module_name(&name.to_string_lossy()))
    });
    Ok(name.map(|name| ModuleDescriptor::automatic(name, packages)))
}

/// Finds modules in the jar files of a set of directories
#[derive(Debug, Clone, Default)]
pub struct JarModuleFinder {
    modules: ModuleSet,
}

impl JarModuleFinder {
    pub fn scan(dirs: &[PathBuf], cache: &DescriptorCache) -> Result<Self> {
        let mut jars = Vec::new();
        for dir in dirs {
            if !dir.is_dir() {
                debug!("Skipping missing jar directory {}", dir.display());
                continue;
            }
            let mut found = Vec::new();
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.is_file() && path.extension().is_some_and(|ext| ext == "jar") {
                    found.push(path);
                }
            }
            found.sort();
            jars.extend(found);
        }

        let mut modules = ModuleSet::default();
        for jar in jars {
            match cache.get_or_read(&jar)? {
                Some(descriptor) => {
                    debug!("Found {} in {}", descriptor, jar.display());
                    modules.insert(ModuleReference {
                        descriptor,
                        location: jar,
                    });
                }
                None => debug!("No module name for {}", jar.display()),
            }
        }
        Ok(Self { modules })
    }

    pub fn modules(&self) -> &ModuleSet {
        &self.modules
    }
}

impl ModuleFinder for JarModuleFinder {
    fn find(&self, name: &str) -> Option<ModuleDescriptor> {
        self.modules.find(name)
    }

    fn find_all(&self) -> Vec<ModuleDescriptor> {
        self.modules.find_all()
    }
}
