//! Checks that every module required by the project can be located

use super::{link, pairs, path_list};
use crate::config::{ConfigView, KeySpec, PluginConfig, SectionType, ValueKind};
use crate::error::Result;
use crate::module::{
    ComposedFinder, DescriptorCache, InMemoryFinder, JarModuleFinder, Resolution,
    SourceModuleFinder, SystemModuleFinder, merge, resolve_requires,
};
use crate::pipeline::{Plugin, WatchRegistry};
use crate::tools::Toolbox;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const NAME: &str = "resolver";

static RESOLVER_KEYS: [KeySpec; 6] = [
    KeySpec::new("javaHome", ValueKind::Path),
    KeySpec::new("moduleSourcePath", ValueKind::PathList),
    KeySpec::new("moduleTestPath", ValueKind::PathList),
    KeySpec::new("moduleDependencyPath", ValueKind::PathList),
    KeySpec::new("checkTestModules", ValueKind::Bool),
    KeySpec::new("dependencies", ValueKind::StrList),
];
pub static RESOLVER: SectionType = SectionType::new(NAME, &RESOLVER_KEYS);

/// Resolves the `requires` closure of the project's modules against the
/// project sources, the dependency jars and the runtime's own modules.
///
/// `resolver.dependencies` maps module names to artifact coordinates
/// (`module=group:artifact:version`). When an artifact resolver is
/// available, missing modules listed there are fetched into the first
/// dependency directory and the check runs again.
#[derive(Debug, Clone)]
pub struct ResolverPlugin {
    toolbox: Toolbox,
    cache: DescriptorCache,
}

impl ResolverPlugin {
    pub fn new(toolbox: Toolbox) -> Self {
        Self {
            toolbox,
            cache: DescriptorCache::default(),
        }
    }

    /// Resolve the project's source modules (and test modules when
    /// `include_tests` is set). A test module named like a main module is
    /// checked as the merge of both descriptors, the way it is compiled.
    pub fn check(&self, config: &ConfigView<'_>, include_tests: bool) -> Result<Resolution> {
        let sources = SourceModuleFinder::scan(&path_list(config, "resolver.moduleSourcePath")?)?;
        let mut names: Vec<String> = sources.modules().names().map(str::to_string).collect();

        let mut tests = Vec::new();
        if include_tests {
            let test_sources =
                SourceModuleFinder::scan(&path_list(config, "resolver.moduleTestPath")?)?;
            for test in test_sources.modules().references() {
                let descriptor = match sources.modules().get(test.descriptor.name()) {
                    Some(main) => merge(&main.descriptor, &test.descriptor),
                    None => {
                        names.push(test.descriptor.name().to_string());
                        test.descriptor.clone()
                    }
                };
                debug!("Checking test module {}", descriptor.name());
                tests.push(descriptor);
            }
        }

        let dependencies = JarModuleFinder::scan(
            &path_list(config, "resolver.moduleDependencyPath")?,
            &self.cache,
        )?;
        let java_home: PathBuf = config.get("resolver.javaHome")?;
        let finder = ComposedFinder::new()
            .with(InMemoryFinder::new(tests))
            .with(sources)
            .with(dependencies)
            .with(system_modules(&java_home));

        Ok(resolve_requires(&finder, names))
    }

    /// Fetch the artifacts of unresolved modules; returns whether anything
    /// was fetched
    fn fetch_missing(&self, config: &ConfigView<'_>, resolution: &Resolution) -> Result<bool> {
        let Some(artifacts) = &self.toolbox.artifacts else {
            return Ok(false);
        };
        let declared: Vec<String> = config.get_or("resolver.dependencies", Vec::new())?;
        let coordinates: Vec<String> = pairs(&declared)
            .into_iter()
            .filter(|(module, _)| resolution.unresolved().contains_key(*module))
            .map(|(_, coordinates)| coordinates.to_string())
            .collect();
        if coordinates.is_empty() {
            return Ok(false);
        }
        let Some(into) = path_list(config, "resolver.moduleDependencyPath")?
            .into_iter()
            .next()
        else {
            warn!("No dependency directory to download {:?} into", coordinates);
            return Ok(false);
        };
        let fetched = artifacts.resolve(&coordinates, &into)?;
        info!("Fetched {} artifacts into {}", fetched.len(), into.display());
        Ok(!fetched.is_empty())
    }
}

/// The runtime's modules, or just `java.base` when the runtime cannot be
/// inspected
pub(crate) fn system_modules(java_home: &Path) -> SystemModuleFinder {
    SystemModuleFinder::from_java_home(java_home).unwrap_or_else(|e| {
        warn!(
            "Cannot read system modules of {}: {}",
            java_home.display(),
            e
        );
        SystemModuleFinder::default()
    })
}

impl Plugin for ResolverPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        config.get_or_create(NAME, &RESOLVER)?;
        config.set_default("resolver.checkTestModules", false)?;
        config.set_default("resolver.dependencies", Vec::<String>::new())
    }

    fn configure(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        link(config, "resolver.javaHome", "convention.javaHome")?;
        link(config, "resolver.moduleSourcePath", "convention.javaModuleSourcePath")?;
        link(config, "resolver.moduleTestPath", "convention.javaModuleTestPath")?;
        link(
            config,
            "resolver.moduleDependencyPath",
            "convention.javaModuleDependencyPath",
        )
    }

    fn watch(&self, config: &ConfigView<'_>, registry: &mut WatchRegistry) -> Result<()> {
        registry.watch_all(path_list(config, "resolver.moduleSourcePath")?);
        registry.watch_all(path_list(config, "resolver.moduleDependencyPath")?);
        Ok(())
    }

    fn execute(&self, config: &ConfigView<'_>) -> Result<i32> {
        let include_tests: bool = config.get_or("resolver.checkTestModules", false)?;
        let mut resolution = self.check(config, include_tests)?;
        if !resolution.is_success() && self.fetch_missing(config, &resolution)? {
            resolution = self.check(config, include_tests)?;
        }

        info!("Resolved {} modules", resolution.reachable().len());
        if resolution.is_success() {
            return Ok(0);
        }
        for (module, chain) in resolution.unresolved() {
            error!("Module {} not found: {}", module, chain);
        }
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigTree, Settings};
    use crate::error::Error;
    use crate::pipeline::{Pipeline, PluginRegistry};
    use crate::plugins::ConventionPlugin;
    use crate::tools::ArtifactResolver;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn project(dir: &Path) {
        let module = dir.join("src/main/java/com.acme.app");
        fs::create_dir_all(&module).unwrap();
        fs::write(
            module.join("module-info.java"),
            "module com.acme.app { requires com.acme.lib; requires java.logging; }",
        )
        .unwrap();
    }

    fn configured(dir: &Path, toolbox: Toolbox) -> (Pipeline, ConfigTree) {
        let mut registry = PluginRegistry::new();
        registry.register(ConventionPlugin);
        registry.register(ResolverPlugin::new(toolbox));
        let mut pipeline = Pipeline::new(registry);
        let mut tree = ConfigTree::new();
        let mut settings = Settings::new();
        settings.push("convention.projectDir", dir.to_path_buf());
        // a runtime without a release file only provides java.base
        settings.push("convention.javaHome", dir.join("no-jdk"));
        pipeline.setup(&mut tree, &settings).unwrap();
        (pipeline, tree)
    }

    #[test]
    fn test_reports_every_missing_module() {
        let temp_dir = TempDir::new().unwrap();
        project(temp_dir.path());
        let (mut pipeline, tree) = configured(temp_dir.path(), Toolbox::default());

        assert_eq!(pipeline.execute(&tree, &["resolver"]).unwrap(), 1);

        let plugin = ResolverPlugin::new(Toolbox::default());
        let resolution = plugin.check(&tree.view(), false).unwrap();
        let missing: Vec<_> = resolution.unresolved().keys().cloned().collect();
        assert_eq!(missing, vec!["com.acme.lib", "java.logging"]);
        assert_eq!(
            resolution.unresolved()["com.acme.lib"].to_string(),
            "com.acme.app -> com.acme.lib"
        );
    }

    struct FakeRepository;

    impl ArtifactResolver for FakeRepository {
        fn resolve(&self, coordinates: &[String], into: &Path) -> Result<Vec<PathBuf>> {
            if coordinates != ["com.acme:lib:1.0".to_string()] {
                return Err(Error::Artifact(format!("unexpected {coordinates:?}")));
            }
            fs::create_dir_all(into)?;
            let jar = into.join("lib-1.0.jar");
            let mut zip = zip::ZipWriter::new(fs::File::create(&jar)?);
            zip.start_file(
                "META-INF/MANIFEST.MF",
                zip::write::SimpleFileOptions::default(),
            )?;
            std::io::Write::write_all(&mut zip, b"Automatic-Module-Name: com.acme.lib\n")?;
            zip.finish()?;
            Ok(vec![jar])
        }
    }

    #[test]
    fn test_fetches_declared_dependencies() {
        let temp_dir = TempDir::new().unwrap();
        let module = temp_dir.path().join("src/main/java/com.acme.app");
        fs::create_dir_all(&module).unwrap();
        fs::write(
            module.join("module-info.java"),
            "module com.acme.app { requires com.acme.lib; }",
        )
        .unwrap();

        let toolbox = Toolbox::default().with_artifacts(Arc::new(FakeRepository));
        let (mut pipeline, mut tree) = configured(temp_dir.path(), toolbox);
        tree.set(
            "resolver.dependencies",
            vec!["com.acme.lib=com.acme:lib:1.0"],
        )
        .unwrap();

        assert_eq!(pipeline.execute(&tree, &["resolver"]).unwrap(), 0);
        assert!(temp_dir.path().join("deps/lib-1.0.jar").is_file());
    }

    fn test_project(dir: &Path) {
        let main = dir.join("src/main/java/com.acme.app");
        let test = dir.join("src/test/java/com.acme.app");
        fs::create_dir_all(&main).unwrap();
        fs::create_dir_all(&test).unwrap();
        fs::write(main.join("module-info.java"), "module com.acme.app { }").unwrap();
        fs::write(
            test.join("module-info.java"),
            "open module com.acme.app { requires org.junit.jupiter.api; }",
        )
        .unwrap();
    }

    #[test]
    fn test_test_module_requires_are_checked() {
        let temp_dir = TempDir::new().unwrap();
        test_project(temp_dir.path());
        let (mut pipeline, mut tree) = configured(temp_dir.path(), Toolbox::default());

        let plugin = ResolverPlugin::new(Toolbox::default());
        assert!(plugin.check(&tree.view(), false).unwrap().is_success());

        let resolution = plugin.check(&tree.view(), true).unwrap();
        assert!(!resolution.is_success());
        assert!(resolution.reachable().contains("com.acme.app"));
        assert_eq!(
            resolution.unresolved()["org.junit.jupiter.api"].to_string(),
            "com.acme.app -> org.junit.jupiter.api"
        );

        assert_eq!(pipeline.execute(&tree, &["resolver"]).unwrap(), 0);
        tree.set("resolver.checkTestModules", true).unwrap();
        assert_eq!(pipeline.execute(&tree, &["resolver"]).unwrap(), 1);
    }

    #[test]
    fn test_test_only_module_is_a_root() {
        let temp_dir = TempDir::new().unwrap();
        let test = temp_dir.path().join("src/test/java/com.acme.it");
        fs::create_dir_all(&test).unwrap();
        fs::write(
            test.join("module-info.java"),
            "module com.acme.it { requires com.acme.fixtures; }",
        )
        .unwrap();
        let (_pipeline, tree) = configured(temp_dir.path(), Toolbox::default());

        let resolution = ResolverPlugin::new(Toolbox::default())
            .check(&tree.view(), true)
            .unwrap();
        assert_eq!(
            resolution.unresolved()["com.acme.fixtures"].to_string(),
            "com.acme.it -> com.acme.fixtures"
        );
    }
}
