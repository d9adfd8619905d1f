//! API documentation of the main modules

use super::{link, path_list};
use crate::config::{ConfigView, KeySpec, PluginConfig, SectionType, ValueKind};
use crate::error::Result;
use crate::module::SourceModuleFinder;
use crate::pipeline::{Plugin, WatchRegistry};
use crate::tools::{CommandLine, Toolbox};
use std::io;
use std::path::PathBuf;
use tracing::info;

pub const NAME: &str = "docer";

static DOCER_KEYS: [KeySpec; 6] = [
    KeySpec::new("javaHome", ValueKind::Path),
    KeySpec::new("moduleSourcePath", ValueKind::PathList),
    KeySpec::new("moduleDependencyPath", ValueKind::PathList),
    KeySpec::new("moduleDocPath", ValueKind::Path),
    KeySpec::new("quiet", ValueKind::Bool),
    KeySpec::new("link", ValueKind::Str),
];
pub static DOCER: SectionType = SectionType::new(NAME, &DOCER_KEYS);

#[derive(Debug, Clone)]
pub struct DocerPlugin {
    toolbox: Toolbox,
}

impl DocerPlugin {
    pub fn new(toolbox: Toolbox) -> Self {
        Self { toolbox }
    }
}

impl Plugin for DocerPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        config.get_or_create(NAME, &DOCER)?;
        config.set_default("docer.quiet", true)
    }

    fn configure(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        link(config, "docer.javaHome", "convention.javaHome")?;
        link(config, "docer.moduleSourcePath", "convention.javaModuleSourcePath")?;
        link(
            config,
            "docer.moduleDependencyPath",
            "convention.javaModuleDependencyPath",
        )?;
        link(config, "docer.moduleDocPath", "convention.javaModuleDocPath")
    }

    fn watch(&self, config: &ConfigView<'_>, registry: &mut WatchRegistry) -> Result<()> {
        registry.watch_all(path_list(config, "docer.moduleSourcePath")?);
        Ok(())
    }

    fn execute(&self, config: &ConfigView<'_>) -> Result<i32> {
        let source_path = path_list(config, "docer.moduleSourcePath")?;
        let modules = SourceModuleFinder::scan(&source_path)?;
        if modules.modules().is_empty() {
            info!("No modules to document");
            return Ok(0);
        }

        let dependencies: Vec<PathBuf> = path_list(config, "docer.moduleDependencyPath")?
            .into_iter()
            .filter(|dir| dir.exists())
            .collect();
        let link: Option<String> = config.get_opt("docer.link")?;
        let args = CommandLine::new()
            .flag("-quiet", config.get_or("docer.quiet", true)?)
            .path("-d", &config.get::<PathBuf>("docer.moduleDocPath")?)
            .paths("--module-source-path", &source_path)
            .paths("--module-path", &dependencies)
            .option_opt("-link", link)
            .option(
                "--module",
                modules.modules().names().collect::<Vec<_>>().join(","),
            )
            .build();

        let java_home: PathBuf = config.get("docer.javaHome")?;
        let javadoc = self.toolbox.locator.tool(&java_home, "javadoc");
        javadoc.run(&mut io::stdout(), &mut io::stderr(), &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigTree, Settings};
    use crate::pipeline::{Pipeline, PluginRegistry};
    use crate::plugins::ConventionPlugin;
    use crate::plugins::testing::Recorder;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn pipeline(recorder: &Recorder) -> Pipeline {
        let mut registry = PluginRegistry::new();
        registry.register(ConventionPlugin);
        registry.register(DocerPlugin::new(
            Toolbox::default().with_locator(Arc::new(recorder.clone())),
        ));
        Pipeline::new(registry)
    }

    #[test]
    fn test_documents_all_modules() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a.one", "a.two"] {
            let dir = temp_dir.path().join("src/main/java").join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("module-info.java"), format!("module {name} {{ }}")).unwrap();
        }
        let mut settings = Settings::new();
        settings.push("convention.projectDir", temp_dir.path().to_path_buf());

        let recorder = Recorder::default();
        let code = pipeline(&recorder)
            .run(&mut ConfigTree::new(), &settings, &["docer"])
            .unwrap();
        assert_eq!(code, 0);

        let calls = recorder.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], "javadoc");
        assert_eq!(calls[0][1], "-quiet");
        assert_eq!(calls[0].last().map(String::as_str), Some("a.one,a.two"));
        assert!(!calls[0].contains(&"--module-path".to_string()));
    }

    #[test]
    fn test_nothing_to_document() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = Settings::new();
        settings.push("convention.projectDir", temp_dir.path().to_path_buf());
        let recorder = Recorder::default();
        let code = pipeline(&recorder)
            .run(&mut ConfigTree::new(), &settings, &["docer"])
            .unwrap();
        assert_eq!(code, 0);
        assert!(recorder.calls().is_empty());
    }
}
