//! Compiles the main modules, then each test module merged with its
//! library counterpart

use super::{link, path_list};
use crate::config::{ConfigView, KeySpec, PluginConfig, SectionType, ValueKind};
use crate::error::Result;
use crate::module::{ModuleReference, SourceModuleFinder, merge, render_source};
use crate::module::finder::MODULE_INFO_SOURCE;
use crate::pipeline::{Plugin, WatchRegistry};
use crate::tools::{CommandLine, ToolProvider, Toolbox, join_paths};
use std::io;
use std::path::PathBuf;
use tracing::{debug, info};

pub const NAME: &str = "compiler";

static COMPILER_KEYS: [KeySpec; 11] = [
    KeySpec::new("javaHome", ValueKind::Path),
    KeySpec::new("release", ValueKind::Int),
    KeySpec::new("verbose", ValueKind::Bool),
    KeySpec::new("lint", ValueKind::Str),
    KeySpec::new("rawArguments", ValueKind::StrList),
    KeySpec::new("moduleSourcePath", ValueKind::PathList),
    KeySpec::new("moduleTestPath", ValueKind::PathList),
    KeySpec::new("moduleDependencyPath", ValueKind::PathList),
    KeySpec::new("moduleExplodedSourcePath", ValueKind::Path),
    KeySpec::new("moduleExplodedTestPath", ValueKind::Path),
    KeySpec::new("moduleMergedTestPath", ValueKind::Path),
];
pub static COMPILER: SectionType = SectionType::new(NAME, &COMPILER_KEYS);

#[derive(Debug, Clone)]
pub struct CompilerPlugin {
    toolbox: Toolbox,
}

impl CompilerPlugin {
    pub fn new(toolbox: Toolbox) -> Self {
        Self { toolbox }
    }

    /// Flags shared by the main and test compilations
    fn options(config: &ConfigView<'_>) -> Result<CommandLine> {
        let release: Option<i64> = config.get_opt("compiler.release")?;
        let lint: Option<String> = config.get_opt("compiler.lint")?;
        let raw: Vec<String> = config.get_or("compiler.rawArguments", Vec::new())?;
        Ok(CommandLine::new()
            .flag("-verbose", config.get_or("compiler.verbose", false)?)
            .option_opt("--release", release)
            .args(lint.map(|lint| format!("-Xlint:{lint}")))
            .args(raw))
    }

    fn compile_test_module(
        &self,
        javac: &dyn ToolProvider,
        config: &ConfigView<'_>,
        test: &ModuleReference,
        main: Option<&ModuleReference>,
    ) -> Result<i32> {
        let name = test.descriptor.name();
        let mut source_dirs = Vec::new();
        if let Some(main) = main {
            let merged_dir: PathBuf = config
                .get::<PathBuf>("compiler.moduleMergedTestPath")?
                .join(name);
            std::fs::create_dir_all(&merged_dir)?;
            let merged = merge(&main.descriptor, &test.descriptor);
            std::fs::write(merged_dir.join(MODULE_INFO_SOURCE), render_source(&merged))?;
            debug!("Wrote merged descriptor of {} to {}", name, merged_dir.display());
            source_dirs.push(merged_dir);
            source_dirs.push(test.location.clone());
            source_dirs.push(main.location.clone());
        } else {
            source_dirs.push(test.location.clone());
        }

        let mut module_path = vec![config.get::<PathBuf>("compiler.moduleExplodedSourcePath")?];
        module_path.extend(path_list(config, "compiler.moduleDependencyPath")?);

        let args = Self::options(config)?
            .path("-d", &config.get::<PathBuf>("compiler.moduleExplodedTestPath")?)
            .option(
                "--module-source-path",
                format!("{name}={}", join_paths(&source_dirs)),
            )
            .paths("--module-path", &existing(module_path))
            .option("--module", name)
            .build();
        info!("Compiling test module {}", name);
        javac.run(&mut io::stdout(), &mut io::stderr(), &args)
    }
}

/// Drop directories that do not exist; the compiler rejects them on the
/// module path
fn existing(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.into_iter().filter(|path| path.exists()).collect()
}

fn module_names(finder: &SourceModuleFinder) -> String {
    finder.modules().names().collect::<Vec<_>>().join(",")
}

impl Plugin for CompilerPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        config.get_or_create(NAME, &COMPILER)?;
        config.set_default("compiler.verbose", false)?;
        config.set_default("compiler.rawArguments", Vec::<String>::new())
    }

    fn configure(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        link(config, "compiler.javaHome", "convention.javaHome")?;
        link(config, "compiler.moduleSourcePath", "convention.javaModuleSourcePath")?;
        link(config, "compiler.moduleTestPath", "convention.javaModuleTestPath")?;
        link(
            config,
            "compiler.moduleDependencyPath",
            "convention.javaModuleDependencyPath",
        )?;
        link(
            config,
            "compiler.moduleExplodedSourcePath",
            "convention.javaModuleExplodedSourcePath",
        )?;
        link(
            config,
            "compiler.moduleExplodedTestPath",
            "convention.javaModuleExplodedTestPath",
        )?;
        link(
            config,
            "compiler.moduleMergedTestPath",
            "convention.javaModuleMergedTestPath",
        )
    }

    fn watch(&self, config: &ConfigView<'_>, registry: &mut WatchRegistry) -> Result<()> {
        registry.watch_all(path_list(config, "compiler.moduleSourcePath")?);
        registry.watch_all(path_list(config, "compiler.moduleTestPath")?);
        Ok(())
    }

    fn execute(&self, config: &ConfigView<'_>) -> Result<i32> {
        let java_home: PathBuf = config.get("compiler.javaHome")?;
        let javac = self.toolbox.locator.tool(&java_home, "javac");

        let source_path = path_list(config, "compiler.moduleSourcePath")?;
        let main = SourceModuleFinder::scan(&source_path)?;
        if main.modules().is_empty() {
            info!("No modules to compile");
        } else {
            let args = Self::options(config)?
                .path("-d", &config.get::<PathBuf>("compiler.moduleExplodedSourcePath")?)
                .paths("--module-source-path", &source_path)
                .paths(
                    "--module-path",
                    &existing(path_list(config, "compiler.moduleDependencyPath")?),
                )
                .option("--module", module_names(&main))
                .build();
            info!("Compiling {} modules", main.modules().len());
            let code = javac.run(&mut io::stdout(), &mut io::stderr(), &args)?;
            if code != 0 {
                return Ok(code);
            }
        }

        let tests = SourceModuleFinder::scan(&path_list(config, "compiler.moduleTestPath")?)?;
        for test in tests.modules().references() {
            let counterpart = main.modules().get(test.descriptor.name());
            let code = self.compile_test_module(javac.as_ref(), config, test, counterpart)?;
            if code != 0 {
                return Ok(code);
            }
        }
        Ok(0)
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
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn run(dir: &Path, recorder: &Recorder) -> i32 {
        let mut registry = PluginRegistry::new();
        registry.register(ConventionPlugin);
        registry.register(CompilerPlugin::new(
            Toolbox::default().with_locator(Arc::new(recorder.clone())),
        ));
        let mut settings = Settings::new();
        settings.push("convention.projectDir", dir.to_path_buf());
        settings.push("compiler.release", 21);
        Pipeline::new(registry)
            .run(&mut ConfigTree::new(), &settings, &["compiler"])
            .unwrap()
    }

    #[test]
    fn test_compiles_main_then_merged_tests() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write(
            &dir.join("src/main/java/com.acme.app/module-info.java"),
            "module com.acme.app { exports com.acme.app; }",
        );
        write(
            &dir.join("src/test/java/com.acme.app/module-info.java"),
            "open module com.acme.app { requires org.junit.jupiter.api; }",
        );

        let recorder = Recorder::default();
        assert_eq!(run(dir, &recorder), 0);

        let calls = recorder.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0][0], "javac");
        assert!(calls[0].contains(&"--release".to_string()));
        assert_eq!(calls[0].last().map(String::as_str), Some("com.acme.app"));

        let merged = fs::read_to_string(
            dir.join("target/test/merged/com.acme.app")
                .join(MODULE_INFO_SOURCE),
        )
        .unwrap();
        assert!(merged.starts_with("open module com.acme.app {"));
        assert!(merged.contains("requires org.junit.jupiter.api;"));
        assert!(
            calls[1]
                .iter()
                .any(|arg| arg.starts_with("com.acme.app=") && arg.contains("merged"))
        );
    }

    #[test]
    fn test_failure_stops_before_tests() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write(
            &dir.join("src/main/java/m/module-info.java"),
            "module m { }",
        );
        write(
            &dir.join("src/test/java/m/module-info.java"),
            "module m { }",
        );
        let recorder = Recorder::failing(2);
        assert_eq!(run(dir, &recorder), 2);
        assert_eq!(recorder.calls().len(), 1);
    }
}
