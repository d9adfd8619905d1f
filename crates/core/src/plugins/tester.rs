//! Runs the compiled test modules on a separate runtime

use super::{link, path_list};
use crate::config::{ConfigView, KeySpec, PluginConfig, SectionType, ValueKind};
use crate::error::Result;
use crate::module::CompiledModuleFinder;
use crate::pipeline::Plugin;
use crate::tools::{CommandLine, Toolbox};
use std::path::PathBuf;
use tracing::{info, warn};

pub const NAME: &str = "tester";

/// Module of the default console test launcher
pub const DEFAULT_RUNNER: &str = "org.junit.platform.console";

static TESTER_KEYS: [KeySpec; 5] = [
    KeySpec::new("javaHome", ValueKind::Path),
    KeySpec::new("moduleExplodedTestPath", ValueKind::Path),
    KeySpec::new("moduleDependencyPath", ValueKind::PathList),
    KeySpec::new("runnerModule", ValueKind::Str),
    KeySpec::new("arguments", ValueKind::StrList),
];
pub static TESTER: SectionType = SectionType::new(NAME, &TESTER_KEYS);

#[derive(Debug, Clone)]
pub struct TesterPlugin {
    toolbox: Toolbox,
}

impl TesterPlugin {
    pub fn new(toolbox: Toolbox) -> Self {
        Self { toolbox }
    }
}

impl Plugin for TesterPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        config.get_or_create(NAME, &TESTER)?;
        config.set_default("tester.runnerModule", DEFAULT_RUNNER)?;
        config.set_default("tester.arguments", Vec::<String>::new())
    }

    fn configure(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        link(config, "tester.javaHome", "convention.javaHome")?;
        link(
            config,
            "tester.moduleExplodedTestPath",
            "convention.javaModuleExplodedTestPath",
        )?;
        link(
            config,
            "tester.moduleDependencyPath",
            "convention.javaModuleDependencyPath",
        )
    }

    fn execute(&self, config: &ConfigView<'_>) -> Result<i32> {
        let exploded: PathBuf = config.get("tester.moduleExplodedTestPath")?;
        let tests = CompiledModuleFinder::scan(std::slice::from_ref(&exploded))?;
        if tests.modules().is_empty() {
            info!("No test modules to run");
            return Ok(0);
        }

        let mut module_path = vec![exploded];
        module_path.extend(path_list(config, "tester.moduleDependencyPath")?);
        let runner: String = config.get_or("tester.runnerModule", DEFAULT_RUNNER.to_string())?;
        let extra: Vec<String> = config.get_or("tester.arguments", Vec::new())?;

        let java_home: PathBuf = config.get("tester.javaHome")?;
        let launcher = self.toolbox.locator.launcher(&java_home);
        for name in tests.modules().names() {
            let args = CommandLine::new()
                .paths("--module-path", &module_path)
                .option("--add-modules", name)
                .option("--module", &runner)
                .option("--select-module", name)
                .args(extra.iter().cloned())
                .build();
            info!("Testing {}", name);
            let mut process = launcher.start(&args)?;
            for line in process.output_lines() {
                println!("{line}");
            }
            let code = process.wait_for()?;
            if code != 0 {
                warn!("Tests of {} failed with exit code {}", name, code);
                return Ok(code);
            }
        }
        Ok(0)
    }
}
