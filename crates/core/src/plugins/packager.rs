//! Modular jars from the compiled main modules

use super::{link, pairs};
use crate::config::{ConfigView, KeySpec, PluginConfig, SectionType, ValueKind};
use crate::error::Result;
use crate::module::CompiledModuleFinder;
use crate::pipeline::Plugin;
use crate::tools::{CommandLine, Toolbox};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use tracing::info;

pub const NAME: &str = "packager";

static PACKAGER_KEYS: [KeySpec; 5] = [
    KeySpec::new("javaHome", ValueKind::Path),
    KeySpec::new("moduleExplodedSourcePath", ValueKind::Path),
    KeySpec::new("moduleArtifactSourcePath", ValueKind::Path),
    KeySpec::new("moduleVersion", ValueKind::Str),
    KeySpec::new("mainClasses", ValueKind::StrList),
];
pub static PACKAGER: SectionType = SectionType::new(NAME, &PACKAGER_KEYS);

/// Archives every compiled module as `<artifact dir>/<module>.jar`.
///
/// `packager.mainClasses` holds `module=class` entries; a module without
/// one keeps the main class recorded in its descriptor, if any.
#[derive(Debug, Clone)]
pub struct PackagerPlugin {
    toolbox: Toolbox,
}

impl PackagerPlugin {
    pub fn new(toolbox: Toolbox) -> Self {
        Self { toolbox }
    }
}

impl Plugin for PackagerPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        config.get_or_create(NAME, &PACKAGER)?;
        config.set_default("packager.mainClasses", Vec::<String>::new())
    }

    fn configure(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        link(config, "packager.javaHome", "convention.javaHome")?;
        link(
            config,
            "packager.moduleExplodedSourcePath",
            "convention.javaModuleExplodedSourcePath",
        )?;
        link(
            config,
            "packager.moduleArtifactSourcePath",
            "convention.javaModuleArtifactSourcePath",
        )
    }

    fn execute(&self, config: &ConfigView<'_>) -> Result<i32> {
        let exploded: PathBuf = config.get("packager.moduleExplodedSourcePath")?;
        let compiled = CompiledModuleFinder::scan(&[exploded])?;
        if compiled.modules().is_empty() {
            info!("No compiled modules to package");
            return Ok(0);
        }

        let artifacts: PathBuf = config.get("packager.moduleArtifactSourcePath")?;
        std::fs::create_dir_all(&artifacts)?;
        let version: Option<String> = config.get_opt("packager.moduleVersion")?;
        let entries: Vec<String> = config.get_or("packager.mainClasses", Vec::new())?;
        let main_classes: HashMap<&str, &str> = pairs(&entries).into_iter().collect();

        let java_home: PathBuf = config.get("packager.javaHome")?;
        let jar = self.toolbox.locator.tool(&java_home, "jar");
        for module in compiled.modules().references() {
            let name = module.descriptor.name();
            let main_class = main_classes
                .get(name)
                .copied()
                .or(module.descriptor.main_class());
            let file = artifacts.join(format!("{name}.jar"));
            let args = CommandLine::new()
                .arg("--create")
                .path("--file", &file)
                .option_opt("--module-version", version.as_deref())
                .option_opt("--main-class", main_class)
                .path("-C", &module.location)
                .arg(".")
                .build();
            info!("Packaging {} into {}", name, file.display());
            let code = jar.run(&mut io::stdout(), &mut io::stderr(), &args)?;
            if code != 0 {
                return Ok(code);
            }
        }
        Ok(0)
    }
}
