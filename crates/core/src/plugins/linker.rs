//! Custom runtime image from the packaged modules

use super::{link, path_list};
use crate::config::{ConfigView, KeySpec, PluginConfig, SectionType, ValueKind};
use crate::error::Result;
use crate::pipeline::Plugin;
use crate::tools::{CommandLine, Toolbox};
use std::io;
use std::path::PathBuf;
use tracing::{debug, info};

pub const NAME: &str = "linker";

static LINKER_KEYS: [KeySpec; 8] = [
    KeySpec::new("javaHome", ValueKind::Path),
    KeySpec::new("moduleArtifactSourcePath", ValueKind::Path),
    KeySpec::new("moduleDependencyPath", ValueKind::PathList),
    KeySpec::new("destination", ValueKind::Path),
    KeySpec::new("rootModules", ValueKind::StrList),
    KeySpec::new("launchers", ValueKind::StrList),
    KeySpec::new("stripDebug", ValueKind::Bool),
    KeySpec::new("compressLevel", ValueKind::Int),
];
pub static LINKER: SectionType = SectionType::new(NAME, &LINKER_KEYS);

/// Links `linker.rootModules` and everything they require into an image at
/// `linker.destination`, replacing an existing image
#[derive(Debug, Clone)]
pub struct LinkerPlugin {
    toolbox: Toolbox,
}

impl LinkerPlugin {
    pub fn new(toolbox: Toolbox) -> Self {
        Self { toolbox }
    }
}

impl Plugin for LinkerPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        config.get_or_create(NAME, &LINKER)?;
        config.set_default("linker.rootModules", Vec::<String>::new())?;
        config.set_default("linker.launchers", Vec::<String>::new())?;
        config.set_default("linker.stripDebug", true)
    }

    fn configure(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        link(config, "linker.javaHome", "convention.javaHome")?;
        link(
            config,
            "linker.moduleArtifactSourcePath",
            "convention.javaModuleArtifactSourcePath",
        )?;
        link(
            config,
            "linker.moduleDependencyPath",
            "convention.javaModuleDependencyPath",
        )?;
        link(config, "linker.destination", "convention.javaLinkerImagePath")
    }

    fn execute(&self, config: &ConfigView<'_>) -> Result<i32> {
        let roots: Vec<String> = config.get_or("linker.rootModules", Vec::new())?;
        if roots.is_empty() {
            info!("No root modules to link");
            return Ok(0);
        }

        let java_home: PathBuf = config.get("linker.javaHome")?;
        let mut module_path = vec![config.get::<PathBuf>("linker.moduleArtifactSourcePath")?];
        module_path.extend(path_list(config, "linker.moduleDependencyPath")?);
        module_path.push(java_home.join("jmods"));

        let destination: PathBuf = config.get("linker.destination")?;
        if destination.exists() {
            debug!("Removing previous image {}", destination.display());
            std::fs::remove_dir_all(&destination)?;
        }

        let launchers: Vec<String> = config.get_or("linker.launchers", Vec::new())?;
        let compress: Option<i64> = config.get_opt("linker.compressLevel")?;
        let mut args = CommandLine::new()
            .paths("--module-path", &module_path)
            .option("--add-modules", roots.join(","))
            .path("--output", &destination)
            .flag("--strip-debug", config.get_or("linker.stripDebug", true)?)
            .option_opt("--compress", compress);
        for launcher in launchers {
            args = args.option("--launcher", launcher);
        }

        info!("Linking {} into {}", roots.join(","), destination.display());
        let jlink = self.toolbox.locator.tool(&java_home, "jlink");
        jlink.run(&mut io::stdout(), &mut io::stderr(), &args.build())
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

    fn run(settings: &Settings, recorder: &Recorder) -> i32 {
        let mut registry = PluginRegistry::new();
        registry.register(ConventionPlugin);
        registry.register(LinkerPlugin::new(
            Toolbox::default().with_locator(Arc::new(recorder.clone())),
        ));
        Pipeline::new(registry)
            .run(&mut ConfigTree::new(), settings, &["linker"])
            .unwrap()
    }

    #[test]
    fn test_replaces_previous_image() {
        let temp_dir = TempDir::new().unwrap();
        let image = temp_dir.path().join("target/image");
        fs::create_dir_all(image.join("bin")).unwrap();

        let mut settings = Settings::new();
        settings.push("convention.projectDir", temp_dir.path().to_path_buf());
        settings.push("convention.javaHome", PathBuf::from("/opt/jdk"));
        settings.push("linker.rootModules", vec!["com.acme.app"]);
        settings.push("linker.launchers", vec!["app=com.acme.app/com.acme.app.Main"]);
        settings.push("linker.compressLevel", 2);

        let recorder = Recorder::default();
        assert_eq!(run(&settings, &recorder), 0);
        assert!(!image.exists());

        let call = &recorder.calls()[0];
        assert_eq!(call[0], "jlink");
        assert!(call.windows(2).any(|w| w == ["--add-modules", "com.acme.app"]));
        assert!(call.windows(2).any(|w| w == ["--compress", "2"]));
        assert!(call.contains(&"--strip-debug".to_string()));
        assert!(call[2].ends_with("/opt/jdk/jmods"));
    }

    #[test]
    fn test_nothing_to_link_without_roots() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = Settings::new();
        settings.push("convention.projectDir", temp_dir.path().to_path_buf());
        let recorder = Recorder::default();
        assert_eq!(run(&settings, &recorder), 0);
        assert!(recorder.calls().is_empty());
    }
}
