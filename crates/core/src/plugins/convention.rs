//! Project layout defaults the other plugins derive from

use crate::config::{ConfigView, KeySpec, PluginConfig, SectionType, ValueKind};
use crate::error::Result;
use crate::pipeline::Plugin;
use std::path::PathBuf;

pub const NAME: &str = "convention";

static CONVENTION_KEYS: [KeySpec; 11] = [
    KeySpec::new("projectDir", ValueKind::Path),
    KeySpec::new("javaHome", ValueKind::Path),
    KeySpec::new("javaModuleSourcePath", ValueKind::PathList),
    KeySpec::new("javaModuleTestPath", ValueKind::PathList),
    KeySpec::new("javaModuleDependencyPath", ValueKind::PathList),
    KeySpec::new("javaModuleExplodedSourcePath", ValueKind::Path),
    KeySpec::new("javaModuleExplodedTestPath", ValueKind::Path),
    KeySpec::new("javaModuleMergedTestPath", ValueKind::Path),
    KeySpec::new("javaModuleArtifactSourcePath", ValueKind::Path),
    KeySpec::new("javaModuleDocPath", ValueKind::Path),
    KeySpec::new("javaLinkerImagePath", ValueKind::Path),
];
pub static CONVENTION: SectionType = SectionType::new(NAME, &CONVENTION_KEYS);

/// The runtime installation used when `JAVA_HOME` is not set
const FALLBACK_JAVA_HOME: &str = "/usr/lib/jvm/default-java";

fn default_java_home() -> PathBuf {
    std::env::var_os("JAVA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(FALLBACK_JAVA_HOME))
}

/// Declares where sources, dependencies and outputs live. Every location
/// follows `convention.projectDir` unless set explicitly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConventionPlugin;

impl Plugin for ConventionPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn init(&self, config: &mut PluginConfig<'_>) -> Result<()> {
        config.get_or_create(NAME, &CONVENTION)?;
        config.set_default("convention.projectDir", std::env::current_dir()?)?;
        config.set_default("convention.javaHome", default_java_home())?;

        let layout: [(&str, &[&str]); 8] = [
            ("javaModuleSourcePath", &["src", "main", "java"]),
            ("javaModuleTestPath", &["src", "test", "java"]),
            ("javaModuleDependencyPath", &["deps"]),
            ("javaModuleExplodedSourcePath", &["target", "main", "exploded"]),
            ("javaModuleExplodedTestPath", &["target", "test", "exploded"]),
            ("javaModuleMergedTestPath", &["target", "test", "merged"]),
            ("javaModuleArtifactSourcePath", &["target", "main", "artifact"]),
            ("javaModuleDocPath", &["target", "main", "doc"]),
        ];
        for (key, segments) in layout {
            let segments: Vec<String> = segments.iter().map(|s| s.to_string()).collect();
            config.derive_default(
                &format!("{NAME}.{key}"),
                "convention.projectDir",
                move |dir: PathBuf| segments.iter().fold(dir, |path, s| path.join(s)),
            )?;
        }
        config.derive_default(
            "convention.javaLinkerImagePath",
            "convention.projectDir",
            |dir: PathBuf| dir.join("target").join("image"),
        )
    }

    fn execute(&self, _config: &ConfigView<'_>) -> Result<i32> {
        Ok(0)
    }
}
