//! Built-in plugins and manifest-declared command plugins

pub mod command;
pub mod compiler;
pub mod convention;
pub mod docer;
pub mod linker;
pub mod packager;
pub mod resolver;
pub mod tester;

pub use command::CommandPlugin;
pub use compiler::CompilerPlugin;
pub use convention::ConventionPlugin;
pub use docer::DocerPlugin;
pub use linker::LinkerPlugin;
pub use packager::PackagerPlugin;
pub use resolver::ResolverPlugin;
pub use tester::TesterPlugin;

use crate::config::{ConfigValue, ConfigView, PluginConfig};
use crate::error::Result;
use crate::pipeline::PluginRegistry;
use crate::tools::Toolbox;
use std::path::PathBuf;

/// Register every built-in plugin
pub fn register_builtin(registry: &mut PluginRegistry, toolbox: &Toolbox) {
    registry.register(ConventionPlugin);
    registry.register(ResolverPlugin::new(toolbox.clone()));
    registry.register(CompilerPlugin::new(toolbox.clone()));
    registry.register(DocerPlugin::new(toolbox.clone()));
    registry.register(PackagerPlugin::new(toolbox.clone()));
    registry.register(LinkerPlugin::new(toolbox.clone()));
    registry.register(TesterPlugin::new(toolbox.clone()));
}

/// Make `path` follow `source` unless it already has a value. The value is
/// coerced to the declared kind of `path` on read.
pub(crate) fn link(config: &mut PluginConfig<'_>, path: &str, source: &str) -> Result<()> {
    config.derive_default(path, source, |value: ConfigValue| value)
}

/// Read a path list, treating an absent key as empty
pub(crate) fn path_list(view: &ConfigView<'_>, path: &str) -> Result<Vec<PathBuf>> {
    Ok(view.get_opt(path)?.unwrap_or_default())
}

/// Split `key=value` entries of a string list
pub(crate) fn pairs(entries: &[String]) -> Vec<(&str, &str)> {
    entries
        .iter()
        .filter_map(|entry| entry.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording tool fakes shared by the plugin tests

    use crate::error::Result;
    use crate::tools::{ProcessHandle, ProcessLauncher, ToolLocator, ToolProvider};
    use std::io::Write;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    /// Every invocation as `tool arg arg ...`
    #[derive(Clone, Default)]
    pub struct Recorder {
        pub calls: Arc<Mutex<Vec<Vec<String>>>>,
        pub exit_code: i32,
    }

    impl Recorder {
        pub fn failing(exit_code: i32) -> Self {
            Self {
                exit_code,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    struct RecordingTool {
        name: String,
        recorder: Recorder,
    }

    impl ToolProvider for RecordingTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn run(&self, _out: &mut dyn Write, _err: &mut dyn Write, args: &[String]) -> Result<i32> {
            let mut call = vec![self.name.clone()];
            call.extend(args.iter().cloned());
            self.recorder.calls.lock().unwrap().push(call);
            Ok(self.recorder.exit_code)
        }
    }

    struct RecordingHandle {
        lines: Vec<String>,
        exit_code: i32,
    }

    impl ProcessHandle for RecordingHandle {
        fn output_lines(&mut self) -> Box<dyn Iterator<Item = String> + '_> {
            Box::new(self.lines.drain(..))
        }

        fn wait_for(&mut self) -> Result<i32> {
            Ok(self.exit_code)
        }
    }

    struct RecordingLauncher {
        recorder: Recorder,
    }

    impl ProcessLauncher for RecordingLauncher {
        fn start(&self, args: &[String]) -> Result<Box<dyn ProcessHandle>> {
            let mut call = vec!["java".to_string()];
            call.extend(args.iter().cloned());
            self.recorder.calls.lock().unwrap().push(call);
            Ok(Box::new(RecordingHandle {
                lines: vec!["started".to_string()],
                exit_code: self.recorder.exit_code,
            }))
        }
    }

    impl ToolLocator for Recorder {
        fn tool(&self, _java_home: &Path, name: &str) -> Box<dyn ToolProvider> {
            Box::new(RecordingTool {
                name: name.to_string(),
                recorder: self.clone(),
            })
        }

        fn launcher(&self, _java_home: &Path) -> Box<dyn ProcessLauncher> {
            Box::new(RecordingLauncher {
                recorder: self.clone(),
            })
        }
    }
}
