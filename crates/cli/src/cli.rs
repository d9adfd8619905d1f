use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{
    build_command, config_command, daemon_command, modules_command, plugins_command,
};

/// Plugin sequence run by `build` when none is given
pub const DEFAULT_SEQUENCE: [&str; 3] = ["resolver", "compiler", "packager"];

#[derive(Parser, Debug)]
#[command(name = "modbuild")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    RUST_LOG=debug    Enable debug logging\n    JAVA_HOME         Runtime used by the built-in plugins"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Project directory (defaults to the current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Settings file (defaults to modbuild.toml or modbuild.json in the project)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override a setting, e.g. --set compiler.release=21
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    pub overrides: Vec<String>,

    /// Directory of plugin manifests (defaults to <project>/.modbuild/plugins)
    #[arg(long, global = true)]
    pub plugin_dir: Option<PathBuf>,

    /// Local artifact repository used to fetch missing dependencies
    #[arg(long, global = true)]
    pub repository: Option<PathBuf>,

    /// Log debug output unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a plugin sequence once
    #[command(visible_alias = "b")]
    Build {
        /// Plugins to run in order (defaults to resolver compiler packager)
        plugins: Vec<String>,
    },
    /// Re-run a plugin sequence whenever its sources change
    #[command(visible_alias = "d")]
    Daemon {
        /// Plugins to run in order (defaults to resolver compiler packager)
        plugins: Vec<String>,
    },
    /// Print the configured tree or a single key
    Config {
        /// Dotted key, e.g. compiler.moduleSourcePath
        key: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the available plugins in run order
    Plugins,
    /// Resolve the project's modules and report missing ones
    Modules {
        /// Include test modules
        #[arg(short, long)]
        test: bool,
    },
}

/// The requested sequence, or the default one
pub fn sequence(plugins: Vec<String>) -> Vec<String> {
    if plugins.is_empty() {
        DEFAULT_SEQUENCE.iter().map(|name| name.to_string()).collect()
    } else {
        plugins
    }
}

impl Commands {
    /// Execute the command
    pub fn execute(self, global: &GlobalArgs) -> Result<()> {
        match self {
            Commands::Build { plugins } => build_command(global, sequence(plugins)),
            Commands::Daemon { plugins } => daemon_command(global, sequence(plugins)),
            Commands::Config { key, json } => config_command(global, key.as_deref(), json),
            Commands::Plugins => plugins_command(global),
            Commands::Modules { test } => modules_command(global, test),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "modbuild",
            "build",
            "compiler",
            "--set",
            "compiler.release=21",
            "-v",
        ])
        .unwrap();
        assert!(cli.global.verbose);
        assert_eq!(cli.global.overrides, vec!["compiler.release=21"]);
        assert!(matches!(cli.command, Commands::Build { ref plugins } if plugins == &["compiler"]));
    }

    #[test]
    fn test_default_sequence() {
        assert_eq!(sequence(Vec::new()), vec!["resolver", "compiler", "packager"]);
        assert_eq!(sequence(vec!["docer".to_string()]), vec!["docer"]);
    }
}
