pub mod build;
pub mod config;
pub mod daemon;
pub mod modules;
pub mod plugins;

pub use build::build_command;
pub use config::config_command;
pub use daemon::daemon_command;
pub use modules::modules_command;
pub use plugins::plugins_command;
