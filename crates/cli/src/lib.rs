pub mod cli;
pub mod commands;
pub mod project;

// Re-export commonly used items
pub use cli::{Cli, Commands, GlobalArgs};
pub use project::Project;
