//! modbuild - A build orchestrator for modular Java projects
//!
//! This crate provides:
//! - A typed configuration tree whose values can be derived lazily from
//!   other keys, shared by all plugins
//! - Module descriptors read from sources, classfiles and jars, resolution
//!   of their `requires` closure and merging of test modules into main ones
//! - A plugin pipeline with built-in plugins driving the JDK tools
//! - A daemon that re-runs a plugin sequence when watched directories change
pub mod config;
pub mod daemon;
pub mod error;
pub mod module;
pub mod parser;
pub mod pipeline;
pub mod plugins;
pub mod tools;

// Re-export commonly used types and traits
pub use error::{Error, Result};

pub use config::{
    ConfigTree, ConfigValue, ConfigView, KeySpec, PluginConfig, SectionType, Settings, ValueKind,
};
pub use daemon::{Daemon, DaemonOptions};
pub use module::{
    ModuleDescriptor, ModuleFinder, Resolution, merge, render_source, resolve_requires,
};
pub use pipeline::{Pipeline, Plugin, PluginRegistry, PluginState, WatchRegistry, run_sequence};
pub use tools::Toolbox;
