//! The module dependency graph: descriptors, finders, resolution and merging

pub mod classfile;
pub mod descriptor;
pub mod finder;
pub mod jar;
pub mod merger;
pub mod resolver;

pub use classfile::{module_info_bytes, parse_module_info};
pub use descriptor::{JAVA_BASE, ModuleDescriptor, RequiresModifier};
pub use finder::{
    CompiledModuleFinder, ComposedFinder, InMemoryFinder, ModuleFinder, ModuleReference,
    ModuleSet, SourceModuleFinder, SystemModuleFinder,
};
pub use jar::{DescriptorCache, JarModuleFinder, automatic_module_name};
pub use merger::{merge, render_source};
pub use resolver::{DependencyChain, Resolution, resolve_requires};
