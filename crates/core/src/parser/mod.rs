//! Parsing of module declarations written in source form

pub mod module_info;

pub use module_info::{parse_module_file, parse_module_source};
