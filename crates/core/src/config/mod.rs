//! Typed, hierarchical configuration shared by all plugins

mod node;
pub mod schema;
pub mod settings;
pub mod tree;
pub mod value;
pub mod view;

pub use schema::{KeySpec, SectionType};
pub use settings::Settings;
pub use tree::{ConfigTree, MAX_DERIVATION_DEPTH};
pub use value::{ConfigValue, FromConfigValue, ValueKind};
pub use view::{ConfigView, PluginConfig};
