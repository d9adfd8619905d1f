use std::io;

/// Errors that can occur during modbuild operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No such key: {0}")]
    NoSuchKey(String),

    #[error("Invalid config path: '{0}'")]
    InvalidPath(String),

    #[error("Config key '{0}' is read-only")]
    ReadOnly(String),

    #[error("Config key '{key}' is not declared by section '{section}'")]
    FrozenKey { key: String, section: String },

    #[error("Plugin '{plugin}' may not modify '{key}'")]
    Permission { plugin: String, key: String },

    #[error("Section type '{0}' is not a checked config type")]
    NotChecked(String),

    #[error("Type mismatch for '{key}': expected {expected}, found {found}")]
    TypeMismatch {
        key: String,
        expected: String,
        found: String,
    },

    #[error("Derivation cycle detected while evaluating '{0}'")]
    DerivationCycle(String),

    #[error("Module parse error in {location}: {message}")]
    ModuleParse { location: String, message: String },

    #[error("Invalid module-info class: {0}")]
    ClassFormat(String),

    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Invalid plugin manifest {path}: {message}")]
    PluginManifest { path: String, message: String },

    #[error("Daemon is already running")]
    DaemonAlreadyRunning,

    #[error("Daemon is not running")]
    DaemonNotRunning,

    #[error("Daemon command queue is full")]
    CommandQueueFull,

    #[error("Artifact resolution failed: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Archive error: {0}")]
    ArchiveError(#[from] zip::result::ZipError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// I/O failures are converted into an exit code by the pipeline instead of
    /// aborting it like configuration errors do.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Error::IoError(_) | Error::ArchiveError(_) | Error::Artifact(_)
        )
    }

    pub(crate) fn type_mismatch(
        key: &str,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Error::TypeMismatch {
            key: key.to_string(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Result type alias for modbuild operations
pub type Result<T> = std::result::Result<T, Error>;
