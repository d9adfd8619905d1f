use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Separator of path lists on the command line of the host platform
pub const PATH_SEPARATOR: &str = if cfg!(windows) { ";" } else { ":" };

/// Join paths into one platform path list
pub fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

/// Builder for the argument vector of an external tool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandLine {
    args: Vec<String>,
}

impl CommandLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add `name` only when `enabled`
    pub fn flag(self, name: &str, enabled: bool) -> Self {
        if enabled { self.arg(name) } else { self }
    }

    pub fn option(self, name: &str, value: impl Display) -> Self {
        self.arg(name).arg(value.to_string())
    }

    /// Add `name value` only when a value is present
    pub fn option_opt<T: Display>(self, name: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.option(name, value),
            None => self,
        }
    }

    pub fn path(self, name: &str, path: &Path) -> Self {
        self.option(name, path.display())
    }

    /// Add `name a:b:c`, skipped when the list is empty
    pub fn paths(self, name: &str, paths: &[PathBuf]) -> Self {
        if paths.is_empty() {
            return self;
        }
        self.option(name, join_paths(paths))
    }

    pub fn as_slice(&self) -> &[String] {
        &self.args
    }

    pub fn build(self) -> Vec<String> {
        self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Render for logging, quoting arguments that contain spaces
    pub fn to_shell_command(&self, program: &str) -> String {
        let mut cmd = String::from(program);
        for arg in &self.args {
            cmd.push(' ');
            if arg.contains(' ') {
                cmd.push_str(&format!("'{arg}'"));
            } else {
                cmd.push_str(arg);
            }
        }
        cmd
    }
}
