//! Sink for the paths a plugin asks the daemon to watch

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Directories a plugin wants watched; a change below any of them triggers
/// a rebuild under the daemon
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchRegistry {
    paths: BTreeSet<PathBuf>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch(&mut self, path: impl Into<PathBuf>) {
        self.paths.insert(path.into());
    }

    pub fn watch_all<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths.into_iter().collect()
    }
}
