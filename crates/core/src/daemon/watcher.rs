//! Filesystem watcher thread of the daemon
//!
//! Every directory below the watched roots is registered non-recursively
//! and new directories are registered as they are created, so a root that
//! grows keeps being observed. Roots that do not exist yet are re-checked
//! periodically.

use crate::error::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Timeouts of the watcher loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTimings {
    /// Wait for the first event of a burst
    pub idle_timeout: Duration,
    /// Quiet period that ends a burst of events
    pub burst_timeout: Duration,
    /// How often missing roots are checked again
    pub rescan_interval: Duration,
}

impl Default for WatchTimings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(2),
            burst_timeout: Duration::from_millis(200),
            rescan_interval: Duration::from_secs(2),
        }
    }
}

pub(crate) enum WatchMessage {
    Event(notify::Result<Event>),
    Stop,
}

/// A running watcher thread
pub(crate) struct WatcherThread {
    sender: Sender<WatchMessage>,
    handle: JoinHandle<()>,
}

impl WatcherThread {
    /// Watch `roots`, calling `on_change` once per burst of changes
    pub(crate) fn spawn<F>(roots: Vec<PathBuf>, timings: WatchTimings, on_change: F) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel();
        let events = sender.clone();
        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = events.send(WatchMessage::Event(res));
            },
            Config::default(),
        )?;
        let mut state = WatchState::new(watcher, roots);
        state.register_roots();

        let handle = thread::Builder::new()
            .name("modbuild-watcher".to_string())
            .spawn(move || state.run(receiver, timings, on_change))?;
        Ok(Self { sender, handle })
    }

    /// Stop the thread and wait for it to exit
    pub(crate) fn stop(self) {
        let _ = self.sender.send(WatchMessage::Stop);
        if self.handle.join().is_err() {
            warn!("Watcher thread panicked");
        }
    }
}

/// Bookkeeping owned by the watcher thread
struct WatchState {
    watcher: RecommendedWatcher,
    roots: BTreeMap<PathBuf, bool>,
    registered: HashSet<PathBuf>,
}

impl WatchState {
    fn new(watcher: RecommendedWatcher, roots: Vec<PathBuf>) -> Self {
        Self {
            watcher,
            roots: roots.into_iter().map(|root| (root, false)).collect(),
            registered: HashSet::new(),
        }
    }

    /// Register roots that exist and are not registered yet; returns
    /// whether a root appeared
    fn register_roots(&mut self) -> bool {
        let missing: Vec<PathBuf> = self
            .roots
            .iter()
            .filter(|(root, exists)| !**exists && root.is_dir())
            .map(|(root, _)| root.clone())
            .collect();
        for root in &missing {
            self.register_tree(root);
            self.roots.insert(root.clone(), true);
        }
        if self.roots.values().any(|exists| !exists) {
            debug!(
                "Waiting for missing roots {:?}",
                self.roots
                    .iter()
                    .filter(|(_, exists)| !**exists)
                    .map(|(root, _)| root)
                    .collect::<Vec<_>>()
            );
        }
        !missing.is_empty()
    }

    fn register_tree(&mut self, dir: &Path) {
        for entry in WalkDir::new(dir).into_iter().filter_map(|entry| entry.ok()) {
            if entry.file_type().is_dir() {
                self.register_dir(entry.path());
            }
        }
    }

    fn register_dir(&mut self, dir: &Path) {
        if self.registered.contains(dir) {
            return;
        }
        match self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!("Watching {}", dir.display());
                self.registered.insert(dir.to_path_buf());
            }
            Err(e) => warn!("Cannot watch {}: {}", dir.display(), e),
        }
    }

    /// Record an event; returns whether it counts as a change
    fn handle_event(&mut self, event: Event) -> bool {
        match event.kind {
            EventKind::Create(_) => {
                for path in &event.paths {
                    if path.is_dir() {
                        self.register_tree(path);
                    }
                }
                true
            }
            EventKind::Remove(_) => {
                for path in &event.paths {
                    self.registered.remove(path);
                    if let Some(exists) = self.roots.get_mut(path) {
                        *exists = false;
                    }
                }
                true
            }
            EventKind::Modify(_) => true,
            _ => false,
        }
    }

    fn run<F: Fn()>(mut self, receiver: Receiver<WatchMessage>, timings: WatchTimings, on_change: F) {
        info!("Watching {} roots", self.roots.len());
        let mut pending = false;
        let mut last_rescan = Instant::now();
        loop {
            let timeout = if pending {
                timings.burst_timeout
            } else {
                timings.idle_timeout
            };
            match receiver.recv_timeout(timeout) {
                Ok(WatchMessage::Event(Ok(event))) => {
                    if self.handle_event(event) {
                        pending = true;
                    }
                }
                Ok(WatchMessage::Event(Err(e))) => warn!("Watch error: {}", e),
                Ok(WatchMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if pending {
                        pending = false;
                        debug!("Change detected, requesting refresh");
                        on_change();
                    }
                }
            }
            if last_rescan.elapsed() >= timings.rescan_interval {
                last_rescan = Instant::now();
                if self.register_roots() {
                    pending = true;
                }
            }
        }
        debug!("Watcher thread exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn fast() -> WatchTimings {
        WatchTimings {
            idle_timeout: Duration::from_millis(50),
            burst_timeout: Duration::from_millis(100),
            rescan_interval: Duration::from_millis(50),
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_missing_root_is_picked_up() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("later");
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();
        let watcher = WatcherThread::spawn(vec![root.clone()], fast(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        fs::create_dir_all(&root).unwrap();
        assert!(wait_until(|| changes.load(Ordering::SeqCst) > 0));
        watcher.stop();
    }

    #[test]
    fn test_stop_without_events() {
        let temp_dir = TempDir::new().unwrap();
        let watcher =
            WatcherThread::spawn(vec![temp_dir.path().to_path_buf()], fast(), || {}).unwrap();
        watcher.stop();
    }
}
