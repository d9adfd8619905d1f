//! Background rebuild loop
//!
//! A command thread owns the current plugin sequence and configuration
//! tree. It sleeps on a monitor until either a control command is queued
//! or a rebuild is requested, then drains all queued commands before it
//! runs the sequence. A separate watcher thread requests rebuilds when the
//! directories registered by the first plugin of the sequence change.

pub mod watcher;

pub use watcher::WatchTimings;

use crate::config::ConfigTree;
use crate::error::{Error, Result};
use crate::pipeline::{Plugin, WatchRegistry, run_sequence};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use watcher::WatcherThread;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonOptions {
    pub queue_capacity: usize,
    pub timings: WatchTimings,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            timings: WatchTimings::default(),
        }
    }
}

enum Command {
    Run {
        plugins: Vec<Arc<dyn Plugin>>,
        tree: ConfigTree,
    },
    Stop,
}

#[derive(Default)]
struct Monitor {
    refresh: bool,
    commands: VecDeque<Command>,
}

/// State shared between the daemon handle and its threads
struct Shared {
    monitor: Mutex<Monitor>,
    wakeup: Condvar,
    runs: AtomicU64,
}

impl Shared {
    fn request_refresh(&self) {
        let mut monitor = self.monitor.lock();
        monitor.refresh = true;
        self.wakeup.notify_one();
    }
}

/// Re-runs a plugin sequence whenever its watched directories change.
///
/// Nothing happens before [`Daemon::start`] and nothing can be scheduled
/// after [`Daemon::stop`]. A run that is in flight when the daemon stops
/// finishes; only the next one is prevented.
pub struct Daemon {
    options: DaemonOptions,
    shared: Arc<Shared>,
    command_thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("options", &self.options)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new(DaemonOptions::default())
    }
}

impl Daemon {
    pub fn new(options: DaemonOptions) -> Self {
        Self {
            options,
            shared: Arc::new(Shared {
                monitor: Mutex::new(Monitor::default()),
                wakeup: Condvar::new(),
                runs: AtomicU64::new(0),
            }),
            command_thread: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.command_thread.is_some()
    }

    /// Number of sequence runs completed since the daemon was created
    pub fn completed_runs(&self) -> u64 {
        self.shared.runs.load(Ordering::SeqCst)
    }

    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::DaemonAlreadyRunning);
        }
        {
            let mut monitor = self.shared.monitor.lock();
            monitor.commands.clear();
            monitor.refresh = false;
        }
        let shared = self.shared.clone();
        let timings = self.options.timings;
        let handle = thread::Builder::new()
            .name("modbuild-daemon".to_string())
            .spawn(move || CommandLoop::new(shared, timings).run())?;
        self.command_thread = Some(handle);
        info!("Daemon started");
        Ok(())
    }

    /// Stop the command thread and its watcher, waiting for a run in
    /// flight to finish
    pub fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.command_thread.take() else {
            return Err(Error::DaemonNotRunning);
        };
        {
            let mut monitor = self.shared.monitor.lock();
            monitor.commands.push_back(Command::Stop);
            self.shared.wakeup.notify_one();
        }
        if handle.join().is_err() {
            error!("Daemon command thread panicked");
        }
        info!("Daemon stopped");
        Ok(())
    }

    /// Make `plugins` the current sequence, watch the directories of its
    /// first plugin and run it once
    pub fn run(&self, plugins: Vec<Arc<dyn Plugin>>, tree: ConfigTree) -> Result<()> {
        self.enqueue(Command::Run { plugins, tree }, true)
    }

    /// Request a rebuild of the current sequence
    pub fn refresh(&self) -> Result<()> {
        if !self.is_running() {
            return Err(Error::DaemonNotRunning);
        }
        self.shared.request_refresh();
        Ok(())
    }

    fn enqueue(&self, command: Command, refresh: bool) -> Result<()> {
        if !self.is_running() {
            return Err(Error::DaemonNotRunning);
        }
        let mut monitor = self.shared.monitor.lock();
        if monitor.commands.len() >= self.options.queue_capacity {
            return Err(Error::CommandQueueFull);
        }
        monitor.commands.push_back(command);
        monitor.refresh |= refresh;
        self.shared.wakeup.notify_one();
        Ok(())
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

/// The command thread. Sole owner of the current sequence and the watcher.
struct CommandLoop {
    shared: Arc<Shared>,
    timings: WatchTimings,
    current: Option<(Vec<Arc<dyn Plugin>>, ConfigTree)>,
    watcher: Option<WatcherThread>,
}

impl CommandLoop {
    fn new(shared: Arc<Shared>, timings: WatchTimings) -> Self {
        Self {
            shared,
            timings,
            current: None,
            watcher: None,
        }
    }

    fn run(mut self) {
        loop {
            let (commands, refresh) = {
                let mut monitor = self.shared.monitor.lock();
                while !monitor.refresh && monitor.commands.is_empty() {
                    self.shared.wakeup.wait(&mut monitor);
                }
                let commands: Vec<Command> = monitor.commands.drain(..).collect();
                let refresh = std::mem::take(&mut monitor.refresh);
                (commands, refresh)
            };

            for command in commands {
                match command {
                    Command::Stop => {
                        self.stop_watcher();
                        debug!("Command thread exiting");
                        return;
                    }
                    Command::Run { plugins, tree } => self.replace(plugins, tree),
                }
            }
            if refresh {
                self.execute();
            }
        }
    }

    fn stop_watcher(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
    }

    fn replace(&mut self, plugins: Vec<Arc<dyn Plugin>>, tree: ConfigTree) {
        self.stop_watcher();
        let mut registry = WatchRegistry::new();
        if let Some(first) = plugins.first() {
            if let Err(e) = first.watch(&tree.view(), &mut registry) {
                error!("{} cannot register watched directories: {}", first.name(), e);
            }
        }
        if registry.is_empty() {
            warn!("Nothing to watch; rebuilds only happen on request");
        } else {
            let shared = self.shared.clone();
            match WatcherThread::spawn(registry.into_paths(), self.timings, move || {
                shared.request_refresh()
            }) {
                Ok(watcher) => self.watcher = Some(watcher),
                Err(e) => error!("Cannot start watcher: {}", e),
            }
        }
        let names: Vec<&str> = plugins.iter().map(|plugin| plugin.name()).collect();
        info!("Daemon sequence is now {}", names.join(" "));
        self.current = Some((plugins, tree));
    }

    fn execute(&mut self) {
        let Some((plugins, tree)) = &self.current else {
            debug!("Refresh requested before any sequence was set");
            return;
        };
        match run_sequence(plugins, tree) {
            Ok(0) => info!("Run succeeded"),
            Ok(code) => warn!("Run failed with exit code {}", code),
            Err(e) => error!("Run failed: {}", e),
        }
        self.shared.runs.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigView;
    use std::time::{Duration, Instant};

    struct Counting;

    impl Plugin for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn execute(&self, _config: &ConfigView<'_>) -> Result<i32> {
            Ok(0)
        }
    }

    fn wait_for_runs(daemon: &Daemon, count: u64) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if daemon.completed_runs() >= count {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_lifecycle_errors() {
        let mut daemon = Daemon::default();
        assert!(matches!(daemon.stop(), Err(Error::DaemonNotRunning)));
        assert!(matches!(daemon.refresh(), Err(Error::DaemonNotRunning)));
        daemon.start().unwrap();
        assert!(matches!(daemon.start(), Err(Error::DaemonAlreadyRunning)));
        daemon.stop().unwrap();
        assert!(!daemon.is_running());
        assert!(matches!(
            daemon.run(Vec::new(), ConfigTree::new()),
            Err(Error::DaemonNotRunning)
        ));
    }

    #[test]
    fn test_run_and_refresh() {
        let mut daemon = Daemon::default();
        daemon.start().unwrap();
        daemon.run(vec![Arc::new(Counting)], ConfigTree::new()).unwrap();
        assert!(wait_for_runs(&daemon, 1));
        daemon.refresh().unwrap();
        assert!(wait_for_runs(&daemon, 2));
        daemon.stop().unwrap();
    }

    #[test]
    fn test_restart_after_stop() {
        let mut daemon = Daemon::default();
        daemon.start().unwrap();
        daemon.stop().unwrap();
        daemon.start().unwrap();
        daemon.run(vec![Arc::new(Counting)], ConfigTree::new()).unwrap();
        assert!(wait_for_runs(&daemon, 1));
    }
}
