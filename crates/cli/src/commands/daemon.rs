use anyhow::{Context, Result, bail};
use modbuild_core::Daemon;
use std::io::{self, BufRead};
use tracing::{info, warn};

use crate::cli::{GlobalArgs, sequence};
use crate::project::Project;

/// A line typed into a running daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Switch to another plugin sequence (empty for the default one)
    Run(Vec<String>),
    Refresh,
    Stop,
}

impl Control {
    /// Parse one input line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(None);
        };
        let control = match command {
            "run" => Control::Run(words.map(str::to_string).collect()),
            "refresh" | "r" => Control::Refresh,
            "stop" | "quit" | "q" => Control::Stop,
            other => bail!("Unknown daemon command '{other}' (expected run, refresh or stop)"),
        };
        Ok(Some(control))
    }
}

pub fn daemon_command(global: &GlobalArgs, plugins: Vec<String>) -> Result<()> {
    let mut project = Project::load(global)?;
    let tree = project.configure()?;
    let selected = project.pipeline.select(&plugins)?;

    let mut daemon = Daemon::default();
    daemon.start().context("Failed to start daemon")?;
    daemon.run(selected, tree.duplicate())?;
    info!("Watching {} with {}", project.dir.display(), plugins.join(" "));
    eprintln!("Daemon running: type 'run PLUGIN...', 'refresh' or 'stop'");

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read from stdin")?;
        let control = match Control::parse(&line) {
            Ok(Some(control)) => control,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match control {
            Control::Run(names) => {
                let names = sequence(names);
                match project.pipeline.select(&names) {
                    Ok(selected) => daemon.run(selected, tree.duplicate())?,
                    Err(e) => eprintln!("{e}"),
                }
            }
            Control::Refresh => daemon.refresh()?,
            Control::Stop => break,
        }
    }

    if let Err(e) = daemon.stop() {
        warn!("Failed to stop daemon: {}", e);
    }
    info!("Daemon stopped after {} runs", daemon.completed_runs());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_lines() {
        assert_eq!(
            Control::parse("run compiler tester").unwrap(),
            Some(Control::Run(vec!["compiler".into(), "tester".into()]))
        );
        assert_eq!(Control::parse("  r ").unwrap(), Some(Control::Refresh));
        assert_eq!(Control::parse("quit").unwrap(), Some(Control::Stop));
        assert_eq!(Control::parse("").unwrap(), None);
        assert!(Control::parse("restart").is_err());
    }
}
