//! External tools driven by the plugins
//!
//! Compilers, documentation generators, linkers and archivers are opaque
//! collaborators: plugins only build argument vectors and look at exit
//! codes. Everything here is a trait so tests can substitute recording
//! fakes.

pub mod command_line;

pub use command_line::{CommandLine, PATH_SEPARATOR, join_paths};

use crate::error::{Error, Result};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, mpsc};
use std::thread;
use tracing::debug;

/// A tool run in-process style: arguments in, exit code out
pub trait ToolProvider: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, out: &mut dyn Write, err: &mut dyn Write, args: &[String]) -> Result<i32>;
}

/// A running process with combined output
pub trait ProcessHandle: Send {
    /// Lines of stdout and stderr in arrival order; ends when both close
    fn output_lines(&mut self) -> Box<dyn Iterator<Item = String> + '_>;

    /// Block until the process exits
    fn wait_for(&mut self) -> Result<i32>;
}

/// Starts separate processes, e.g. a test JVM
pub trait ProcessLauncher: Send + Sync {
    fn start(&self, args: &[String]) -> Result<Box<dyn ProcessHandle>>;
}

/// Hands out tools of a runtime installation by name
pub trait ToolLocator: Send + Sync {
    fn tool(&self, java_home: &Path, name: &str) -> Box<dyn ToolProvider>;

    fn launcher(&self, java_home: &Path) -> Box<dyn ProcessLauncher>;
}

/// Resolves artifact coordinates to files in a directory
pub trait ArtifactResolver: Send + Sync {
    fn resolve(&self, coordinates: &[String], into: &Path) -> Result<Vec<PathBuf>>;
}

/// The collaborators handed to the built-in plugins
#[derive(Clone)]
pub struct Toolbox {
    pub locator: Arc<dyn ToolLocator>,
    pub artifacts: Option<Arc<dyn ArtifactResolver>>,
}

impl Default for Toolbox {
    fn default() -> Self {
        Self {
            locator: Arc::new(JdkTools),
            artifacts: None,
        }
    }
}

impl Toolbox {
    pub fn with_locator(mut self, locator: Arc<dyn ToolLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactResolver>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox")
            .field("artifacts", &self.artifacts.is_some())
            .finish()
    }
}

/// Path of an executable in `<java_home>/bin`
pub fn executable(java_home: &Path, name: &str) -> PathBuf {
    java_home
        .join("bin")
        .join(format!("{name}{}", std::env::consts::EXE_SUFFIX))
}

/// Tools of a JDK installation, run as subprocesses
#[derive(Debug, Clone, Copy, Default)]
pub struct JdkTools;

impl ToolLocator for JdkTools {
    fn tool(&self, java_home: &Path, name: &str) -> Box<dyn ToolProvider> {
        Box::new(SystemTool::new(name, executable(java_home, name)))
    }

    fn launcher(&self, java_home: &Path) -> Box<dyn ProcessLauncher> {
        Box::new(SystemLauncher::new(executable(java_home, "java")))
    }
}

/// A tool backed by an executable
#[derive(Debug, Clone)]
pub struct SystemTool {
    name: String,
    program: PathBuf,
    working_dir: Option<PathBuf>,
}

impl SystemTool {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl ToolProvider for SystemTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, out: &mut dyn Write, err: &mut dyn Write, args: &[String]) -> Result<i32> {
        debug!(
            "{}",
            CommandLine::new()
                .args(args.iter().cloned())
                .to_shell_command(&self.program.display().to_string())
        );
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        let output = cmd.output()?;
        out.write_all(&output.stdout)?;
        err.write_all(&output.stderr)?;
        Ok(output.status.code().unwrap_or(1))
    }
}

/// Launches an executable with piped output
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    program: PathBuf,
}

impl SystemLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ProcessLauncher for SystemLauncher {
    fn start(&self, args: &[String]) -> Result<Box<dyn ProcessHandle>> {
        debug!(
            "{}",
            CommandLine::new()
                .args(args.iter().cloned())
                .to_shell_command(&self.program.display().to_string())
        );
        let mut child = Command::new(&self.program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx);
        }
        Ok(Box::new(ChildHandle { child, lines: rx }))
    }
}

fn forward_lines(stream: impl std::io::Read + Send + 'static, tx: mpsc::Sender<String>) {
    thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

struct ChildHandle {
    child: Child,
    lines: mpsc::Receiver<String>,
}

impl ProcessHandle for ChildHandle {
    fn output_lines(&mut self) -> Box<dyn Iterator<Item = String> + '_> {
        Box::new(self.lines.iter())
    }

    fn wait_for(&mut self) -> Result<i32> {
        let status = self.child.wait()?;
        Ok(status.code().unwrap_or(1))
    }
}

/// Resolves `group:artifact:version` coordinates from a local repository
/// laid out like `~/.m2/repository`, copying the jars into the target
/// directory
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn artifact_path(&self, coordinates: &str) -> Result<PathBuf> {
        let parts: Vec<&str> = coordinates.split(':').collect();
        let [group, artifact, version] = parts.as_slice() else {
            return Err(Error::Artifact(format!(
                "expected group:artifact:version, got '{coordinates}'"
            )));
        };
        let mut path = self.root.clone();
        path.extend(group.split('.'));
        Ok(path
            .join(artifact)
            .join(version)
            .join(format!("{artifact}-{version}.jar")))
    }
}

impl ArtifactResolver for LocalRepository {
    fn resolve(&self, coordinates: &[String], into: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(into)?;
        let mut resolved = Vec::new();
        for coordinate in coordinates {
            let source = self.artifact_path(coordinate)?;
            if !source.is_file() {
                return Err(Error::Artifact(format!(
                    "{coordinate} not found at {}",
                    source.display()
                )));
            }
            let Some(file_name) = source.file_name() else {
                continue;
            };
            let target = into.join(file_name);
            std::fs::copy(&source, &target)?;
            debug!("Resolved {} to {}", coordinate, target.display());
            resolved.push(target);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_executable_lives_in_bin() {
        let path = executable(Path::new("/opt/jdk"), "javac");
        assert!(path.starts_with("/opt/jdk/bin"));
    }

    #[test]
    fn test_local_repository_layout() {
        let repo = LocalRepository::new("/repo");
        assert_eq!(
            repo.artifact_path("org.junit:junit-api:5.10.0").unwrap(),
            PathBuf::from("/repo/org/junit/junit-api/5.10.0/junit-api-5.10.0.jar")
        );
        assert!(matches!(
            repo.artifact_path("junit"),
            Err(Error::Artifact(_))
        ));
    }

    #[test]
    fn test_local_repository_copies_jars() {
        let temp_dir = TempDir::new().unwrap();
        let repo = LocalRepository::new(temp_dir.path().join("repo"));
        let source = repo.artifact_path("a.b:c:1.0").unwrap();
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, b"jar").unwrap();

        let into = temp_dir.path().join("deps");
        let resolved = repo.resolve(&["a.b:c:1.0".to_string()], &into).unwrap();
        assert_eq!(resolved, vec![into.join("c-1.0.jar")]);
        assert!(repo.resolve(&["a.b:missing:1".to_string()], &into).is_err());
        assert!(Error::Artifact(String::new()).is_io());
    }

    #[cfg(unix)]
    #[test]
    fn test_system_tool_reports_exit_code() {
        let tool = SystemTool::new("sh", "/bin/sh");
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = tool
            .run(
                &mut out,
                &mut err,
                &["-c".to_string(), "echo hi; exit 3".to_string()],
            )
            .unwrap();
        assert_eq!(code, 3);
        assert_eq!(String::from_utf8(out).unwrap(), "hi\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_launcher_streams_combined_output() {
        let launcher = SystemLauncher::new("/bin/sh");
        let mut handle = launcher
            .start(&["-c".to_string(), "echo out; echo err >&2".to_string()])
            .unwrap();
        let mut lines: Vec<String> = handle.output_lines().collect();
        lines.sort();
        assert_eq!(lines, vec!["err".to_string(), "out".to_string()]);
        assert_eq!(handle.wait_for().unwrap(), 0);
    }
}
