//! Engine backed by an external CuraEngine executable.
//!
//! Each instance owns a scratch directory that serves as its filesystem and
//! working directory. Progress is read from the `Progress:` lines CuraEngine
//! prints on stderr when started with `-p`.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::args::SLICE_VERB;
use crate::engine::{EngineFactory, EngineOptions, SlicingEngine};
use crate::error::{EngineError, Result};
use crate::fs::{normalize, FsError, FsResult, VirtualFs};

/// Lines of stderr kept for error reports.
const STDERR_TAIL: usize = 20;

/// How often the child is polled while waiting for progress.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration of the external engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessEngineConfig {
    /// Path or name of the CuraEngine executable.
    pub binary: PathBuf,
    /// Kill the engine after this many seconds.
    pub timeout_secs: Option<u64>,
    /// Pass `-p` so the engine reports progress.
    pub report_progress: bool,
}

impl Default for ProcessEngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("CuraEngine"),
            timeout_secs: None,
            report_progress: true,
        }
    }
}

/// [`VirtualFs`] rooted at a host directory.
#[derive(Debug)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    /// Create a filesystem rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Host directory backing the filesystem.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> (String, PathBuf) {
        let virtual_path = normalize(path);
        let host = self.root.join(virtual_path.trim_start_matches('/'));
        (virtual_path, host)
    }
}

fn map_io(path: String, e: std::io::Error) -> FsError {
    match e.kind() {
        std::io::ErrorKind::NotFound => FsError::NotFound(path),
        std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path),
        _ => FsError::Io { path, source: e },
    }
}

impl VirtualFs for DirFs {
    fn mkdir(&mut self, path: &str) -> FsResult<()> {
        let (path, host) = self.host_path(path);
        std::fs::create_dir(host).map_err(|e| map_io(path, e))
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> FsResult<()> {
        let (path, host) = self.host_path(path);
        if host.is_dir() {
            return Err(FsError::IsADirectory(path));
        }
        std::fs::write(host, data).map_err(|e| map_io(path, e))
    }

    fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let (path, host) = self.host_path(path);
        if host.is_dir() {
            return Err(FsError::IsADirectory(path));
        }
        std::fs::read(host).map_err(|e| map_io(path, e))
    }

    fn unlink(&mut self, path: &str) -> FsResult<()> {
        let (path, host) = self.host_path(path);
        if host.is_dir() {
            return Err(FsError::IsADirectory(path));
        }
        std::fs::remove_file(host).map_err(|e| map_io(path, e))
    }

    fn rmdir(&mut self, path: &str) -> FsResult<()> {
        let (path, host) = self.host_path(path);
        if !host.exists() {
            return Err(FsError::NotFound(path));
        }
        if !host.is_dir() {
            return Err(FsError::NotADirectory(path));
        }
        let empty = std::fs::read_dir(&host)
            .map_err(|e| map_io(path.clone(), e))?
            .next()
            .is_none();
        if !empty {
            return Err(FsError::DirectoryNotEmpty(path));
        }
        std::fs::remove_dir(host).map_err(|e| map_io(path, e))
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<String>> {
        let (path, host) = self.host_path(path);
        if host.is_file() {
            return Err(FsError::NotADirectory(path));
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&host).map_err(|e| map_io(path.clone(), e))? {
            let entry = entry.map_err(|e| map_io(path.clone(), e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

/// Parse a CuraEngine progress line into a fraction in `[0, 1]`.
///
/// The last token is the overall progress, printed either as a fraction or
/// as a percentage of the whole run.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let rest = line.trim().strip_prefix("Progress:")?;
    let token = rest.split_whitespace().last()?;
    let percent = token.ends_with('%');
    let value: f64 = token.trim_end_matches('%').parse().ok()?;
    let value = if percent { value / 100.0 } else { value };
    value.is_finite().then(|| value.clamp(0.0, 1.0))
}

/// Factory for [`ProcessEngine`].
#[derive(Debug, Clone, Default)]
pub struct ProcessEngineFactory {
    config: ProcessEngineConfig,
}

impl ProcessEngineFactory {
    /// Create a factory.
    pub fn new(config: ProcessEngineConfig) -> Self {
        Self { config }
    }

    /// The engine configuration.
    pub fn config(&self) -> &ProcessEngineConfig {
        &self.config
    }
}

impl EngineFactory for ProcessEngineFactory {
    type Engine = ProcessEngine;

    fn construct(&self, options: &EngineOptions) -> Result<ProcessEngine> {
        let scratch = tempfile::Builder::new().prefix("curaslice-").tempdir()?;
        debug!(
            dir = %scratch.path().display(),
            binary = %self.config.binary.display(),
            "engine scratch directory created"
        );
        Ok(ProcessEngine {
            fs: DirFs::new(scratch.path()),
            _scratch: scratch,
            config: self.config.clone(),
            verbose: options.verbose,
        })
    }
}

/// CuraEngine run as a child process.
pub struct ProcessEngine {
    fs: DirFs,
    _scratch: TempDir,
    config: ProcessEngineConfig,
    verbose: bool,
}

impl ProcessEngine {
    fn command_args(&self, args: &[String]) -> Vec<String> {
        let mut full = args.to_vec();
        if self.config.report_progress
            && full.first().map(String::as_str) == Some(SLICE_VERB)
            && !full.iter().any(|a| a == "-p")
        {
            full.insert(1, "-p".into());
        }
        full
    }
}

impl SlicingEngine for ProcessEngine {
    fn fs(&mut self) -> &mut dyn VirtualFs {
        &mut self.fs
    }

    fn call_main(&mut self, args: &[String], progress: &mut dyn FnMut(f64)) -> Result<()> {
        let mut child = Command::new(&self.config.binary)
            .args(self.command_args(args))
            .current_dir(self.fs.root())
            .stdin(Stdio::null())
            .stdout(if self.verbose { Stdio::inherit() } else { Stdio::null() })
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EngineError::EngineFailure(format!(
                    "failed to start {}: {}",
                    self.config.binary.display(),
                    e
                ))
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::EngineFailure("engine stderr unavailable".into()))?;
        let (tx, rx) = mpsc::channel::<String>();
        let reader = std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let deadline = self
            .config
            .timeout_secs
            .map(|s| Instant::now() + Duration::from_secs(s));
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
        let mut handle_line = |line: String| {
            if let Some(p) = parse_progress_line(&line) {
                progress(p);
            } else if self.verbose {
                debug!(target: "curaengine", "{}", line);
            }
            if tail.len() == STDERR_TAIL {
                tail.pop_front();
            }
            tail.push_back(line);
        };

        let status = loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    handle_line(line);
                    continue;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                // Stderr closed; the child may still be running.
                Err(mpsc::RecvTimeoutError::Disconnected) => std::thread::sleep(POLL_INTERVAL),
            }
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(binary = %self.config.binary.display(), "engine timed out, killing");
                let _ = child.kill();
                let _ = child.wait();
                let _ = reader.join();
                return Err(EngineError::EngineFailure(format!(
                    "engine timed out after {}s",
                    self.config.timeout_secs.unwrap_or_default()
                )));
            }
        };

        let _ = reader.join();
        for line in rx.try_iter() {
            handle_line(line);
        }

        if status.success() {
            Ok(())
        } else {
            let tail: Vec<String> = tail.into_iter().collect();
            Err(EngineError::EngineFailure(format!(
                "engine exited with {}: {}",
                status,
                tail.join("\n")
            )))
        }
    }
}
