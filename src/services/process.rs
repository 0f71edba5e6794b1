//! Process execution service for generation and validation commands.
//!
//! Runs a command to completion, captures its output and persists it to a
//! log file.

use crate::config::CommandSpec;
use crate::error::{AppError, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// Where the output was persisted, if logging is enabled
    pub log_file: Option<PathBuf>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last non-empty lines of stderr (or stdout when stderr is empty)
    pub fn tail(&self, lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let kept: Vec<&str> = source
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        kept[kept.len().saturating_sub(lines)..].join("\n")
    }
}

/// Process execution service
#[derive(Debug, Clone)]
pub struct ProcessService {
    /// Log directory
    log_dir: Option<PathBuf>,
}

impl ProcessService {
    /// Create a service that persists command logs under `log_dir`
    pub fn new(log_dir: PathBuf) -> Self {
        Self {
            log_dir: Some(log_dir),
        }
    }

    /// Create a service that keeps output in memory only
    pub fn without_logs() -> Self {
        Self { log_dir: None }
    }

    /// Generate log file path for a command
    fn log_file_path(&self, label: &str) -> Option<PathBuf> {
        let timestamp = chrono::Local::now().format("%Y%m%dT%H%M%S%.3f");
        let filename = format!("{}-{}.log", label, timestamp);
        self.log_dir.as_ref().map(|dir| dir.join(filename))
    }

    /// Run `command` in `working_dir`, optionally feeding `input` on stdin
    pub fn run(
        &self,
        label: &str,
        command: &CommandSpec,
        working_dir: &Path,
        input: Option<&str>,
    ) -> Result<CommandOutput> {
        tracing::debug!(label, command = %command.display(), "Running command");
        let start = Instant::now();

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(working_dir)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                AppError::Process(format!("Failed to spawn {}: {}", command.program, e))
            })?;

        // Feed stdin from a thread so a chatty child cannot deadlock us
        let writer = match (input, child.stdin.take()) {
            (Some(input), Some(mut stdin)) => {
                let input = input.to_string();
                Some(std::thread::spawn(move || stdin.write_all(input.as_bytes())))
            }
            _ => None,
        };

        let output = child
            .wait_with_output()
            .map_err(|e| AppError::Process(e.to_string()))?;

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(AppError::Process(format!("Failed to write stdin: {}", e)));
                }
                Err(_) => return Err(AppError::Process("stdin writer panicked".to_string())),
                _ => {}
            }
        }

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: start.elapsed(),
            log_file: self.log_file_path(label),
        };

        if let Some(path) = &result.log_file {
            // Log persistence is best effort
            if let Err(e) = write_log(path, label, command, working_dir, &result) {
                tracing::warn!("Failed to write command log {}: {}", path.display(), e);
            }
        }

        tracing::debug!(
            label,
            exit_code = ?result.exit_code,
            elapsed_ms = result.duration.as_millis() as u64,
            "Command finished"
        );
        Ok(result)
    }
}

fn write_log(
    path: &Path,
    label: &str,
    command: &CommandSpec,
    working_dir: &Path,
    output: &CommandOutput,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut log = BufWriter::new(File::create(path)?);

    writeln!(log, "# Step: {}", label)?;
    writeln!(log, "# Command: {}", command.display())?;
    writeln!(log, "# Directory: {}", working_dir.display())?;
    writeln!(log, "# Exit: {:?}", output.exit_code)?;
    writeln!(log, "# Duration: {}ms", output.duration.as_millis())?;
    writeln!(log, "---")?;
    for line in output.stdout.lines() {
        writeln!(log, "[OUT] {}", line)?;
    }
    for line in output.stderr.lines() {
        writeln!(log, "[ERR] {}", line)?;
    }
    log.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh", &["-c", script])
    }

    #[test]
    fn test_run_captures_output() {
        let temp = TempDir::new().unwrap();
        let service = ProcessService::without_logs();

        let output = service
            .run("check", &sh("echo hello; echo oops >&2; exit 3"), temp.path(), None)
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.tail(5), "oops");
        assert!(output.log_file.is_none());
    }

    #[test]
    fn test_run_feeds_stdin() {
        let temp = TempDir::new().unwrap();
        let service = ProcessService::without_logs();

        let output = service
            .run("generate", &CommandSpec::new("cat", &[]), temp.path(), Some("prompt text"))
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "prompt text");
    }

    #[test]
    fn test_run_writes_log() {
        let temp = TempDir::new().unwrap();
        let service = ProcessService::new(temp.path().join("logs"));

        let output = service
            .run("validate", &sh("echo built"), temp.path(), None)
            .unwrap();

        let log_path = output.log_file.unwrap();
        assert!(log_path.file_name().unwrap().to_string_lossy().starts_with("validate-"));
        assert_eq!(log_path.extension().unwrap(), "log");

        let log = fs::read_to_string(log_path).unwrap();
        assert!(log.contains("# Command: sh -c echo built"));
        assert!(log.contains("[OUT] built"));
    }

    #[test]
    fn test_spawn_failure() {
        let temp = TempDir::new().unwrap();
        let service = ProcessService::without_logs();

        let err = service
            .run("x", &CommandSpec::new("/nonexistent/tool", &[]), temp.path(), None)
            .unwrap_err();
        assert!(matches!(err, AppError::Process(ref m) if m.contains("/nonexistent/tool")));
    }

    #[test]
    fn test_tail_limits_lines() {
        let output = CommandOutput {
            exit_code: Some(1),
            stdout: "a\n\nb\nc\n".to_string(),
            stderr: String::new(),
            duration: Duration::ZERO,
            log_file: None,
        };
        assert_eq!(output.tail(2), "b\nc");
    }
}
