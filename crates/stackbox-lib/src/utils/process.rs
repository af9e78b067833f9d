//! External process execution with captured output and a hard timeout.
//!
//! `run_process` never returns an error: a missing executable, a spawn
//! failure, a non-zero exit and a timeout all come back as a `ProcessOutput`
//! so that each call site decides how severe the failure is.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

/// How long to keep draining pipes after the child has exited or been killed.
/// Grandchildren holding the pipe open must not hang the caller.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Extension trait for stack-related command execution.
pub trait StackCommandExt {
    /// Hides the console window on Windows. No-op on other platforms.
    fn suppress_console(&mut self) -> &mut Self;
}

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

impl StackCommandExt for tokio::process::Command {
    fn suppress_console(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Terminal state of one process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The process ran to completion. Killed-by-signal exits report -1.
    Completed(i32),
    /// The timeout elapsed and the process was killed.
    TimedOut(Duration),
    /// The executable could not be located; nothing was spawned.
    NotFound,
    /// Spawning or waiting failed.
    SpawnFailed(String),
}

/// Result of `run_process`.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub program: PathBuf,
    pub status: ProcessStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    fn synthetic(program: &Path, status: ProcessStatus) -> Self {
        Self {
            program: program.to_path_buf(),
            status,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    /// True only for a completed process with exit code 0.
    pub fn success(&self) -> bool {
        self.status == ProcessStatus::Completed(0)
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            ProcessStatus::Completed(code) => Some(code),
            _ => None,
        }
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.status, ProcessStatus::TimedOut(_))
    }

    /// Case-insensitive search over stdout and stderr. Some native tools print
    /// their success phrase to stderr.
    pub fn output_contains(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.stdout.to_lowercase().contains(&needle) || self.stderr.to_lowercase().contains(&needle)
    }

    /// One-line description suitable for logs and operator messages.
    pub fn describe(&self) -> String {
        let program = self.program.display();
        match &self.status {
            ProcessStatus::Completed(0) => format!("{program} completed successfully"),
            ProcessStatus::Completed(code) => {
                let detail = last_line(&self.stderr).or_else(|| last_line(&self.stdout));
                match detail {
                    Some(line) => format!("{program} exited with code {code}: {line}"),
                    None => format!("{program} exited with code {code}"),
                }
            }
            ProcessStatus::TimedOut(limit) => {
                format!("{program} timed out after {}s and was killed", limit.as_secs())
            }
            ProcessStatus::NotFound => format!("executable not found: {program}"),
            ProcessStatus::SpawnFailed(reason) => format!("failed to start {program}: {reason}"),
        }
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).filter(|l| !l.is_empty()).last()
}

/// Locate an executable. Paths are checked for existence; bare names are
/// looked up on PATH.
pub fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return program.is_file().then(|| program.to_path_buf());
    }
    which::which(program).ok()
}

/// Run `program` with `args`, capturing stdout/stderr concurrently, and kill
/// it if it outlives `timeout`.
pub async fn run_process<I, S>(
    program: &Path,
    args: I,
    working_dir: Option<&Path>,
    timeout: Duration,
) -> ProcessOutput
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let Some(resolved) = resolve_program(program) else {
        log::debug!("Executable not found, not spawning: {:?}", program);
        return ProcessOutput::synthetic(program, ProcessStatus::NotFound);
    };

    let mut command = tokio::process::Command::new(&resolved);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command.suppress_console();
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    log::debug!("Running {:?} (timeout {}s)", resolved, timeout.as_secs());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            log::debug!("Failed to spawn {:?}: {}", resolved, e);
            return ProcessOutput::synthetic(&resolved, ProcessStatus::SpawnFailed(e.to_string()));
        }
    };

    let stdout_task = child.stdout.take().map(drain);
    let stderr_task = child.stderr.take().map(drain);

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(exit)) => ProcessStatus::Completed(exit.code().unwrap_or(-1)),
        Ok(Err(e)) => ProcessStatus::SpawnFailed(format!("wait failed: {e}")),
        Err(_) => {
            log::warn!(
                "{:?} exceeded {}s, killing it",
                resolved,
                timeout.as_secs()
            );
            if let Err(e) = child.kill().await {
                log::warn!("Failed to kill {:?}: {}", resolved, e);
            }
            ProcessStatus::TimedOut(timeout)
        }
    };

    let output = ProcessOutput {
        program: resolved,
        status,
        stdout: collect(stdout_task).await,
        stderr: collect(stderr_task).await,
    };
    log::debug!("{}", output.describe());
    output
}

fn drain<R>(mut stream: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf).await;
        buf
    })
}

async fn collect(task: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(task) = task else {
        return String::new();
    };
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, task).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_is_reported_without_spawning() {
        let out = run_process(
            Path::new("/definitely/not/here/tool.exe"),
            ["--version"],
            None,
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(out.status, ProcessStatus::NotFound);
        assert!(!out.success());
        assert!(out.describe().contains("not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_both_streams_and_exit_code() {
        let out = run_process(
            Path::new("sh"),
            ["-c", "echo out-line; echo err-line >&2; exit 3"],
            None,
            Duration::from_secs(10),
        )
        .await;
        assert_eq!(out.exit_code(), Some(3));
        assert!(!out.success());
        assert_eq!(out.stdout.trim(), "out-line");
        assert_eq!(out.stderr.trim(), "err-line");
        assert!(out.describe().contains("err-line"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn kills_process_on_timeout() {
        let started = std::time::Instant::now();
        let out = run_process(
            Path::new("sleep"),
            ["30"],
            None,
            Duration::from_millis(200),
        )
        .await;
        assert!(out.timed_out());
        assert!(out.describe().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn large_output_does_not_deadlock() {
        let out = run_process(
            Path::new("sh"),
            ["-c", "i=0; while [ $i -lt 20000 ]; do echo line-$i; echo err-$i >&2; i=$((i+1)); done"],
            None,
            Duration::from_secs(60),
        )
        .await;
        assert!(out.success(), "{}", out.describe());
        assert_eq!(out.stdout.lines().count(), 20000);
        assert_eq!(out.stderr.lines().count(), 20000);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn honours_working_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let out = run_process(Path::new("pwd"), Vec::<&str>::new(), Some(tmp.path()), Duration::from_secs(5)).await;
        assert!(out.success());
        let reported = std::fs::canonicalize(out.stdout.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(tmp.path()).unwrap());
    }
}
