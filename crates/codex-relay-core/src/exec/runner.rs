//! External process execution with streaming, timeout, output capping and retry.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::options::ExecutionOptions;
use crate::metrics::METRICS;
use crate::obs::{emit_process_attempt, emit_process_finished, emit_process_retry};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// How long output is still read after the child itself has exited.
const DRAIN_GRACE_MS: u64 = 250;

/// Callback receiving stdout text as it arrives.
pub type ProgressFn = dyn Fn(&str) + Send + Sync;

/// Why an attempt did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The deadline passed and the process was killed.
    Timeout,
    /// The process could not be started (or waited on).
    Launch,
    /// The process ran to completion with a non-zero status.
    NonZeroExit,
}

impl FailureKind {
    /// Only timeouts and launch failures are worth another attempt.
    pub fn is_transient(self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::Launch)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Launch => write!(f, "launch"),
            FailureKind::NonZeroExit => write!(f, "non_zero_exit"),
        }
    }
}

/// A command line to execute. The environment is inherited.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    /// File fed to the process on stdin; stdin is closed when absent.
    pub stdin_file: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            current_dir: None,
            stdin_file: None,
        }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn with_stdin_file(mut self, path: &Path) -> Self {
        self.stdin_file = Some(path.to_path_buf());
        self
    }
}

/// Outcome of a run. After retries, this is the last attempt's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Exit status 0 and no timeout.
    pub ok: bool,
    /// Captured stdout. Only populated when `ok`.
    pub stdout: String,
    /// Captured stderr, or the launch error message.
    pub stderr: String,
    /// Exit code, when the process exited on its own.
    pub code: Option<i32>,
    pub timed_out: bool,
    /// Output went past `max_output_bytes` and was cut.
    pub truncated: bool,
    /// Whatever stdout was buffered before a failure.
    pub partial_stdout: Option<String>,
    pub failure: Option<FailureKind>,
    /// Attempts used for this logical call (1 = no retries).
    pub attempts: u32,
    pub duration_ms: u64,
}

impl ExecutionResult {
    fn launch_failure(reason: String, started: Instant) -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: reason,
            code: None,
            timed_out: false,
            truncated: false,
            partial_stdout: None,
            failure: Some(FailureKind::Launch),
            attempts: 1,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Partial stdout of a failed run, when it is longer than `min_chars`.
    pub fn salvageable(&self, min_chars: usize) -> Option<&str> {
        if self.ok {
            return None;
        }
        self.partial_stdout
            .as_deref()
            .filter(|partial| partial.chars().count() > min_chars)
    }
}

/// Runs external commands under [`ExecutionOptions`].
pub struct ProcessRunner;

impl ProcessRunner {
    /// Run `spec`, retrying transient failures per `options.retry`.
    ///
    /// Never returns an error: launch problems, timeouts and non-zero exits
    /// are all reported through [`ExecutionResult::failure`].
    pub async fn run(
        spec: &CommandSpec,
        options: &ExecutionOptions,
        on_progress: Option<&ProgressFn>,
    ) -> ExecutionResult {
        let max_attempts = options.max_attempts();
        let mut attempt = 1;

        loop {
            emit_process_attempt(&spec.program, attempt, max_attempts);
            let mut result = Self::run_once(spec, options, on_progress).await;
            result.attempts = attempt;

            let transient = result.failure.is_some_and(FailureKind::is_transient);
            if !transient || attempt >= max_attempts {
                emit_process_finished(&spec.program, &result);
                return result;
            }

            let delay = options
                .retry
                .as_ref()
                .map(|policy| policy.delay_after(attempt))
                .unwrap_or_default();
            if let Some(kind) = result.failure {
                emit_process_retry(&spec.program, attempt, kind, delay.as_millis() as u64);
            }
            METRICS.inc_retries();
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn run_once(
        spec: &CommandSpec,
        options: &ExecutionOptions,
        on_progress: Option<&ProgressFn>,
    ) -> ExecutionResult {
        let started = Instant::now();

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        match &spec.stdin_file {
            Some(path) => match std::fs::File::open(path) {
                Ok(file) => {
                    command.stdin(Stdio::from(file));
                }
                Err(err) => {
                    return ExecutionResult::launch_failure(
                        format!("cannot open stdin file {}: {err}", path.display()),
                        started,
                    );
                }
            },
            None => {
                command.stdin(Stdio::null());
            }
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                return ExecutionResult::launch_failure(
                    format!("failed to spawn `{}`: {err}", spec.program),
                    started,
                );
            }
        };

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut out = CappedBuffer::new(options.max_output_bytes);
        let mut err = CappedBuffer::new(options.max_output_bytes);
        let mut out_chunk = [0u8; READ_CHUNK_BYTES];
        let mut err_chunk = [0u8; READ_CHUNK_BYTES];

        let deadline = tokio::time::sleep(options.timeout());
        tokio::pin!(deadline);
        // Armed once the child exits; bounds how long inherited pipes are drained.
        let drain = tokio::time::sleep(options.timeout());
        tokio::pin!(drain);
        let mut exited = None;

        // `None` means the deadline fired before the process exited.
        let status = loop {
            if exited.is_some() && stdout.is_none() && stderr.is_none() {
                break exited;
            }
            tokio::select! {
                read = read_chunk(&mut stdout, &mut out_chunk), if stdout.is_some() => match read {
                    Ok(0) | Err(_) => stdout = None,
                    Ok(n) => {
                        out.push(&out_chunk[..n]);
                        if let Some(callback) = on_progress {
                            callback(&String::from_utf8_lossy(&out_chunk[..n]));
                        }
                    }
                },
                read = read_chunk(&mut stderr, &mut err_chunk), if stderr.is_some() => match read {
                    Ok(0) | Err(_) => stderr = None,
                    Ok(n) => err.push(&err_chunk[..n]),
                },
                status = child.wait(), if exited.is_none() => {
                    exited = Some(status);
                    drain
                        .as_mut()
                        .reset(tokio::time::Instant::now() + Duration::from_millis(DRAIN_GRACE_MS));
                }
                _ = &mut drain, if exited.is_some() => {
                    // A descendant still holds the pipes open.
                    tracing::debug!(event = "process.drain_abandoned", program = %spec.program);
                    break exited;
                }
                _ = &mut deadline, if exited.is_none() => break None,
            }
        };

        if status.is_none() {
            if let Err(kill_err) = child.kill().await {
                tracing::warn!(event = "process.kill_failed", program = %spec.program, error = %kill_err);
            }
        }

        let truncated = out.truncated || err.truncated;
        let captured = out.into_string();
        let stderr_text = err.into_string();
        let duration_ms = started.elapsed().as_millis() as u64;
        let partial = (!captured.is_empty()).then(|| captured.clone());

        match status {
            None => ExecutionResult {
                ok: false,
                stdout: String::new(),
                stderr: stderr_text,
                code: None,
                timed_out: true,
                truncated,
                partial_stdout: partial,
                failure: Some(FailureKind::Timeout),
                attempts: 1,
                duration_ms,
            },
            Some(Ok(exit)) if exit.success() => ExecutionResult {
                ok: true,
                stdout: captured,
                stderr: stderr_text,
                code: exit.code(),
                timed_out: false,
                truncated,
                partial_stdout: None,
                failure: None,
                attempts: 1,
                duration_ms,
            },
            Some(Ok(exit)) => ExecutionResult {
                ok: false,
                stdout: String::new(),
                stderr: stderr_text,
                code: exit.code(),
                timed_out: false,
                truncated,
                partial_stdout: partial,
                failure: Some(FailureKind::NonZeroExit),
                attempts: 1,
                duration_ms,
            },
            Some(Err(wait_err)) => {
                let mut result = ExecutionResult::launch_failure(
                    format!("failed to wait on `{}`: {wait_err}", spec.program),
                    started,
                );
                result.partial_stdout = partial;
                result.truncated = truncated;
                result
            }
        }
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match reader {
        Some(reader) => reader.read(buf).await,
        None => Ok(0),
    }
}

/// Byte buffer that silently drops everything past `cap`.
struct CappedBuffer {
    bytes: Vec<u8>,
    cap: usize,
    truncated: bool,
}

impl CappedBuffer {
    fn new(cap: usize) -> Self {
        Self {
            bytes: Vec::new(),
            cap,
            truncated: false,
        }
    }

    fn push(&mut self, data: &[u8]) {
        let room = self.cap.saturating_sub(self.bytes.len());
        if data.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&data[..data.len().min(room)]);
    }

    /// Lossy decode; a multi-byte character cut at the cap is dropped.
    fn into_string(mut self) -> String {
        if let Err(err) = std::str::from_utf8(&self.bytes) {
            if err.error_len().is_none() {
                self.bytes.truncate(err.valid_up_to());
            }
        }
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_transience() {
        assert!(FailureKind::Timeout.is_transient());
        assert!(FailureKind::Launch.is_transient());
        assert!(!FailureKind::NonZeroExit.is_transient());
    }

    #[test]
    fn test_capped_buffer_truncates_at_cap() {
        let mut buf = CappedBuffer::new(5);
        buf.push(b"abc");
        buf.push(b"defgh");
        assert!(buf.truncated);
        assert_eq!(buf.into_string(), "abcde");
    }

    #[test]
    fn test_capped_buffer_drops_split_character() {
        let mut buf = CappedBuffer::new(4);
        buf.push("abcé".as_bytes()); // 'é' is two bytes, only one fits
        assert_eq!(buf.into_string(), "abc");
    }

    #[test]
    fn test_capped_buffer_under_cap_not_truncated() {
        let mut buf = CappedBuffer::new(64);
        buf.push(b"hello");
        assert!(!buf.truncated);
        assert_eq!(buf.into_string(), "hello");
    }

    #[test]
    fn test_salvageable_requires_threshold() {
        let mut result = ExecutionResult::launch_failure("boom".into(), Instant::now());
        result.partial_stdout = Some("x".repeat(1000));
        assert!(result.salvageable(1000).is_none());
        result.partial_stdout = Some("x".repeat(1001));
        assert_eq!(result.salvageable(1000).map(str::len), Some(1001));
    }

    #[test]
    fn test_successful_result_never_salvaged() {
        let mut result = ExecutionResult::launch_failure(String::new(), Instant::now());
        result.ok = true;
        result.failure = None;
        result.partial_stdout = Some("y".repeat(5000));
        assert!(result.salvageable(10).is_none());
    }

    #[test]
    fn test_command_spec_builders() {
        let spec = CommandSpec::new("codex", vec!["exec".into()])
            .in_dir("/tmp")
            .with_stdin_file(Path::new("/tmp/prompt.txt"));
        assert_eq!(spec.program, "codex");
        assert_eq!(spec.current_dir, Some(PathBuf::from("/tmp")));
        assert_eq!(spec.stdin_file, Some(PathBuf::from("/tmp/prompt.txt")));
    }
}
