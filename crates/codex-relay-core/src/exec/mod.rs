//! Exec: resilient external-process execution.
//!
//! Runs a command to completion or until its deadline, streaming stdout to an
//! optional progress callback. Output is capped per stream, timed-out processes
//! are killed, and transient failures (timeout, launch) are retried with
//! exponential backoff when a [`RetryPolicy`] is supplied.
//!
//! # Modules
//!
//! - [`options`] - `ExecutionOptions`, `RetryPolicy`
//! - [`runner`]  - `ProcessRunner`, `CommandSpec`, `ExecutionResult`
//! - [`error`]   - `ExecError` / `ExecResult`

pub mod error;
pub mod options;
pub mod runner;

pub use error::{ExecError, ExecResult};
pub use options::{ExecutionOptions, RetryPolicy, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_MS};
pub use runner::{CommandSpec, ExecutionResult, FailureKind, ProcessRunner, ProgressFn};
