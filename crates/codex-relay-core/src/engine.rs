//! Reasoning-engine invocation.
//!
//! Translates [`EngineOptions`] into the engine's command line, stages very
//! large prompts on stdin through a temporary file, runs the process through
//! [`ProcessRunner`] and turns the outcome into either response text or an
//! [`ExecError`]. Failed runs that still produced a substantial amount of
//! output are salvaged instead of reported.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::config::{
    RelayConfig, DEFAULT_ENGINE_BIN, DEFAULT_LARGE_PROMPT_THRESHOLD_BYTES,
    DEFAULT_SALVAGE_THRESHOLD_CHARS,
};
use crate::exec::{
    CommandSpec, ExecError, ExecResult, ExecutionOptions, ExecutionResult, FailureKind,
    ProcessRunner, ProgressFn,
};
use crate::metrics::METRICS;
use crate::obs::{emit_prompt_staged, emit_salvaged_partial_output};

/// Prepended to every prompt.
pub const CONCISE_PREFIX: &str =
    "Please provide a focused, concise response without unnecessary elaboration. ";

/// Argument that tells the engine to read its prompt from stdin.
pub const STDIN_PROMPT_ARG: &str = "-";

const VERSION_TIMEOUT_MS: u64 = 10_000;

/// When the engine should stop and ask before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalPolicy {
    Never,
    OnRequest,
    OnFailure,
    Untrusted,
}

impl ApprovalPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalPolicy::Never => "never",
            ApprovalPolicy::OnRequest => "on-request",
            ApprovalPolicy::OnFailure => "on-failure",
            ApprovalPolicy::Untrusted => "untrusted",
        }
    }
}

impl fmt::Display for ApprovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(ApprovalPolicy::Never),
            "on-request" => Ok(ApprovalPolicy::OnRequest),
            "on-failure" => Ok(ApprovalPolicy::OnFailure),
            "untrusted" => Ok(ApprovalPolicy::Untrusted),
            other => Err(format!(
                "unknown approval policy '{other}' (expected never, on-request, on-failure or untrusted)"
            )),
        }
    }
}

/// File-system access granted to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    ReadOnly,
    WorkspaceWrite,
    DangerFullAccess,
}

impl SandboxMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SandboxMode::ReadOnly => "read-only",
            SandboxMode::WorkspaceWrite => "workspace-write",
            SandboxMode::DangerFullAccess => "danger-full-access",
        }
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SandboxMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-only" => Ok(SandboxMode::ReadOnly),
            "workspace-write" => Ok(SandboxMode::WorkspaceWrite),
            "danger-full-access" => Ok(SandboxMode::DangerFullAccess),
            other => Err(format!(
                "unknown sandbox mode '{other}' (expected read-only, workspace-write or danger-full-access)"
            )),
        }
    }
}

/// Per-request engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineOptions {
    pub model: Option<String>,
    /// Workspace-write sandbox with on-failure approval.
    pub full_auto: bool,
    pub approval_policy: Option<ApprovalPolicy>,
    pub sandbox_mode: Option<SandboxMode>,
    /// Bypass approvals and sandboxing entirely.
    pub yolo: bool,
    /// Pre-resolved working directory, forwarded as `--cd`.
    pub working_dir: Option<String>,
    pub execution: ExecutionOptions,
    pub stdin_for_long_prompts: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            model: None,
            full_auto: false,
            approval_policy: None,
            sandbox_mode: None,
            yolo: false,
            working_dir: None,
            execution: ExecutionOptions::default(),
            stdin_for_long_prompts: true,
        }
    }
}

impl EngineOptions {
    /// Reject contradictory safety settings. Runs before anything is spawned.
    pub fn validate(&self) -> ExecResult<()> {
        if self.yolo && self.approval_policy.is_some() {
            return Err(ExecError::Config(
                "yolo cannot be combined with an approval policy".to_string(),
            ));
        }
        if self.yolo && self.sandbox_mode.is_some() {
            return Err(ExecError::Config(
                "yolo cannot be combined with a sandbox mode".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine argv, ending with `prompt_arg`.
    ///
    /// `yolo` wins over `full_auto`, which wins over explicit
    /// approval/sandbox settings.
    pub fn build_args(&self, prompt_arg: &str) -> Vec<String> {
        let mut args = Vec::new();
        if self.yolo {
            args.push("--dangerously-bypass-approvals-and-sandbox".to_string());
        } else if self.full_auto {
            args.push("--full-auto".to_string());
        } else {
            if let Some(policy) = self.approval_policy {
                args.extend(["--ask-for-approval".to_string(), policy.to_string()]);
            }
            if let Some(mode) = self.sandbox_mode {
                args.extend(["--sandbox".to_string(), mode.to_string()]);
            }
        }
        if let Some(model) = &self.model {
            args.extend(["-m".to_string(), model.clone()]);
        }
        if let Some(dir) = &self.working_dir {
            args.extend(["--cd".to_string(), dir.clone()]);
        }
        args.push("--skip-git-repo-check".to_string());
        args.push("exec".to_string());
        args.push(prompt_arg.to_string());
        args
    }
}

/// Something that answers prompts with free text.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn ask(
        &self,
        prompt: &str,
        options: &EngineOptions,
        on_progress: Option<&ProgressFn>,
    ) -> ExecResult<String>;
}

/// The Codex CLI, run as an external process.
#[derive(Debug, Clone)]
pub struct CodexEngine {
    binary: String,
    salvage_threshold_chars: usize,
    large_prompt_threshold_bytes: usize,
}

impl Default for CodexEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ENGINE_BIN)
    }
}

impl CodexEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            salvage_threshold_chars: DEFAULT_SALVAGE_THRESHOLD_CHARS,
            large_prompt_threshold_bytes: DEFAULT_LARGE_PROMPT_THRESHOLD_BYTES,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            binary: config.engine_bin.clone(),
            salvage_threshold_chars: config.salvage_threshold_chars,
            large_prompt_threshold_bytes: config.large_prompt_threshold_bytes,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn should_stage(&self, prompt: &str, options: &EngineOptions) -> bool {
        options.stdin_for_long_prompts && prompt.len() > self.large_prompt_threshold_bytes
    }
}

#[async_trait]
impl ReasoningEngine for CodexEngine {
    async fn ask(
        &self,
        prompt: &str,
        options: &EngineOptions,
        on_progress: Option<&ProgressFn>,
    ) -> ExecResult<String> {
        options.validate()?;

        let prompt = format!("{CONCISE_PREFIX}{prompt}");
        // Removed from disk when dropped, on every path out of this function.
        let staged = if self.should_stage(&prompt, options) {
            Some(stage_prompt(&prompt)?)
        } else {
            None
        };

        let prompt_arg = if staged.is_some() {
            STDIN_PROMPT_ARG
        } else {
            prompt.as_str()
        };
        let mut spec = CommandSpec::new(self.binary.as_str(), options.build_args(prompt_arg));
        if let Some(file) = &staged {
            spec = spec.with_stdin_file(file.path());
        }

        METRICS.inc_engine_runs();
        let result = ProcessRunner::run(&spec, &options.execution, on_progress).await;
        interpret_result(
            &self.binary,
            result,
            options.execution.timeout_ms,
            self.salvage_threshold_chars,
        )
    }
}

fn stage_prompt(prompt: &str) -> ExecResult<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("codex-prompt-")
        .suffix(".txt")
        .tempfile()?;
    file.write_all(prompt.as_bytes())?;
    file.flush()?;
    emit_prompt_staged(prompt.len());
    Ok(file)
}

/// Response text for a finished run, salvaging partial output when a failed
/// run produced more than `salvage_threshold` characters.
pub fn interpret_result(
    program: &str,
    result: ExecutionResult,
    timeout_ms: u64,
    salvage_threshold: usize,
) -> ExecResult<String> {
    if result.ok {
        return Ok(result.stdout);
    }
    if let Some(partial) = result.salvageable(salvage_threshold) {
        emit_salvaged_partial_output(program, partial.chars().count(), result.failure);
        METRICS.inc_salvages();
        return Ok(partial.to_string());
    }

    let attempts = result.attempts;
    match result.failure {
        Some(FailureKind::Timeout) => Err(ExecError::Timeout {
            timeout_ms,
            attempts,
        }),
        Some(FailureKind::Launch) => Err(ExecError::Launch {
            program: program.to_string(),
            attempts,
            reason: result.stderr,
        }),
        Some(FailureKind::NonZeroExit) | None => Err(ExecError::NonZeroExit {
            code: result.code.unwrap_or(-1),
            stderr: if result.stderr.trim().is_empty() {
                "Unknown error".to_string()
            } else {
                result.stderr
            },
        }),
    }
}

/// `<binary> --version`, or `None` when the engine cannot be run.
pub async fn engine_version(binary: &str) -> Option<String> {
    let spec = CommandSpec::new(binary, vec!["--version".to_string()]);
    let options = ExecutionOptions::default().with_timeout_ms(VERSION_TIMEOUT_MS);
    let result = ProcessRunner::run(&spec, &options, None).await;
    if !result.ok {
        tracing::debug!(event = "engine.version_unavailable", program = %binary, stderr = %result.stderr);
        return None;
    }
    let version = result.stdout.trim();
    (!version.is_empty()).then(|| version.to_string())
}

/// The engine's own `--help` text.
pub async fn engine_help(binary: &str) -> ExecResult<String> {
    let spec = CommandSpec::new(binary, vec!["--help".to_string()]);
    let options = ExecutionOptions::default().with_timeout_ms(VERSION_TIMEOUT_MS);
    let result = ProcessRunner::run(&spec, &options, None).await;
    interpret_result(binary, result, options.timeout_ms, DEFAULT_SALVAGE_THRESHOLD_CHARS)
}

/// One-line report for a version probe.
pub fn version_message(binary: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{binary} version: {version}"),
        None => format!(
            "{binary} is not installed or not on PATH. Install the Codex CLI and make sure `{binary} --version` works."
        ),
    }
}
