//! Error types for the execution layer.

/// Errors produced while configuring or running the reasoning engine.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("invalid engine configuration: {0}")]
    Config(String),

    #[error("engine timed out after {timeout_ms}ms ({attempts} attempt(s))")]
    Timeout { timeout_ms: u64, attempts: u32 },

    #[error("engine failed with exit code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("failed to launch `{program}` after {attempts} attempt(s): {reason}")]
    Launch {
        program: String,
        attempts: u32,
        reason: String,
    },

    #[error("failed to stage prompt file: {0}")]
    PromptFile(#[from] std::io::Error),
}

impl ExecError {
    /// Short classification label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecError::Config(_) => "config",
            ExecError::Timeout { .. } => "timeout",
            ExecError::NonZeroExit { .. } => "non_zero_exit",
            ExecError::Launch { .. } => "launch",
            ExecError::PromptFile(_) => "prompt_file",
        }
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = std::result::Result<T, ExecError>;
