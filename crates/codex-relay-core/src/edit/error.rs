//! Error types for the edit pipeline.

/// Malformed edit-block internals. Text without any block is not an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    /// 1-based line in the (normalized) response text.
    pub line: usize,
    pub reason: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// Errors produced while packing edits into chunks.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk budget must be greater than zero")]
    ZeroBudget,

    #[error("failed to measure edit {position}: {source}")]
    Measure {
        position: usize,
        #[source]
        source: serde_json::Error,
    },
}
