//! codex-relay core library
//!
//! Runs a reasoning engine as an external process and turns its free-text
//! answers into validated, size-bounded, resumable pages of code edits.

pub mod brainstorm;
pub mod cache;
pub mod change_mode;
pub mod config;
pub mod edit;
pub mod engine;
pub mod exec;
pub mod metrics;
pub mod obs;
pub mod service;
pub mod telemetry;
pub mod transcript;

pub use brainstorm::{BrainstormRequest, Methodology};
pub use cache::{CacheConfig, CacheError, ChunkCache, Clock, ManualClock, SystemClock};
pub use change_mode::{ChangeModeError, ChangeModeOptions, ChangeModeProcessor, RawChunkIndex};
pub use config::{ConfigError, RelayConfig};
pub use edit::{
    chunk_edits, format_chunk, parse_edits, summarize_edits, validate_edits, validate_with_repair,
    ChunkerConfig, Edit, EditChunk, LineRange, Pagination, ParseError, ValidationReport,
};
pub use engine::{
    engine_help, engine_version, version_message, ApprovalPolicy, CodexEngine, EngineOptions,
    ReasoningEngine, SandboxMode,
};
pub use exec::{
    CommandSpec, ExecError, ExecResult, ExecutionOptions, ExecutionResult, FailureKind,
    ProcessRunner, ProgressFn, RetryPolicy,
};
pub use service::{AskRequest, AskService, RESPONSE_HEADER};
pub use transcript::{format_transcript, parse_transcript, Transcript};

pub use metrics::METRICS;
pub use obs::request_span;
pub use telemetry::init_tracing;

/// codex-relay version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
