//! Request-level composition of the engine with change-mode processing and
//! brainstorming prompts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::brainstorm::BrainstormRequest;
use crate::change_mode::{ChangeModeOptions, ChangeModeProcessor, RawChunkIndex};
use crate::engine::{ApprovalPolicy, EngineOptions, ReasoningEngine, SandboxMode};
use crate::exec::{ExecError, ExecResult, ExecutionOptions, ProgressFn};
use crate::transcript::{format_transcript, parse_transcript};

/// Header line on plain (non change-mode) responses.
pub const RESPONSE_HEADER: &str = "Engine response:";

/// One question for the engine, as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AskRequest {
    pub prompt: String,
    pub model: Option<String>,
    pub full_auto: bool,
    pub approval_policy: Option<ApprovalPolicy>,
    pub sandbox_mode: Option<SandboxMode>,
    pub yolo: bool,
    pub working_dir: Option<String>,
    /// Ask for OLD/NEW edit blocks instead of conversational text.
    pub change_mode: bool,
    pub chunk_index: Option<RawChunkIndex>,
    pub chunk_cache_key: Option<String>,
    /// Render plain responses from the parsed transcript.
    pub format_transcript: bool,
}

impl AskRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn engine_options(&self, execution: &ExecutionOptions) -> EngineOptions {
        EngineOptions {
            model: self.model.clone(),
            full_auto: self.full_auto,
            approval_policy: self.approval_policy,
            sandbox_mode: self.sandbox_mode,
            yolo: self.yolo,
            working_dir: self.working_dir.clone(),
            execution: execution.clone(),
            ..EngineOptions::default()
        }
    }

    fn change_mode_options(&self) -> ChangeModeOptions {
        ChangeModeOptions {
            chunk_index: self.chunk_index.clone(),
            cache_key: self.chunk_cache_key.clone(),
            prompt: Some(self.prompt.clone()),
            ..ChangeModeOptions::default()
        }
    }
}

/// Answers [`AskRequest`]s with a reasoning engine and a change-mode
/// processor.
#[derive(Clone)]
pub struct AskService {
    engine: Arc<dyn ReasoningEngine>,
    processor: ChangeModeProcessor,
    execution: ExecutionOptions,
}

impl AskService {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        processor: ChangeModeProcessor,
        execution: ExecutionOptions,
    ) -> Self {
        Self {
            engine,
            processor,
            execution,
        }
    }

    /// Response text for `request`.
    ///
    /// Change-mode continuations are served from the cache without running
    /// the engine. Engine failures are the only errors; change-mode problems
    /// come back as descriptive text.
    pub async fn ask(
        &self,
        request: &AskRequest,
        on_progress: Option<&ProgressFn>,
    ) -> ExecResult<String> {
        if request.change_mode {
            let options = request.change_mode_options();
            if let Err(err) = options.pagination() {
                return Ok(err.to_string());
            }
            if options.is_continuation() {
                return Ok(self.processor.process("", &options));
            }
        }

        if request.prompt.trim().is_empty() {
            return Err(ExecError::Config("prompt must not be empty".to_string()));
        }

        let engine_options = request.engine_options(&self.execution);
        let raw = self
            .engine
            .ask(&request.prompt, &engine_options, on_progress)
            .await?;

        if request.change_mode {
            let options = ChangeModeOptions {
                cache_key: None,
                ..request.change_mode_options()
            };
            return Ok(self.processor.process(&raw, &options));
        }

        let text = if request.format_transcript {
            format_transcript(&parse_transcript(&raw), true, true)
        } else {
            raw
        };
        Ok(format!("{RESPONSE_HEADER}\n{text}"))
    }

    /// Ideas for `request`, straight from the engine.
    ///
    /// The progress callback first receives a one-line summary of the
    /// session, then the engine's output as it arrives.
    pub async fn brainstorm(
        &self,
        request: &BrainstormRequest,
        on_progress: Option<&ProgressFn>,
    ) -> ExecResult<String> {
        if request.prompt.trim().is_empty() {
            return Err(ExecError::Config(
                "brainstorm needs a challenge or question to explore".to_string(),
            ));
        }
        if request.idea_count == 0 {
            return Err(ExecError::Config("idea count must be positive".to_string()));
        }

        tracing::debug!(
            event = "brainstorm.started",
            methodology = %request.methodology,
            domain = request.domain.as_deref().unwrap_or("general"),
            idea_count = request.idea_count,
        );
        if let Some(callback) = on_progress {
            callback(&request.progress_message());
        }
        let engine_options = request.engine_options(&self.execution);
        self.engine
            .ask(&request.build_prompt(), &engine_options, on_progress)
            .await
    }
}
