//! Change mode: turning engine text into paginated, validated edit chunks.
//!
//! Two entry paths share one boundary, [`ChangeModeProcessor::process`]:
//!
//! - fresh synthesis: parse, validate (with optional repair), chunk, cache
//!   multi-chunk results and render the requested chunk;
//! - continuation: render a chunk straight from the cache, without touching
//!   the engine output at all.
//!
//! Every failure is reported as descriptive text; nothing propagates past
//! `process`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheError, ChunkCache};
use crate::edit::{
    chunk_edits, flatten_chunks, format_chunk, parse_edits, single_chunk, summarize_edits,
    validate_with_repair, ChunkerConfig, Edit, EditChunk, Pagination, ParseError,
};
use crate::metrics::METRICS;
use crate::obs::{emit_cache_store_failed, emit_change_mode_served, emit_single_chunk_fallback};

/// Characters of offending output quoted in parse failures.
pub const EXCERPT_CHARS: usize = 500;

/// Chunk 1 gets a summary header when the full edit set is larger than this.
pub const SUMMARY_MIN_EDITS: usize = 5;

fn validation_message(errors: &[String], repaired: &bool) -> String {
    let heading = if *repaired {
        "Edit validation failed after auto-repair attempt:"
    } else {
        "Edit validation failed:"
    };
    format!(
        "{heading}\n{}\n\nTo debug, request the raw output or check the change mode format.",
        errors.join("\n")
    )
}

/// Everything that can go wrong between raw text and a rendered chunk.
#[derive(Debug, thiserror::Error)]
pub enum ChangeModeError {
    #[error("Invalid chunk index: {0}. Must be a positive integer starting from 1.")]
    InvalidChunkIndex(String),

    #[error(
        "Chunk index {0} requested but no cache key provided. Please use the cache key from the initial response or start with chunk 1."
    )]
    MissingCacheKey(usize),

    #[error("Cache key '{0}' not found or expired. Please regenerate the response.")]
    CacheMiss(String),

    #[error("Chunk index {index} out of range. Available chunks: 1-{available}")]
    OutOfRange { index: usize, available: usize },

    #[error("Failed to parse change mode output: {source}\n\nFirst 500 chars of output:\n{excerpt}...")]
    Parse { source: ParseError, excerpt: String },

    #[error("No edits found in response. Ensure the OLD/NEW format is used.\n\nFirst 500 chars of output:\n{excerpt}")]
    NoEdits { excerpt: String },

    #[error("{}", validation_message(.errors, .repaired))]
    Validation { errors: Vec<String>, repaired: bool },

    #[error("Failed to retrieve cached chunks: {0}")]
    Cache(#[from] CacheError),
}

impl ChangeModeError {
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeModeError::InvalidChunkIndex(_) => "invalid_chunk_index",
            ChangeModeError::MissingCacheKey(_) => "missing_cache_key",
            ChangeModeError::CacheMiss(_) => "cache_miss",
            ChangeModeError::OutOfRange { .. } => "out_of_range",
            ChangeModeError::Parse { .. } => "parse",
            ChangeModeError::NoEdits { .. } => "no_edits",
            ChangeModeError::Validation { .. } => "validation",
            ChangeModeError::Cache(_) => "cache",
        }
    }
}

/// A chunk index as supplied by a caller, before it is checked.
///
/// Integers, integral floats and decimal strings are accepted when they are
/// at least 1; everything else is rejected rather than rounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawChunkIndex {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawChunkIndex {
    pub fn resolve(&self) -> Result<usize, ChangeModeError> {
        let invalid = || ChangeModeError::InvalidChunkIndex(self.to_string());
        match self {
            RawChunkIndex::Int(value) => usize::try_from(*value)
                .ok()
                .filter(|index| *index >= 1)
                .ok_or_else(invalid),
            RawChunkIndex::Float(value) => {
                if value.fract() == 0.0 && *value >= 1.0 && *value <= u32::MAX as f64 {
                    Ok(*value as usize)
                } else {
                    Err(invalid())
                }
            }
            RawChunkIndex::Text(text) => text
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|index| *index >= 1)
                .ok_or_else(invalid),
        }
    }
}

impl std::fmt::Display for RawChunkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawChunkIndex::Int(value) => write!(f, "{value}"),
            RawChunkIndex::Float(value) => write!(f, "{value}"),
            RawChunkIndex::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<usize> for RawChunkIndex {
    fn from(index: usize) -> Self {
        RawChunkIndex::Int(i64::try_from(index).unwrap_or(i64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeModeOptions {
    pub chunk_index: Option<RawChunkIndex>,
    pub cache_key: Option<String>,
    /// Original prompt; needed to cache multi-chunk results.
    pub prompt: Option<String>,
    pub auto_repair: bool,
}

impl Default for ChangeModeOptions {
    fn default() -> Self {
        Self {
            chunk_index: None,
            cache_key: None,
            prompt: None,
            auto_repair: true,
        }
    }
}

impl ChangeModeOptions {
    pub fn for_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    pub fn continuation(cache_key: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            chunk_index: Some(chunk_index.into()),
            cache_key: Some(cache_key.into()),
            ..Self::default()
        }
    }

    /// Checked chunk index and non-blank cache key. An index past 1 without
    /// a key is rejected.
    pub fn pagination(&self) -> Result<(Option<usize>, Option<&str>), ChangeModeError> {
        let index = self
            .chunk_index
            .as_ref()
            .map(RawChunkIndex::resolve)
            .transpose()?;
        let cache_key = self
            .cache_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty());
        match (index, cache_key) {
            (Some(index), None) if index > 1 => Err(ChangeModeError::MissingCacheKey(index)),
            pagination => Ok(pagination),
        }
    }

    /// Whether this request is served from the cache alone.
    pub fn is_continuation(&self) -> bool {
        matches!(self.pagination(), Ok((Some(_), Some(_))))
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn with_summary(text: String, edits: &[Edit], total_chunks: usize) -> String {
    format!("{}\n\n{text}", summarize_edits(edits, total_chunks))
}

/// Stateless orchestrator; resumable state lives only in the chunk cache.
#[derive(Clone)]
pub struct ChangeModeProcessor {
    cache: Arc<ChunkCache>,
    chunker: ChunkerConfig,
}

impl ChangeModeProcessor {
    pub fn new(cache: Arc<ChunkCache>, chunker: ChunkerConfig) -> Self {
        Self { cache, chunker }
    }

    pub fn cache(&self) -> &Arc<ChunkCache> {
        &self.cache
    }

    /// Render change-mode output for a caller. Never fails: every error
    /// becomes a descriptive message.
    pub fn process(&self, raw_text: &str, options: &ChangeModeOptions) -> String {
        match self.try_process(raw_text, options) {
            Ok(text) => text,
            Err(err) => {
                tracing::info!(event = "change_mode.rejected", kind = err.kind(), error = %err);
                err.to_string()
            }
        }
    }

    pub fn try_process(
        &self,
        raw_text: &str,
        options: &ChangeModeOptions,
    ) -> Result<String, ChangeModeError> {
        match options.pagination()? {
            (Some(index), Some(key)) => self.continue_from_cache(key, index),
            (index, _) => self.synthesize(raw_text, index, options),
        }
    }

    fn continue_from_cache(&self, key: &str, index: usize) -> Result<String, ChangeModeError> {
        let chunks = self
            .cache
            .lookup(key)?
            .filter(|chunks| !chunks.is_empty())
            .ok_or_else(|| ChangeModeError::CacheMiss(key.to_string()))?;
        if index > chunks.len() {
            return Err(ChangeModeError::OutOfRange {
                index,
                available: chunks.len(),
            });
        }

        let page = Pagination {
            current: index,
            total: chunks.len(),
            cache_key: Some(key.to_string()),
        };
        let mut text = format_chunk(&chunks[index - 1].edits, Some(&page));
        let all = flatten_chunks(&chunks);
        if index == 1 && all.len() > SUMMARY_MIN_EDITS {
            text = with_summary(text, &all, chunks.len());
        }
        emit_change_mode_served(all.len(), chunks.len(), index);
        Ok(text)
    }

    fn synthesize(
        &self,
        raw_text: &str,
        requested: Option<usize>,
        options: &ChangeModeOptions,
    ) -> Result<String, ChangeModeError> {
        let normalized = normalize_line_endings(raw_text);
        let edits = parse_edits(&normalized).map_err(|source| ChangeModeError::Parse {
            source,
            excerpt: excerpt(&normalized),
        })?;
        if edits.is_empty() {
            return Err(ChangeModeError::NoEdits {
                excerpt: excerpt(&normalized),
            });
        }

        let (edits, report) = validate_with_repair(edits, options.auto_repair);
        if !report.is_valid() {
            return Err(ChangeModeError::Validation {
                errors: report.errors,
                repaired: options.auto_repair,
            });
        }

        let chunks = self.chunk(&edits);
        let total = chunks.len();
        let cache_key = match options.prompt.as_deref() {
            Some(prompt) if total > 1 && !prompt.is_empty() => {
                match self.cache.store_for_prompt(prompt, chunks.clone()) {
                    Ok(key) => Some(key),
                    Err(err) => {
                        emit_cache_store_failed(&err);
                        None
                    }
                }
            }
            _ => None,
        };

        let index = requested.unwrap_or(1).clamp(1, total);
        let page = (total > 1).then(|| Pagination {
            current: index,
            total,
            cache_key,
        });
        let mut text = format_chunk(&chunks[index - 1].edits, page.as_ref());
        if index == 1 && edits.len() > SUMMARY_MIN_EDITS {
            text = with_summary(text, &edits, total);
        }
        emit_change_mode_served(edits.len(), total, index);
        Ok(text)
    }

    /// Never empty for a non-empty edit list.
    fn chunk(&self, edits: &[Edit]) -> Vec<EditChunk> {
        match chunk_edits(edits, &self.chunker) {
            Ok(chunks) if !chunks.is_empty() => chunks,
            Ok(_) => vec![single_chunk(edits.to_vec())],
            Err(err) => {
                emit_single_chunk_fallback(edits.len(), &err);
                METRICS.inc_chunk_fallbacks();
                vec![single_chunk(edits.to_vec())]
            }
        }
    }
}
