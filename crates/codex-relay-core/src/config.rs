//! Relay configuration, loadable from a JSON file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::edit::ChunkerConfig;
use crate::exec::ExecutionOptions;

pub const DEFAULT_ENGINE_BIN: &str = "codex";

/// Failed runs with more partial stdout than this are used anyway.
pub const DEFAULT_SALVAGE_THRESHOLD_CHARS: usize = 1_000;

/// Prompts larger than this go through a temp file on stdin.
pub const DEFAULT_LARGE_PROMPT_THRESHOLD_BYTES: usize = 100 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Top-level settings shared by the binaries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Engine executable name or path.
    pub engine_bin: String,
    pub execution: ExecutionOptions,
    pub chunker: ChunkerConfig,
    pub cache: CacheConfig,
    pub salvage_threshold_chars: usize,
    pub large_prompt_threshold_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            engine_bin: DEFAULT_ENGINE_BIN.to_string(),
            execution: ExecutionOptions::default(),
            chunker: ChunkerConfig::default(),
            cache: CacheConfig::default(),
            salvage_threshold_chars: DEFAULT_SALVAGE_THRESHOLD_CHARS,
            large_prompt_threshold_bytes: DEFAULT_LARGE_PROMPT_THRESHOLD_BYTES,
        }
    }
}

impl RelayConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
