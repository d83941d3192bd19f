//! Greedy, order-preserving packing of edits into size-bounded chunks.

use serde::{Deserialize, Serialize};

use super::error::ChunkError;
use super::model::{Edit, EditChunk};

/// Per-chunk budget, in serialized characters.
pub const DEFAULT_MAX_CHARS_PER_CHUNK: usize = 20_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkerConfig {
    pub max_chars_per_chunk: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars_per_chunk: DEFAULT_MAX_CHARS_PER_CHUNK,
        }
    }
}

/// Serialized (JSON) size of one edit, in characters.
pub fn estimate_edit_chars(edit: &Edit) -> Result<usize, serde_json::Error> {
    Ok(serde_json::to_string(edit)?.chars().count())
}

/// Pack `edits` into chunks of at most `max_chars_per_chunk` each.
///
/// An edit larger than the budget gets a chunk of its own; edits are never
/// split or reordered.
pub fn chunk_edits(edits: &[Edit], config: &ChunkerConfig) -> Result<Vec<EditChunk>, ChunkError> {
    if config.max_chars_per_chunk == 0 {
        return Err(ChunkError::ZeroBudget);
    }

    let mut groups: Vec<(Vec<Edit>, usize)> = Vec::new();
    let mut current: Vec<Edit> = Vec::new();
    let mut current_chars = 0usize;

    for (idx, edit) in edits.iter().enumerate() {
        let chars = estimate_edit_chars(edit).map_err(|source| ChunkError::Measure {
            position: idx + 1,
            source,
        })?;
        if !current.is_empty() && current_chars + chars > config.max_chars_per_chunk {
            groups.push((std::mem::take(&mut current), current_chars));
            current_chars = 0;
        }
        current.push(edit.clone());
        current_chars += chars;
    }
    if !current.is_empty() {
        groups.push((current, current_chars));
    }

    let total = groups.len();
    Ok(groups
        .into_iter()
        .enumerate()
        .map(|(idx, (edits, estimated_chars))| EditChunk {
            edits,
            chunk_index: idx + 1,
            total_chunks: total,
            has_more: idx + 1 < total,
            estimated_chars,
        })
        .collect())
}

/// Everything in one chunk; used when [`chunk_edits`] fails.
pub fn single_chunk(edits: Vec<Edit>) -> EditChunk {
    let estimated_chars = edits
        .iter()
        .map(|edit| estimate_edit_chars(edit).unwrap_or(0))
        .sum();
    EditChunk {
        edits,
        chunk_index: 1,
        total_chunks: 1,
        has_more: false,
        estimated_chars,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::model::{flatten_chunks, LineRange};

    fn edit_with_body(n: u32, body_chars: usize) -> Edit {
        Edit::new(
            Some("src/lib.rs"),
            LineRange::new(n, n),
            "x".repeat(body_chars),
            LineRange::new(n, n),
            "y".repeat(body_chars),
        )
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let chunks = chunk_edits(&[], &ChunkerConfig::default()).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_small_edits_share_one_chunk() {
        let edits: Vec<Edit> = (1..=3).map(|n| edit_with_body(n, 20)).collect();
        let chunks = chunk_edits(&edits, &ChunkerConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].total_chunks, 1);
        assert!(!chunks[0].has_more);
        assert_eq!(chunks[0].edits, edits);
    }

    #[test]
    fn test_chunks_respect_budget_and_order() {
        let edits: Vec<Edit> = (1..=50).map(|n| edit_with_body(n, 100)).collect();
        let per_edit = estimate_edit_chars(&edits[0]).unwrap();
        let config = ChunkerConfig {
            max_chars_per_chunk: per_edit * 4 + 1,
        };
        let chunks = chunk_edits(&edits, &config).unwrap();

        assert!(chunks.len() > 1);
        for (idx, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, idx + 1);
            assert_eq!(chunk.total_chunks, chunks.len());
            assert_eq!(chunk.has_more, idx + 1 < chunks.len());
            assert!(chunk.estimated_chars <= config.max_chars_per_chunk);
        }
        assert_eq!(flatten_chunks(&chunks), edits);
    }

    #[test]
    fn test_oversized_edit_gets_own_chunk() {
        let edits = vec![
            edit_with_body(1, 10),
            edit_with_body(2, 5_000),
            edit_with_body(3, 10),
        ];
        let config = ChunkerConfig {
            max_chars_per_chunk: 1_000,
        };
        let chunks = chunk_edits(&edits, &config).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].edits.len(), 1);
        assert!(chunks[1].estimated_chars > config.max_chars_per_chunk);
        assert_eq!(flatten_chunks(&chunks), edits);
    }

    #[test]
    fn test_zero_budget_is_error() {
        let config = ChunkerConfig {
            max_chars_per_chunk: 0,
        };
        let err = chunk_edits(&[edit_with_body(1, 1)], &config).unwrap_err();
        assert!(matches!(err, ChunkError::ZeroBudget));
    }

    #[test]
    fn test_single_chunk_fallback() {
        let edits: Vec<Edit> = (1..=4).map(|n| edit_with_body(n, 10)).collect();
        let chunk = single_chunk(edits.clone());
        assert_eq!(chunk.chunk_index, 1);
        assert_eq!(chunk.total_chunks, 1);
        assert!(!chunk.has_more);
        assert!(chunk.estimated_chars > 0);
        assert_eq!(chunk.edits, edits);
    }
}
