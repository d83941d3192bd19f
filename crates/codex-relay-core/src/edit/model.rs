//! Edit records and chunk containers.

use serde::{Deserialize, Serialize};

/// Line number recorded when the engine gave none (or an unparsable one).
pub const UNSPECIFIED_LINE: u32 = 0;

/// Inclusive 1-based line range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// `end` is missing or precedes `start`.
    pub fn needs_repair(&self) -> bool {
        self.end == UNSPECIFIED_LINE || self.end < self.start
    }
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One old-code/new-code change unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// File the change applies to, when the engine named one.
    pub file: Option<String>,
    pub old_range: LineRange,
    pub old_code: String,
    pub new_range: LineRange,
    pub new_code: String,
}

impl Edit {
    pub fn new(
        file: Option<&str>,
        old_range: LineRange,
        old_code: impl Into<String>,
        new_range: LineRange,
        new_code: impl Into<String>,
    ) -> Self {
        Self {
            file: file.map(str::to_string),
            old_range,
            old_code: old_code.into(),
            new_range,
            new_code: new_code.into(),
        }
    }

    /// Human label for diagnostics, e.g. `edit 3 (src/lib.rs)`.
    pub fn label(&self, position: usize) -> String {
        match &self.file {
            Some(file) => format!("edit {position} ({file})"),
            None => format!("edit {position}"),
        }
    }
}

/// Number of lines a code body spans. A trailing newline counts as an
/// extra (empty) line.
pub fn body_line_count(body: &str) -> u32 {
    body.split('\n').count() as u32
}

/// A size-bounded, order-preserving slice of an edit sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditChunk {
    pub edits: Vec<Edit>,
    /// 1-based position of this chunk.
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub has_more: bool,
    /// Serialized size of the edits, in characters.
    pub estimated_chars: usize,
}

/// Flatten chunks back into the edit sequence they were cut from.
pub fn flatten_chunks(chunks: &[EditChunk]) -> Vec<Edit> {
    chunks
        .iter()
        .flat_map(|chunk| chunk.edits.iter().cloned())
        .collect()
}
