//! Edit pipeline: parse, validate/repair, chunk and render OLD/NEW blocks.
//!
//! # Modules
//!
//! - [`model`]    - `Edit`, `LineRange`, `EditChunk`
//! - [`parser`]   - `parse_edits()` (explicit state machine)
//! - [`validate`] - `validate_edits()`, `repair_edits()`, `validate_with_repair()`
//! - [`chunker`]  - `chunk_edits()` greedy packing, `single_chunk()` fallback
//! - [`format`]   - `format_chunk()`, `summarize_edits()`
//! - [`error`]    - `ParseError`, `ChunkError`

pub mod chunker;
pub mod error;
pub mod format;
pub mod model;
pub mod parser;
pub mod validate;

pub use chunker::{chunk_edits, estimate_edit_chars, single_chunk, ChunkerConfig};
pub use error::{ChunkError, ParseError};
pub use format::{format_chunk, format_edit, summarize_edits, Pagination};
pub use model::{body_line_count, flatten_chunks, Edit, EditChunk, LineRange, UNSPECIFIED_LINE};
pub use parser::{parse_edits, ParseState};
pub use validate::{repair_edits, validate_edits, validate_with_repair, ValidationReport};
